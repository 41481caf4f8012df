// ============================================================================
// MaskCanvas — multi-class annotation mask painting and compositing core
// ============================================================================
//
// Leaves first:
//   transform   canvas <-> image affine + inverse
//   mask_space  image -> 2x oversampled mask grid (4096 cap)
//   palette     class colors, active class
//   mask        class-per-cell store, dirty tracking, hand-off snapshot
//   brush       circular paint / erase stamp
//   uniforms    byte layouts shared with the shaders
//   settings    edit settings + key=value persistence
//   compositor  CPU composite (reference path)
//   session     single-writer stamp queue + per-frame snapshot
//   gpu         wgpu stamp / composite backend
//   cli         headless driver
// ============================================================================

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod brush;
pub mod cli;
pub mod compositor;
pub mod gpu;
pub mod mask;
pub mod mask_space;
pub mod palette;
pub mod session;
pub mod settings;
pub mod transform;
pub mod uniforms;

pub use mask::{DirtyRect, EdgeConnectivity, MaskDelta, MaskSnapshot, MaskStore};
pub use mask_space::MaskSpace;
pub use palette::{ClassPalette, MAX_CLASSES};
pub use session::{AnnotationSession, FrameSnapshot, StampCommand, StampSender, StrokeBuilder};
pub use settings::{CompositeMode, EditSettings};
pub use transform::{CanvasTransform, TransformError};
pub use uniforms::{BrushParams, CanvasUniforms};
