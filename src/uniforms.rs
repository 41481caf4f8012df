// ============================================================================
// GPU DATA LAYOUTS — uniform / parameter buffers shared with the WGSL shaders
// ============================================================================
//
// Every struct here is uploaded byte-for-byte with `bytemuck::bytes_of`.
// Field order, padding and total size must match the WGSL declarations in
// `gpu::shaders`; the `const` assertions below turn any drift into a build
// error instead of a garbled frame.
// ============================================================================

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use crate::palette::CLASS_SLOTS;

/// Buffer binding slots (`@group(0)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BufferIndex {
    /// Render pass: `CanvasUniforms`.
    Uniforms = 0,
    /// Render pass: full-screen quad vertices.
    Vertices = 1,
}

impl BufferIndex {
    /// Compute pass: `BrushParams`.
    pub const BRUSH_PARAMS: u32 = 0;
    /// Compute pass: `StampDispatch`.
    pub const STAMP_DISPATCH: u32 = 1;
}

/// Texture binding slots (`@group(1)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureIndex {
    /// Render pass: source image.
    Image = 0,
    /// Render pass: class mask.
    Mask = 1,
}

impl TextureIndex {
    /// Compute pass: stamped mask output.
    pub const OUTPUT: u32 = 0;
    /// Compute pass: current mask contents.
    pub const MASK_INPUT: u32 = 1;
}

/// Bind group holding buffers.
pub const BUFFER_GROUP: u32 = 0;
/// Bind group holding textures.
pub const TEXTURE_GROUP: u32 = 1;

// ============================================================================
// CANVAS UNIFORMS
// ============================================================================

/// Per-frame snapshot consumed by the canvas render pass.  Built once per
/// frame and never modified afterwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CanvasUniforms {
    /// Image → canvas placement (`mat3x3<f32>`, columns padded to 16 bytes).
    pub transform: [[f32; 4]; 3],
    /// Canvas → image.
    pub inverse_transform: [[f32; 4]; 3],
    /// 0.0 – 2.0, 1.0 = unchanged.
    pub image_contrast: f32,
    /// -1.0 – 1.0, 0.0 = unchanged.
    pub image_brightness: f32,
    pub mask_fill_alpha: f32,
    pub mask_edge_alpha: f32,
    pub canvas_size: [f32; 2],
    pub image_size: [f32; 2],
    /// 2× image, clamped to 4096 per axis.
    pub mask_size: [f32; 2],
    /// Width-axis image → mask ratio.  Shaders use `mask_size / image_size`
    /// for the exact per-axis mapping.
    pub mask_scale_factor: f32,
    pub _padding2: f32,
    /// Slot 0 unused, 1..=MAX_CLASSES = class colors.
    pub class_colors: [[f32; 4]; CLASS_SLOTS],
}

const _: () = assert!(size_of::<CanvasUniforms>() == 288, "CanvasUniforms must be 288 bytes");
const _: () = assert!(offset_of!(CanvasUniforms, inverse_transform) == 48);
const _: () = assert!(offset_of!(CanvasUniforms, image_contrast) == 96);
const _: () = assert!(offset_of!(CanvasUniforms, canvas_size) == 112);
const _: () = assert!(offset_of!(CanvasUniforms, mask_size) == 128);
const _: () = assert!(offset_of!(CanvasUniforms, mask_scale_factor) == 136);
const _: () = assert!(offset_of!(CanvasUniforms, class_colors) == 144);
const _: () = assert!(offset_of!(CanvasUniforms, class_colors) % 16 == 0);

impl CanvasUniforms {
    /// Per-axis image → mask scale recovered from the sizes.
    pub fn mask_scale(&self) -> [f32; 2] {
        [
            self.mask_size[0] / self.image_size[0].max(1.0),
            self.mask_size[1] / self.image_size[1].max(1.0),
        ]
    }

    /// Canvas pixel → image pixel using the inverse column matrix.
    pub fn canvas_to_image(&self, p: [f32; 2]) -> [f32; 2] {
        let [c0, c1, c2] = self.inverse_transform;
        [
            c0[0] * p[0] + c1[0] * p[1] + c2[0],
            c0[1] * p[0] + c1[1] * p[1] + c2[1],
        ]
    }
}

// ============================================================================
// BRUSH PARAMS
// ============================================================================

/// One brush stamp.  `paint_value` is 1 for paint, 0 for erase.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BrushParams {
    /// Stamp center in mask coordinates.
    pub center: [f32; 2],
    /// Radius in mask cells.
    pub radius: f32,
    pub paint_value: u8,
    pub _padding: [u8; 3],
}

const _: () = assert!(size_of::<BrushParams>() == 16, "BrushParams must be 16 bytes");
const _: () = assert!(offset_of!(BrushParams, paint_value) == 12);

impl BrushParams {
    pub fn new(center: [f32; 2], radius: f32, paint: bool) -> Self {
        Self {
            center,
            radius,
            paint_value: paint as u8,
            _padding: [0; 3],
        }
    }

    pub fn is_paint(&self) -> bool {
        self.paint_value != 0
    }
}

// ============================================================================
// STAMP DISPATCH
// ============================================================================

/// Compute-pass companion to `BrushParams`: the clipped region the dispatch
/// covers and the class being painted or erased.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StampDispatch {
    pub origin: [u32; 2],
    pub extent: [u32; 2],
    pub active_class: u32,
    pub _pad: [u32; 3],
}

const _: () = assert!(size_of::<StampDispatch>() == 32);

// ============================================================================
// QUAD VERTICES
// ============================================================================

/// Full-canvas quad, two triangles.  Each entry is `(ndc.x, ndc.y, u, v)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertices {
    pub vertices: [[f32; 4]; 6],
}

const _: () = assert!(size_of::<QuadVertices>() == 96);

impl QuadVertices {
    pub fn full_canvas() -> Self {
        Self {
            vertices: [
                [-1.0, 1.0, 0.0, 0.0],
                [1.0, 1.0, 1.0, 0.0],
                [-1.0, -1.0, 0.0, 1.0],
                [-1.0, -1.0, 0.0, 1.0],
                [1.0, 1.0, 1.0, 0.0],
                [1.0, -1.0, 1.0, 1.0],
            ],
        }
    }
}
