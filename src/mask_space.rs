// ============================================================================
// MASK SPACE — internal mask resolution derived from the image resolution
// ============================================================================
//
// The mask is oversampled 2× per axis for smoother brush edges, capped at
// 4096 per axis.  Each axis is clamped independently, so a non-square image
// can end up with different X and Y scales; the per-axis scale is the source
// of truth and the scalar `scale_factor()` is the width ratio.
// ============================================================================

use crate::transform::CanvasTransform;

/// Oversampling factor from image pixels to mask cells.
pub const MASK_OVERSAMPLE: u32 = 2;

/// Largest mask dimension on either axis.
pub const MAX_MASK_DIMENSION: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskSpace {
    image_size: [u32; 2],
    mask_size: [u32; 2],
    scale: [f32; 2],
}

impl MaskSpace {
    /// Derive mask dimensions for an image.  Zero-sized axes are treated as 1.
    pub fn new(image_width: u32, image_height: u32) -> Self {
        let image_size = [image_width.max(1), image_height.max(1)];
        let mask_size = image_size.map(|d| d.saturating_mul(MASK_OVERSAMPLE).min(MAX_MASK_DIMENSION));
        let scale = [
            mask_size[0] as f32 / image_size[0] as f32,
            mask_size[1] as f32 / image_size[1] as f32,
        ];
        Self { image_size, mask_size, scale }
    }

    pub fn image_size(&self) -> [u32; 2] {
        self.image_size
    }

    pub fn mask_size(&self) -> [u32; 2] {
        self.mask_size
    }

    /// Per-axis image→mask scale.
    pub fn scale(&self) -> [f32; 2] {
        self.scale
    }

    /// Scalar image→mask scale (width axis).  Only exact for both axes when
    /// `is_uniform()` holds.
    pub fn scale_factor(&self) -> f32 {
        self.scale[0]
    }

    pub fn is_uniform(&self) -> bool {
        (self.scale[0] - self.scale[1]).abs() <= f32::EPSILON * self.scale[0].max(1.0)
    }

    pub fn image_to_mask(&self, p: [f32; 2]) -> [f32; 2] {
        [p[0] * self.scale[0], p[1] * self.scale[1]]
    }

    pub fn mask_to_image(&self, p: [f32; 2]) -> [f32; 2] {
        [p[0] / self.scale[0], p[1] / self.scale[1]]
    }

    /// Canvas pointer position → mask-space position.
    pub fn canvas_to_mask(&self, transform: &CanvasTransform, p: [f32; 2]) -> [f32; 2] {
        self.image_to_mask(transform.canvas_to_image(p))
    }

    /// Convert a brush radius given in canvas pixels to mask cells.  Uses the
    /// smaller axis scale so a clamped axis never receives an oversized brush.
    pub fn canvas_radius_to_mask(&self, transform: &CanvasTransform, radius: f32) -> f32 {
        radius / transform.zoom() * self.scale[0].min(self.scale[1])
    }
}
