// ============================================================================
// COMPOSITOR — image adjustment + class overlay blend (CPU reference path)
// ============================================================================
//
// One blend routine serves every presentation mode.  `build_uniforms` lowers
// the mode into `CanvasUniforms`:
//
//   MultiClass     palette colors, independent fill / edge alpha
//   SingleOverlay  one color in every class slot, fill = edge = mask alpha
//   ImageOnly      fill = edge = 0 (overlay contributes nothing)
//
// The GPU fragment shader (`gpu::shaders::CANVAS_SHADER`) evaluates the same
// math from the same snapshot; keep the two in step.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::mask::{EdgeConnectivity, MaskStore, NO_CLASS};
use crate::mask_space::MaskSpace;
use crate::palette::{ClassPalette, CLASS_SLOTS, MAX_CLASSES};
use crate::settings::{CompositeMode, EditSettings};
use crate::transform::CanvasTransform;
use crate::uniforms::CanvasUniforms;

/// Build the per-frame snapshot from the current view and edit settings.
pub fn build_uniforms(
    transform: &CanvasTransform,
    space: &MaskSpace,
    canvas_size: [u32; 2],
    settings: &EditSettings,
) -> CanvasUniforms {
    let (fill, edge, palette) = match settings.mode {
        CompositeMode::MultiClass => (
            settings.mask_fill_alpha,
            settings.mask_edge_alpha,
            settings.palette.clone(),
        ),
        CompositeMode::SingleOverlay { mask_color, mask_alpha } => {
            (mask_alpha, mask_alpha, ClassPalette::uniform(mask_color))
        }
        CompositeMode::ImageOnly => (0.0, 0.0, ClassPalette::uniform([0.0; 4])),
    };

    let mut class_colors = [[0.0f32; 4]; CLASS_SLOTS];
    class_colors[1..].copy_from_slice(&palette.slots()[1..]);

    let image_size = space.image_size();
    let mask_size = space.mask_size();
    CanvasUniforms {
        transform: transform.forward().to_padded_cols(),
        inverse_transform: transform.inverse().to_padded_cols(),
        image_contrast: settings.image_contrast,
        image_brightness: settings.image_brightness,
        mask_fill_alpha: fill.clamp(0.0, 1.0),
        mask_edge_alpha: edge.clamp(0.0, 1.0),
        canvas_size: [canvas_size[0] as f32, canvas_size[1] as f32],
        image_size: [image_size[0] as f32, image_size[1] as f32],
        mask_size: [mask_size[0] as f32, mask_size[1] as f32],
        mask_scale_factor: space.scale_factor(),
        _padding2: 0.0,
        class_colors,
    }
}

/// `(c - 0.5) * contrast + 0.5 + brightness`, clamped, on RGB only.
#[inline]
pub fn adjust_color(c: [f32; 4], contrast: f32, brightness: f32) -> [f32; 4] {
    let f = |v: f32| ((v - 0.5) * contrast + 0.5 + brightness).clamp(0.0, 1.0);
    [f(c[0]), f(c[1]), f(c[2]), c[3]]
}

/// `image * (1 - a) + class * a` on RGB; alpha follows the image.
#[inline]
pub fn blend_overlay(image: [f32; 4], class_color: [f32; 4], overlay_alpha: f32) -> [f32; 4] {
    let a = overlay_alpha.clamp(0.0, 1.0);
    let mix = |i: f32, c: f32| i * (1.0 - a) + c * a;
    [
        mix(image[0], class_color[0]),
        mix(image[1], class_color[1]),
        mix(image[2], class_color[2]),
        image[3],
    ]
}

/// Mask cell under an image-space point, clamped to the mask.
#[inline]
pub fn mask_cell_for_image_point(u: &CanvasUniforms, p: [f32; 2]) -> (i64, i64) {
    let scale = u.mask_scale();
    let mx = (p[0] * scale[0]).floor() as i64;
    let my = (p[1] * scale[1]).floor() as i64;
    (
        mx.clamp(0, u.mask_size[0] as i64 - 1),
        my.clamp(0, u.mask_size[1] as i64 - 1),
    )
}

/// Overlay opacity for a mask cell: 0 for unpainted, otherwise fill or edge
/// alpha scaled by the class color's own alpha.  Returns `(class, alpha)`.
#[inline]
pub fn overlay_for_cell(
    u: &CanvasUniforms,
    mask: &MaskStore,
    connectivity: EdgeConnectivity,
    cell: (i64, i64),
) -> (u8, f32) {
    let class = mask.get_clamped(cell.0, cell.1);
    if class == NO_CLASS {
        return (NO_CLASS, 0.0);
    }
    let class = class.min(MAX_CLASSES as u8);
    let base = if mask.is_edge(cell.0 as u32, cell.1 as u32, connectivity) {
        u.mask_edge_alpha
    } else {
        u.mask_fill_alpha
    };
    (class, base * u.class_colors[class as usize][3])
}

/// Composite one frame on the CPU.  Output is `canvas_size`, straight RGBA;
/// pixels outside the image are transparent.
///
/// `mask` must match `u.mask_size`; the image must match `u.image_size`.
pub fn composite(
    u: &CanvasUniforms,
    connectivity: EdgeConnectivity,
    image: &RgbaImage,
    mask: &MaskStore,
) -> RgbaImage {
    let out_w = u.canvas_size[0].max(0.0) as u32;
    let out_h = u.canvas_size[1].max(0.0) as u32;
    let mut out = RgbaImage::new(out_w, out_h);
    if out_w == 0 || out_h == 0 {
        return out;
    }

    debug_assert_eq!(mask.width() as f32, u.mask_size[0]);
    debug_assert_eq!(mask.height() as f32, u.mask_size[1]);

    let img_w = image.width().min(u.image_size[0] as u32);
    let img_h = image.height().min(u.image_size[1] as u32);
    let row_len = out_w as usize * 4;

    let pixels: &mut [u8] = &mut out;
    pixels
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..out_w as usize {
                let canvas = [x as f32 + 0.5, y as f32 + 0.5];
                let ip = u.canvas_to_image(canvas);
                if ip[0] < 0.0 || ip[1] < 0.0 || ip[0] >= img_w as f32 || ip[1] >= img_h as f32 {
                    continue; // stays transparent
                }

                let px = image.get_pixel(ip[0] as u32, ip[1] as u32).0;
                let src = px.map(|c| c as f32 / 255.0);
                let adjusted = adjust_color(src, u.image_contrast, u.image_brightness);

                let cell = mask_cell_for_image_point(u, ip);
                let (class, alpha) = overlay_for_cell(u, mask, connectivity, cell);
                let color = if class == NO_CLASS {
                    adjusted
                } else {
                    blend_overlay(adjusted, u.class_colors[class as usize], alpha)
                };

                let o = x * 4;
                for (dst, v) in row[o..o + 4].iter_mut().zip(color) {
                    *dst = (v * 255.0).round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::stamp;
    use crate::uniforms::BrushParams;

    fn gray_image(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([v, v, v, 255]))
    }

    #[test]
    fn contrast_brightness_formula() {
        let c = adjust_color([0.75, 0.5, 0.0, 0.3], 2.0, 0.1);
        assert!((c[0] - 1.0).abs() < 1e-6); // 0.25*2 + 0.6 = 1.1 → clamped
        assert!((c[1] - 0.6).abs() < 1e-6);
        assert!((c[2] - 0.0).abs() < 1e-6); // -1 + 0.6 → clamped
        assert_eq!(c[3], 0.3);
        assert_eq!(adjust_color([0.2, 0.4, 0.6, 1.0], 1.0, 0.0), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn blend_weights_sum_to_one() {
        let b = blend_overlay([0.2, 0.2, 0.2, 1.0], [1.0, 0.0, 0.0, 1.0], 0.5);
        assert!((b[0] - 0.6).abs() < 1e-6);
        assert!((b[1] - 0.1).abs() < 1e-6);
        assert_eq!(b[3], 1.0);
    }

    #[test]
    fn image_only_mode_ignores_mask() {
        let space = MaskSpace::new(16, 16);
        let mut mask = MaskStore::new(32, 32);
        stamp(&mut mask, &BrushParams::new([16.0, 16.0], 10.0, true), 2);
        let mut settings = EditSettings::default();
        settings.mode = CompositeMode::ImageOnly;
        let u = build_uniforms(&CanvasTransform::new(), &space, [16, 16], &settings);
        let out = composite(&u, EdgeConnectivity::Eight, &gray_image(16, 16, 100), &mask);
        assert!(out.pixels().all(|p| p.0 == [100, 100, 100, 255]));
    }

    #[test]
    fn single_overlay_uses_one_color_for_every_class() {
        let space = MaskSpace::new(8, 8);
        let mut settings = EditSettings::default();
        settings.mode = CompositeMode::SingleOverlay { mask_color: [0.0, 0.0, 1.0, 1.0], mask_alpha: 1.0 };
        let u = build_uniforms(&CanvasTransform::new(), &space, [8, 8], &settings);
        assert_eq!(u.mask_fill_alpha, u.mask_edge_alpha);
        assert_eq!(u.class_colors[0], [0.0; 4]);
        for slot in 1..CLASS_SLOTS {
            assert_eq!(u.class_colors[slot], [0.0, 0.0, 1.0, 1.0]);
        }

        let mut mask = MaskStore::new(16, 16);
        stamp(&mut mask, &BrushParams::new([4.0, 8.0], 3.0, true), 1);
        stamp(&mut mask, &BrushParams::new([12.0, 8.0], 3.0, true), 6);
        let out = composite(&u, EdgeConnectivity::Eight, &gray_image(8, 8, 0), &mask);
        assert_eq!(out.get_pixel(2, 4).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(6, 4).0, [0, 0, 255, 255]);
    }

    #[test]
    fn outside_the_image_is_transparent() {
        let space = MaskSpace::new(4, 4);
        let mut t = CanvasTransform::new();
        t.set_transform([2.0, 2.0], 1.0, 0.0).unwrap();
        let u = build_uniforms(&t, &space, [8, 8], &EditSettings::default());
        let out = composite(&u, EdgeConnectivity::Eight, &gray_image(4, 4, 50), &MaskStore::new(8, 8));
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(7, 7).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(2, 2).0, [50, 50, 50, 255]);
    }

    #[test]
    fn class_color_alpha_scales_overlay() {
        let space = MaskSpace::new(8, 8);
        let mut settings = EditSettings::default();
        settings.mask_fill_alpha = 1.0;
        settings.mask_edge_alpha = 1.0;
        settings.palette.set_color(1, [1.0, 1.0, 1.0, 0.5]);
        let u = build_uniforms(&CanvasTransform::new(), &space, [8, 8], &settings);
        let mut mask = MaskStore::new(16, 16);
        stamp(&mut mask, &BrushParams::new([8.0, 8.0], 20.0, true), 1);
        let out = composite(&u, EdgeConnectivity::Eight, &gray_image(8, 8, 0), &mask);
        assert_eq!(out.get_pixel(4, 4).0, [128, 128, 128, 255]);
    }
}
