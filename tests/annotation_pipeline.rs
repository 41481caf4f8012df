//! Session-level scenarios: stamp through the queue, composite on the CPU.

use image::{Rgba, RgbaImage};
use maskcanvas::{AnnotationSession, BrushParams, CompositeMode, EdgeConnectivity, EditSettings, MaskStore};

fn gray(w: u32, h: u32, v: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
}

fn close(a: u8, b: f32) -> bool {
    (a as f32 - b * 255.0).abs() <= 1.0
}

fn dist(x: u32, y: u32, c: [f32; 2]) -> f32 {
    let dx = x as f32 + 0.5 - c[0];
    let dy = y as f32 + 0.5 - c[1];
    (dx * dx + dy * dy).sqrt()
}

#[test]
fn stamp_then_composite_tints_the_disc() {
    let mut settings = EditSettings::default();
    settings.mask_fill_alpha = 0.5;
    settings.palette.set_color(3, [1.0, 0.0, 0.0, 1.0]);
    let mut session = AnnotationSession::new(100, 100, [100, 100], settings);

    assert_eq!(session.mask_space().mask_size(), [200, 200]);
    assert_eq!(session.mask_space().scale_factor(), 2.0);

    // Canvas (25, 25) with the fitted identity view lands on mask (50, 50).
    let center = session.mask_space().canvas_to_mask(session.transform(), [25.0, 25.0]);
    let radius = session.mask_space().canvas_radius_to_mask(session.transform(), 5.0);
    assert!((center[0] - 50.0).abs() < 1e-4 && (center[1] - 50.0).abs() < 1e-4);
    assert!((radius - 10.0).abs() < 1e-4);

    assert!(session.stamp_sender().send(BrushParams::new(center, radius, true), 3));
    let frame = session.begin_frame();
    assert_eq!(frame.stamps_applied, 1);

    let mask = session.mask();
    for y in 35..65 {
        for x in 35..65 {
            let expected = if dist(x, y, [50.0, 50.0]) <= 10.0 { 3 } else { 0 };
            assert_eq!(mask.get(x, y), Some(expected), "cell ({}, {})", x, y);
        }
    }
    assert_eq!(mask.count(3), mask.cells().iter().filter(|&&c| c != 0).count());

    let base = 100.0 / 255.0;
    let out = session.render_cpu(&frame, &gray(100, 100, 100));
    assert_eq!(out.dimensions(), (100, 100));

    // Interior pixel: half red over the gray base.
    let p = out.get_pixel(25, 25).0;
    assert!(close(p[0], base * 0.5 + 0.5), "{:?}", p);
    assert!(close(p[1], base * 0.5), "{:?}", p);
    assert!(close(p[2], base * 0.5), "{:?}", p);
    assert_eq!(p[3], 255);

    // Far away: untouched.
    assert_eq!(out.get_pixel(80, 80).0, [100, 100, 100, 255]);
}

#[test]
fn filled_disc_splits_into_edge_and_fill() {
    let mut mask = MaskStore::new(64, 64);
    let center = [32.0, 32.0];
    let r = 12.0;
    maskcanvas::brush::stamp(&mut mask, &BrushParams::new(center, r, true), 2);

    let mut edges = 0;
    for y in 0..64 {
        for x in 0..64 {
            let d = dist(x, y, center);
            let edge = mask.is_edge(x, y, EdgeConnectivity::Eight);
            if d > r {
                assert!(!edge, "unpainted cell ({}, {}) reported as edge", x, y);
            } else if d <= r - 1.5 {
                assert!(!edge, "interior cell ({}, {}) at {} reported as edge", x, y, d);
            } else if d > r - 0.5 {
                assert!(edge, "rim cell ({}, {}) at {} not an edge", x, y, d);
            }
            if edge {
                edges += 1;
            }
        }
    }
    assert!(edges > 0);
}

#[test]
fn zero_fill_alpha_only_outlines() {
    let mut settings = EditSettings::default();
    settings.mask_fill_alpha = 0.0;
    settings.mask_edge_alpha = 1.0;
    settings.palette.set_color(1, [0.0, 0.0, 1.0, 1.0]);
    let mut session = AnnotationSession::new(32, 32, [32, 32], settings);
    session
        .stamp_sender()
        .send(BrushParams::new([32.0, 32.0], 12.0, true), 1);
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &gray(32, 32, 90));

    let mask = session.mask();
    let mut tinted = 0;
    for y in 0..32u32 {
        for x in 0..32u32 {
            // Pixel center x + 0.5 in image space is mask cell 2x + 1.
            let (mx, my) = (2 * x + 1, 2 * y + 1);
            let p = out.get_pixel(x, y).0;
            if mask.is_edge(mx, my, EdgeConnectivity::Eight) {
                assert_eq!(p, [0, 0, 255, 255], "edge pixel ({}, {})", x, y);
                tinted += 1;
            } else {
                assert_eq!(p, [90, 90, 90, 255], "pixel ({}, {})", x, y);
            }
        }
    }
    assert!(tinted > 0);
}

#[test]
fn erase_leaves_other_classes_alone() {
    let mut session = AnnotationSession::new(20, 20, [20, 20], EditSettings::default());
    let tx = session.stamp_sender();
    tx.send(BrushParams::new([20.0, 20.0], 6.0, true), 4);
    tx.send(BrushParams::new([20.0, 20.0], 6.0, false), 5);
    session.begin_frame();
    let painted = session.mask().count(4);
    assert!(painted > 0);

    tx.send(BrushParams::new([20.0, 20.0], 6.0, false), 4);
    session.begin_frame();
    assert_eq!(session.mask().count(4), 0);
}

#[test]
fn image_only_mode_ignores_the_mask() {
    let settings = EditSettings {
        mode: CompositeMode::ImageOnly,
        image_contrast: 2.0,
        ..EditSettings::default()
    };
    let mut session = AnnotationSession::new(16, 16, [16, 16], settings);
    session
        .stamp_sender()
        .send(BrushParams::new([16.0, 16.0], 20.0, true), 1);
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &gray(16, 16, 191));

    // (0.749 - 0.5) * 2 + 0.5 = 0.998
    for p in out.pixels() {
        assert!(p.0[0] >= 254 && p.0[0] == p.0[1] && p.0[1] == p.0[2], "{:?}", p);
    }
}

#[test]
fn single_overlay_uses_one_color_for_every_class() {
    let settings = EditSettings {
        mode: CompositeMode::SingleOverlay {
            mask_color: [0.0, 1.0, 0.0, 1.0],
            mask_alpha: 1.0,
        },
        ..EditSettings::default()
    };
    let mut session = AnnotationSession::new(40, 20, [40, 20], settings);
    let tx = session.stamp_sender();
    tx.send(BrushParams::new([20.0, 20.0], 8.0, true), 1);
    tx.send(BrushParams::new([60.0, 20.0], 8.0, true), 7);
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &gray(40, 20, 0));

    assert_eq!(out.get_pixel(10, 10).0, [0, 255, 0, 255]);
    assert_eq!(out.get_pixel(30, 10).0, [0, 255, 0, 255]);
    assert_eq!(out.get_pixel(20, 2).0, [0, 0, 0, 255]);
}

#[test]
fn letterboxed_canvas_is_transparent_outside_the_image() {
    let session_settings = EditSettings::default();
    let mut session = AnnotationSession::new(10, 10, [20, 10], session_settings);
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &gray(10, 10, 200));
    assert_eq!(out.dimensions(), (20, 10));
    assert_eq!(out.get_pixel(0, 5).0[3], 0);
    assert_eq!(out.get_pixel(19, 5).0[3], 0);
    assert_eq!(out.get_pixel(10, 5).0, [200, 200, 200, 255]);
}

#[test]
fn mask_survives_a_hand_off() {
    let mut session = AnnotationSession::new(30, 30, [30, 30], EditSettings::default());
    session
        .stamp_sender()
        .send(BrushParams::new([30.0, 30.0], 9.0, true), 6);
    session.begin_frame();

    let bytes = session.mask_snapshot().to_bytes().unwrap();
    let snapshot = maskcanvas::MaskSnapshot::from_bytes(&bytes).unwrap();
    let resumed = AnnotationSession::with_mask(30, 30, [60, 60], EditSettings::default(), snapshot).unwrap();
    assert_eq!(resumed.mask().cells(), session.mask().cells());
    assert!(AnnotationSession::with_mask(31, 30, [30, 30], EditSettings::default(), session.mask_snapshot()).is_none());
}

fn coordinate_image(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 0, 255]))
}

#[test]
fn quarter_turn_view_rotates_image_and_mask_together() {
    let mut settings = EditSettings::default();
    settings.mask_fill_alpha = 1.0;
    settings.mask_edge_alpha = 1.0;
    settings.palette.set_color(1, [0.0, 0.0, 1.0, 1.0]);
    let mut session = AnnotationSession::new(20, 20, [20, 20], settings);
    // canvas = (20 - y, x), so canvas pixel (cx, cy) shows image pixel (cy, 19 - cx)
    session
        .set_transform([20.0, 0.0], 1.0, std::f32::consts::FRAC_PI_2)
        .unwrap();
    let image = coordinate_image(20, 20);

    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &image);
    for cy in 0..20u32 {
        for cx in 0..20u32 {
            let p = out.get_pixel(cx, cy).0;
            assert_eq!(p, [(cy * 10) as u8, ((19 - cx) * 10) as u8, 0, 255], "canvas ({}, {})", cx, cy);
        }
    }

    // Image (5, 15) is mask (10, 30) and canvas pixel (4, 5).
    session
        .stamp_sender()
        .send(BrushParams::new([10.0, 30.0], 4.0, true), 1);
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &image);
    assert_eq!(out.get_pixel(4, 5).0, [0, 0, 255, 255]);
    assert_eq!(out.get_pixel(15, 5).0, [50, 40, 0, 255]);
}

#[test]
fn zoomed_view_repeats_each_image_pixel() {
    let mut session = AnnotationSession::new(20, 20, [40, 40], EditSettings::default());
    session.set_transform([0.0, 0.0], 2.0, 0.0).unwrap();
    let frame = session.begin_frame();
    let out = session.render_cpu(&frame, &coordinate_image(20, 20));

    assert_eq!(out.dimensions(), (40, 40));
    for (cx, cy, p) in out.enumerate_pixels() {
        assert_eq!(p.0, [(cx / 2 * 10) as u8, (cy / 2 * 10) as u8, 0, 255], "canvas ({}, {})", cx, cy);
    }
}
