// ============================================================================
// BRUSH STAMP ENGINE — hard-edged circular paint / erase into the mask
// ============================================================================
//
// A stamp visits only the circle's bounding box clipped to the mask.  A cell
// is inside when its center lies within `radius` of the stamp center
// (inclusive, no anti-aliasing), which is exactly what the compute shader
// evaluates per invocation.
//
// Erase is class-scoped: it clears a cell only if the cell holds the active
// class, so erasing with class B selected never removes class A.
// ============================================================================

use crate::mask::{DirtyRect, MaskStore, NO_CLASS};
use crate::palette::{is_paintable, MAX_CLASSES};
use crate::uniforms::BrushParams;

/// Clipped inclusive cell range `[min, max]` on both axes covered by a stamp.
/// `None` when the circle misses the mask or the parameters are unusable.
pub fn stamp_bounds(center: [f32; 2], radius: f32, width: u32, height: u32) -> Option<DirtyRect> {
    if !radius.is_finite() || radius <= 0.0 || !center[0].is_finite() || !center[1].is_finite() {
        return None;
    }
    // Cell x is covered when x + 0.5 lies in [cx - r, cx + r].
    let min_x = ((center[0] - radius - 0.5).ceil() as i64).max(0);
    let min_y = ((center[1] - radius - 0.5).ceil() as i64).max(0);
    let max_x = ((center[0] + radius - 0.5).floor() as i64).min(width as i64 - 1);
    let max_y = ((center[1] + radius - 0.5).floor() as i64).min(height as i64 - 1);
    if min_x > max_x || min_y > max_y {
        return None;
    }
    Some(DirtyRect {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Apply one stamp to `mask`.
///
/// Returns the clipped bounding box that was scanned, or `None` for a no-op
/// (non-positive / non-finite radius, non-finite center, circle entirely off
/// the mask).
///
/// # Panics
/// If `active_class` is not in `1..=MAX_CLASSES`.  The UI restricts class
/// selection, so anything else means corrupted state.
pub fn stamp(mask: &mut MaskStore, params: &BrushParams, active_class: u8) -> Option<DirtyRect> {
    assert!(
        is_paintable(active_class),
        "active class {} outside 1..={}",
        active_class,
        MAX_CLASSES
    );

    let bounds = stamp_bounds(params.center, params.radius, mask.width(), mask.height())?;
    let [cx, cy] = params.center;
    let radius_sq = params.radius * params.radius;
    let paint = params.is_paint();

    let mut changed = false;
    for y in bounds.y..bounds.y + bounds.height {
        let dy = y as f32 + 0.5 - cy;
        let dy_sq = dy * dy;
        let row = mask.row_mut(y);
        for x in bounds.x..bounds.x + bounds.width {
            let dx = x as f32 + 0.5 - cx;
            if dx * dx + dy_sq > radius_sq {
                continue;
            }
            let cell = &mut row[x as usize];
            if paint {
                if *cell != active_class {
                    *cell = active_class;
                    changed = true;
                }
            } else if *cell == active_class {
                *cell = NO_CLASS;
                changed = true;
            }
        }
    }

    if changed {
        mask.mark_dirty(bounds);
    }
    Some(bounds)
}

/// Stamp centers along a pointer segment, spaced `spacing` mask cells apart.
///
/// `from` is assumed to have been stamped already (it was the previous
/// sample) and is not yielded; `to` always is.  Non-positive or non-finite
/// spacing yields only `to`.
pub fn segment_centers(from: [f32; 2], to: [f32; 2], spacing: f32) -> impl Iterator<Item = [f32; 2]> {
    let dx = to[0] - from[0];
    let dy = to[1] - from[1];
    let len = (dx * dx + dy * dy).sqrt();
    let steps = if spacing.is_finite() && spacing > 0.0 && len.is_finite() {
        ((len / spacing).ceil() as u32).max(1)
    } else {
        1
    };
    (1..=steps).map(move |i| {
        let t = i as f32 / steps as f32;
        [from[0] + dx * t, from[1] + dy * t]
    })
}
