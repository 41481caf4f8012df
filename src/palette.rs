// ============================================================================
// CLASS PALETTE — per-class display colors and the selected paint class
// ============================================================================

use serde::{Deserialize, Serialize};

/// Maximum number of paintable annotation classes.  Class indices run
/// `1..=MAX_CLASSES`; index 0 is reserved for "no class".
pub const MAX_CLASSES: usize = 8;

/// Number of color slots in the palette (slot 0 is the unused "no class" slot).
pub const CLASS_SLOTS: usize = MAX_CLASSES + 1;

/// Default class colors (straight RGBA, 0..1).  Chosen to stay distinguishable
/// over both dark and light photographs.
const DEFAULT_COLORS: [[f32; 4]; MAX_CLASSES] = [
    [1.00, 0.20, 0.20, 1.0], // red
    [0.20, 0.80, 0.20, 1.0], // green
    [0.25, 0.45, 1.00, 1.0], // blue
    [1.00, 0.85, 0.10, 1.0], // yellow
    [0.85, 0.30, 0.95, 1.0], // magenta
    [0.10, 0.85, 0.90, 1.0], // cyan
    [1.00, 0.55, 0.10, 1.0], // orange
    [0.60, 0.40, 0.25, 1.0], // brown
];

/// Returns `true` if `class` can be painted by the user.
#[inline]
pub fn is_paintable(class: u8) -> bool {
    (1..=MAX_CLASSES as u8).contains(&class)
}

/// Class index → display color table, plus the single active class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassPalette {
    colors: [[f32; 4]; CLASS_SLOTS],
    active: u8,
}

impl ClassPalette {
    pub fn new() -> Self {
        let mut colors = [[0.0; 4]; CLASS_SLOTS];
        colors[1..].copy_from_slice(&DEFAULT_COLORS);
        Self { colors, active: 1 }
    }

    /// Palette where every paintable class shares one color.  Used by the
    /// single-overlay presentation mode.
    pub fn uniform(color: [f32; 4]) -> Self {
        let mut colors = [color; CLASS_SLOTS];
        colors[0] = [0.0; 4];
        Self { colors, active: 1 }
    }

    /// Color for `class`.  Slot 0 is always fully transparent.
    pub fn color(&self, class: u8) -> [f32; 4] {
        self.colors
            .get(class as usize)
            .copied()
            .unwrap_or([0.0; 4])
    }

    /// Replace the color of a paintable class.  Returns `false` (and changes
    /// nothing) for index 0 or anything above `MAX_CLASSES`.
    pub fn set_color(&mut self, class: u8, color: [f32; 4]) -> bool {
        if !is_paintable(class) {
            return false;
        }
        self.colors[class as usize] = color.map(|c| c.clamp(0.0, 1.0));
        true
    }

    /// Currently selected class for painting.
    pub fn active_class(&self) -> u8 {
        self.active
    }

    /// Select the class new stamps will paint with.  Index 0 is never
    /// selectable; out-of-range requests are refused.
    pub fn select(&mut self, class: u8) -> bool {
        if !is_paintable(class) {
            return false;
        }
        self.active = class;
        true
    }

    /// Raw slot table in GPU order (slot 0 first).
    pub fn slots(&self) -> &[[f32; 4]; CLASS_SLOTS] {
        &self.colors
    }
}

impl Default for ClassPalette {
    fn default() -> Self {
        Self::new()
    }
}
