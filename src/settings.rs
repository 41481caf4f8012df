// ============================================================================
// EDIT SETTINGS — image adjustment, overlay opacity, brush and GPU options
// ============================================================================
//
// Persisted as a plain `key=value` file in the OS config directory:
//   Windows:  %APPDATA%\MaskCanvas\settings.cfg
//   Linux:    ~/.config/MaskCanvas/settings.cfg
//   macOS:    ~/Library/Application Support/MaskCanvas/settings.cfg
//
// Missing or unparsable keys fall back to their defaults, so an old or
// hand-edited file never prevents startup.
// ============================================================================

use std::path::{Path, PathBuf};

use crate::mask::EdgeConnectivity;
use crate::palette::{ClassPalette, MAX_CLASSES};

/// How the mask is presented over the image.  All three lower to the same
/// `CanvasUniforms` and the same blend routine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompositeMode {
    /// Per-class colors with independent fill and edge opacity.
    MultiClass,
    /// Every class drawn in one color at one opacity; the image keeps
    /// `1 - mask_alpha` of its weight where the mask is painted.
    SingleOverlay { mask_color: [f32; 4], mask_alpha: f32 },
    /// No overlay; contrast/brightness only (e.g. blink comparison).
    ImageOnly,
}

impl CompositeMode {
    pub fn name(&self) -> &'static str {
        match self {
            CompositeMode::MultiClass => "multi",
            CompositeMode::SingleOverlay { .. } => "single",
            CompositeMode::ImageOnly => "image",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditSettings {
    /// 0.0 – 2.0, 1.0 = unchanged.
    pub image_contrast: f32,
    /// -1.0 – 1.0, 0.0 = unchanged.
    pub image_brightness: f32,
    /// Interior opacity of painted regions.
    pub mask_fill_alpha: f32,
    /// Boundary opacity of painted regions.
    pub mask_edge_alpha: f32,
    pub edge_connectivity: EdgeConnectivity,
    pub mode: CompositeMode,
    pub palette: ClassPalette,
    /// Brush radius in canvas pixels.
    pub brush_radius: f32,
    /// Distance between interpolated stamps as a fraction of the radius.
    pub stamp_spacing: f32,
    pub gpu_acceleration: bool,
    /// "high performance", "low power" or empty.
    pub preferred_gpu: String,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            image_contrast: 1.0,
            image_brightness: 0.0,
            mask_fill_alpha: 0.4,
            mask_edge_alpha: 1.0,
            edge_connectivity: EdgeConnectivity::Eight,
            mode: CompositeMode::MultiClass,
            palette: ClassPalette::new(),
            brush_radius: 12.0,
            stamp_spacing: 0.25,
            gpu_acceleration: true,
            preferred_gpu: String::new(),
        }
    }
}

impl EditSettings {
    /// Clamp every scalar into its documented range.  NaN falls back to the
    /// default value.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        self.image_contrast = clamp_or(self.image_contrast, 0.0, 2.0, d.image_contrast);
        self.image_brightness = clamp_or(self.image_brightness, -1.0, 1.0, d.image_brightness);
        self.mask_fill_alpha = clamp_or(self.mask_fill_alpha, 0.0, 1.0, d.mask_fill_alpha);
        self.mask_edge_alpha = clamp_or(self.mask_edge_alpha, 0.0, 1.0, d.mask_edge_alpha);
        self.brush_radius = clamp_or(self.brush_radius, 0.5, 1024.0, d.brush_radius);
        self.stamp_spacing = clamp_or(self.stamp_spacing, 0.05, 4.0, d.stamp_spacing);
        if let CompositeMode::SingleOverlay { mask_color, mask_alpha } = self.mode {
            self.mode = CompositeMode::SingleOverlay {
                mask_color: mask_color.map(|c| clamp_or(c, 0.0, 1.0, 1.0)),
                mask_alpha: clamp_or(mask_alpha, 0.0, 1.0, 0.5),
            };
        }
        self
    }

    /// Serialize to the `key=value` format.
    pub fn to_config_string(&self) -> String {
        let (single_color, single_alpha) = match self.mode {
            CompositeMode::SingleOverlay { mask_color, mask_alpha } => (mask_color, mask_alpha),
            _ => ([1.0, 0.0, 0.0, 1.0], 0.5),
        };
        let connectivity = match self.edge_connectivity {
            EdgeConnectivity::Four => "4",
            EdgeConnectivity::Eight => "8",
        };
        let mut content = format!(
            "image_contrast={}\n\
             image_brightness={}\n\
             mask_fill_alpha={}\n\
             mask_edge_alpha={}\n\
             edge_connectivity={connectivity}\n\
             mode={}\n\
             single_mask_color={}\n\
             single_mask_alpha={}\n\
             brush_radius={}\n\
             stamp_spacing={}\n\
             gpu_acceleration={}\n\
             preferred_gpu={}\n\
             active_class={}\n",
            self.image_contrast,
            self.image_brightness,
            self.mask_fill_alpha,
            self.mask_edge_alpha,
            self.mode.name(),
            color_to_str(single_color),
            single_alpha,
            self.brush_radius,
            self.stamp_spacing,
            self.gpu_acceleration,
            self.preferred_gpu,
            self.palette.active_class(),
        );
        for class in 1..=MAX_CLASSES as u8 {
            content.push_str(&format!("class_color_{}={}\n", class, color_to_str(self.palette.color(class))));
        }
        content
    }

    /// Parse the `key=value` format.  Unknown keys are ignored.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        let mut mode_name = "multi".to_string();
        let mut single_color = [1.0, 0.0, 0.0, 1.0];
        let mut single_alpha = 0.5;

        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "image_contrast" => s.image_contrast = val.parse().unwrap_or(1.0),
                "image_brightness" => s.image_brightness = val.parse().unwrap_or(0.0),
                "mask_fill_alpha" => s.mask_fill_alpha = val.parse().unwrap_or(0.4),
                "mask_edge_alpha" => s.mask_edge_alpha = val.parse().unwrap_or(1.0),
                "edge_connectivity" => {
                    s.edge_connectivity = match val {
                        "4" => EdgeConnectivity::Four,
                        _ => EdgeConnectivity::Eight,
                    };
                }
                "mode" => mode_name = val.to_string(),
                "single_mask_color" => {
                    if let Some(c) = str_to_color(val) {
                        single_color = c;
                    }
                }
                "single_mask_alpha" => single_alpha = val.parse().unwrap_or(0.5),
                "brush_radius" => s.brush_radius = val.parse().unwrap_or(12.0),
                "stamp_spacing" => s.stamp_spacing = val.parse().unwrap_or(0.25),
                "gpu_acceleration" => s.gpu_acceleration = val == "true",
                "preferred_gpu" => s.preferred_gpu = val.to_string(),
                "active_class" => {
                    if let Ok(c) = val.parse::<u8>() {
                        s.palette.select(c);
                    }
                }
                _ => {
                    if let Some(idx) = key.strip_prefix("class_color_")
                        && let Ok(class) = idx.parse::<u8>()
                        && let Some(c) = str_to_color(val)
                    {
                        s.palette.set_color(class, c);
                    }
                }
            }
        }

        s.mode = match mode_name.as_str() {
            "single" => CompositeMode::SingleOverlay { mask_color: single_color, mask_alpha: single_alpha },
            "image" => CompositeMode::ImageOnly,
            _ => CompositeMode::MultiClass,
        };
        s.sanitized()
    }

    /// Load settings from disk (defaults if the file is missing).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to the OS config directory.  Returns the path written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let path = Self::settings_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no configuration directory")
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    fn settings_path() -> Option<PathBuf> {
        Some(config_dir()?.join("MaskCanvas").join("settings.cfg"))
    }
}

fn clamp_or(v: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if v.is_nan() { fallback } else { v.clamp(lo, hi) }
}

fn color_to_str(c: [f32; 4]) -> String {
    format!("{},{},{},{}", c[0], c[1], c[2], c[3])
}

fn str_to_color(s: &str) -> Option<[f32; 4]> {
    let mut out = [0.0f32; 4];
    let mut parts = s.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// Platform configuration directory (without the app sub-folder).
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata));
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return Some(PathBuf::from(home).join("Library").join("Application Support"));
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg));
    }
    std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trip_preserves_values() {
        let mut s = EditSettings::default();
        s.image_contrast = 1.5;
        s.image_brightness = -0.25;
        s.mask_fill_alpha = 0.0;
        s.edge_connectivity = EdgeConnectivity::Four;
        s.mode = CompositeMode::SingleOverlay { mask_color: [0.0, 1.0, 0.0, 1.0], mask_alpha: 0.75 };
        s.palette.set_color(5, [0.5, 0.5, 0.25, 1.0]);
        s.palette.select(5);
        s.preferred_gpu = "low power".into();

        let back = EditSettings::from_config_str(&s.to_config_string());
        assert_eq!(back, s);
    }

    #[test]
    fn bad_values_fall_back_or_clamp() {
        let s = EditSettings::from_config_str(
            "image_contrast=banana\n\
             image_brightness=7\n\
             mask_edge_alpha=-2\n\
             class_color_0=1,1,1,1\n\
             class_color_2=1,2\n\
             active_class=0\n\
             not a line\n\
             mode=weird\n",
        );
        assert_eq!(s.image_contrast, 1.0);
        assert_eq!(s.image_brightness, 1.0);
        assert_eq!(s.mask_edge_alpha, 0.0);
        assert_eq!(s.palette, ClassPalette::new());
        assert_eq!(s.mode, CompositeMode::MultiClass);
    }

    #[test]
    fn nan_is_replaced_by_default() {
        let mut s = EditSettings::default();
        s.mask_fill_alpha = f32::NAN;
        assert_eq!(s.sanitized().mask_fill_alpha, 0.4);
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = std::env::temp_dir().join(format!("maskcanvas-settings-{}", uuid::Uuid::new_v4()));
        let path = dir.join("settings.cfg");
        assert_eq!(EditSettings::load_from(&path), EditSettings::default());

        let mut s = EditSettings::default();
        s.mask_edge_alpha = 0.5;
        s.brush_radius = 30.0;
        s.save_to(&path).unwrap();
        assert_eq!(EditSettings::load_from(&path), s);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn image_only_mode_parses() {
        let s = EditSettings::from_config_str("mode=image\n");
        assert_eq!(s.mode, CompositeMode::ImageOnly);
    }
}
