// ============================================================================
// MaskCanvas CLI — headless stamp + composite driver
// ============================================================================
//
// Usage examples:
//   maskcanvas -i photo.png -o frame.png --stamp 120,80,10,3
//   maskcanvas -i photo.png --stroke 2,6,10,10,90,40,150,40 --fill-alpha 0.5
//   maskcanvas -i photo.png --mask-in prev.msk --stamp 40,40,8,2,erase --mask-out next.msk
//   maskcanvas -i photo.png --gpu --gpu-stamps --canvas 1280x720 --zoom 2 --pan -200,-100
//
// Coordinates and radii on the command line are canvas pixels.  With no
// view flags the image is fitted into the canvas, and the canvas defaults to
// the image size.  Stamps are queued in the order given and applied before
// the single composited frame is rendered.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;

use crate::gpu::GpuRenderer;
use crate::mask::{EdgeConnectivity, MaskSnapshot, SnapshotError};
use crate::palette::{is_paintable, MAX_CLASSES};
use crate::session::AnnotationSession;
use crate::settings::{CompositeMode, EditSettings};
use crate::transform::TransformError;
use crate::uniforms::BrushParams;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    Args(String),
    Image(image::ImageError),
    Io(std::io::Error),
    Snapshot(SnapshotError),
    Transform(TransformError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Args(e) => write!(f, "{}", e),
            CliError::Image(e) => write!(f, "image error: {}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Snapshot(e) => write!(f, "mask snapshot: {}", e),
            CliError::Transform(e) => write!(f, "view transform: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<image::ImageError> for CliError {
    fn from(e: image::ImageError) -> Self {
        CliError::Image(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<SnapshotError> for CliError {
    fn from(e: SnapshotError) -> Self {
        CliError::Snapshot(e)
    }
}

impl From<TransformError> for CliError {
    fn from(e: TransformError) -> Self {
        CliError::Transform(e)
    }
}

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// One `--stamp X,Y,R,CLASS[,erase]` argument.
#[derive(Clone, Debug, PartialEq)]
pub struct StampSpec {
    pub center: [f32; 2],
    pub radius: f32,
    pub class: u8,
    pub paint: bool,
}

/// One `--stroke CLASS,R,X1,Y1,X2,Y2[,...]` argument (paint only).
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSpec {
    pub class: u8,
    pub radius: f32,
    pub points: Vec<[f32; 2]>,
}

/// MaskCanvas headless annotation renderer.
#[derive(Parser, Debug)]
#[command(
    name = "maskcanvas",
    about = "Paint class-mask stamps onto an image and render the annotated frame",
    long_about = "Loads an image, applies brush stamps given on the command line to its\n\
                  class mask (8 classes, 2x oversampled), composites the mask over the\n\
                  adjusted image and writes the frame as an image file.\n\n\
                  Example:\n  \
                  maskcanvas -i photo.png -o frame.png --stamp 120,80,10,3"
)]
pub struct CliArgs {
    /// Source image (PNG, JPEG, WEBP, BMP, TGA, TIFF).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output frame.  Defaults to `<input>_annotated.png` next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Canvas (view) size, e.g. 1280x720.  Defaults to the image size.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub canvas: Option<[u32; 2]>,

    /// View zoom.  Any of --zoom / --pan / --rotation replaces the fitted view.
    #[arg(long)]
    pub zoom: Option<f32>,

    /// View pan in canvas pixels, e.g. 10,-20.
    #[arg(long, value_name = "X,Y", value_parser = parse_pair, allow_hyphen_values = true)]
    pub pan: Option<[f32; 2]>,

    /// View rotation in radians.
    #[arg(long, allow_hyphen_values = true)]
    pub rotation: Option<f32>,

    /// Circular stamp: X,Y,RADIUS,CLASS with optional ",erase".  Repeatable.
    #[arg(long = "stamp", value_name = "X,Y,R,CLASS[,erase]", value_parser = parse_stamp, allow_hyphen_values = true)]
    pub stamps: Vec<StampSpec>,

    /// Painted polyline: CLASS,RADIUS,X1,Y1,X2,Y2,...  Repeatable.
    #[arg(long = "stroke", value_name = "CLASS,R,X1,Y1,...", value_parser = parse_stroke, allow_hyphen_values = true)]
    pub strokes: Vec<StrokeSpec>,

    /// Start from saved settings instead of the built-in defaults.
    #[arg(long)]
    pub use_saved_settings: bool,

    /// Store the effective settings (after the overrides below) as the saved
    /// settings for later runs.
    #[arg(long)]
    pub save_settings: bool,

    /// Image contrast, 0.0 – 2.0.
    #[arg(long)]
    pub contrast: Option<f32>,

    /// Image brightness, -1.0 – 1.0.
    #[arg(long, allow_hyphen_values = true)]
    pub brightness: Option<f32>,

    /// Interior opacity of painted regions.
    #[arg(long)]
    pub fill_alpha: Option<f32>,

    /// Boundary opacity of painted regions.
    #[arg(long)]
    pub edge_alpha: Option<f32>,

    /// Presentation: multi, single, image.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Edge neighbourhood: 4 or 8.
    #[arg(long, value_name = "4|8")]
    pub connectivity: Option<u8>,

    /// Resume from a mask hand-off file.
    #[arg(long, value_name = "FILE")]
    pub mask_in: Option<PathBuf>,

    /// Write the final mask hand-off file.
    #[arg(long, value_name = "FILE")]
    pub mask_out: Option<PathBuf>,

    /// Composite on the GPU (falls back to CPU if unavailable).
    #[arg(long)]
    pub gpu: bool,

    /// Apply stamps with the GPU compute pass as well.  Implies --gpu.
    #[arg(long)]
    pub gpu_stamps: bool,

    /// Log file path (default: OS data directory).
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Print timing and mask statistics.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the driver and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_inner(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            crate::log_err!("cli: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<(), CliError> {
    let start = Instant::now();

    let image = image::open(&args.input)?.to_rgba8();
    let (iw, ih) = image.dimensions();
    let canvas = args.canvas.unwrap_or([iw, ih]);
    let settings = build_settings(args)?;
    let gpu_acceleration = settings.gpu_acceleration;
    if args.save_settings {
        let path = settings.save()?;
        crate::log_info!("cli: settings saved to {}", path.display());
    }

    let mut session = match &args.mask_in {
        Some(path) => {
            let snapshot = MaskSnapshot::from_bytes(&std::fs::read(path)?)?;
            AnnotationSession::with_mask(iw, ih, canvas, settings, snapshot).ok_or_else(|| {
                CliError::Args(format!("{} does not match a {}x{} image", path.display(), iw, ih))
            })?
        }
        None => AnnotationSession::new(iw, ih, canvas, settings),
    };

    if args.zoom.is_some() || args.pan.is_some() || args.rotation.is_some() {
        session.set_transform(
            args.pan.unwrap_or([0.0, 0.0]),
            args.zoom.unwrap_or(1.0),
            args.rotation.unwrap_or(0.0),
        )?;
    }

    let queued = queue_stamps(&mut session, &args.stamps, &args.strokes);
    crate::log_info!("cli: {} stamps queued for {}", queued, args.input.display());

    let want_gpu = (args.gpu || args.gpu_stamps) && gpu_acceleration;
    let mut renderer = if want_gpu {
        let preferred = session.settings().preferred_gpu.clone();
        let r = GpuRenderer::try_new(&preferred, session.settings().edge_connectivity);
        if r.is_none() {
            eprintln!("warning: no usable GPU adapter, rendering on the CPU");
        }
        r
    } else {
        None
    };

    if args.gpu_stamps
        && let Some(r) = renderer.as_mut()
    {
        stamp_on_gpu(&mut session, r);
    }

    let frame = session.begin_frame();
    let gpu_frame = renderer.as_mut().and_then(|r| {
        if !r.upload_image(&image) {
            return None;
        }
        r.sync_mask(session.mask(), frame.mask_dirty);
        r.render(&frame)
    });
    let gpu_adapter = match (&gpu_frame, &renderer) {
        (Some(_), Some(r)) => Some(r.adapter_name().to_string()),
        _ => None,
    };
    let out = match gpu_frame {
        Some(f) => f,
        None => session.render_cpu(&frame, &image),
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    out.save(&output)?;

    if let Some(path) = &args.mask_out {
        std::fs::write(path, session.mask_snapshot().to_bytes()?)?;
    }

    if args.verbose {
        print_summary(&session, &out, queued, gpu_adapter.as_deref(), &output, start);
    }
    Ok(())
}

/// Built-in or saved settings with command-line overrides applied.
fn build_settings(args: &CliArgs) -> Result<EditSettings, CliError> {
    let mut s = if args.use_saved_settings {
        EditSettings::load()
    } else {
        EditSettings::default()
    };
    if let Some(v) = args.contrast {
        s.image_contrast = v;
    }
    if let Some(v) = args.brightness {
        s.image_brightness = v;
    }
    if let Some(v) = args.fill_alpha {
        s.mask_fill_alpha = v;
    }
    if let Some(v) = args.edge_alpha {
        s.mask_edge_alpha = v;
    }
    if let Some(c) = args.connectivity {
        s.edge_connectivity = match c {
            4 => EdgeConnectivity::Four,
            8 => EdgeConnectivity::Eight,
            other => return Err(CliError::Args(format!("connectivity must be 4 or 8, got {}", other))),
        };
    }
    if let Some(mode) = &args.mode {
        s.mode = match mode.to_lowercase().as_str() {
            "multi" => CompositeMode::MultiClass,
            "single" => CompositeMode::SingleOverlay {
                mask_color: s.palette.color(s.palette.active_class()),
                mask_alpha: s.mask_fill_alpha,
            },
            "image" => CompositeMode::ImageOnly,
            other => return Err(CliError::Args(format!("unknown mode '{}'", other))),
        };
    }
    if args.gpu || args.gpu_stamps {
        s.gpu_acceleration = true;
    }
    Ok(s.sanitized())
}

/// Queue every stamp, then every stroke, through the session's sender.
fn queue_stamps(session: &mut AnnotationSession, stamps: &[StampSpec], strokes: &[StrokeSpec]) -> usize {
    let sender = session.stamp_sender();
    let mut queued = 0;
    for s in stamps {
        let center = session.mask_space().canvas_to_mask(session.transform(), s.center);
        let radius = session.mask_space().canvas_radius_to_mask(session.transform(), s.radius);
        if sender.send(BrushParams::new(center, radius, s.paint), s.class) {
            queued += 1;
        }
    }
    for stroke in strokes {
        session.settings_mut().brush_radius = stroke.radius;
        session.select_class(stroke.class);
        let mut builder = session.begin_stroke(true);
        for &p in &stroke.points {
            queued += builder.sample(p);
        }
    }
    queued
}

/// Hand the queued stamps to the GPU compute pass and pull the result back
/// into the session's mask.
fn stamp_on_gpu(session: &mut AnnotationSession, renderer: &mut GpuRenderer) {
    let pending = session.take_pending();
    if pending.is_empty() {
        return;
    }
    renderer.sync_mask(session.mask(), None);
    renderer.apply_stamps(&pending);
    match renderer.read_mask() {
        Some(cells) if session.load_mask_cells(&cells) => {
            renderer.mark_mask_synced(session.mask().generation());
        }
        _ => {
            crate::log_warn!("cli: GPU mask readback failed, re-applying stamps on the CPU");
            let sender = session.stamp_sender();
            for cmd in pending {
                sender.send(cmd.params, cmd.active_class);
            }
        }
    }
}

fn print_summary(
    session: &AnnotationSession,
    frame: &RgbaImage,
    queued: usize,
    gpu_adapter: Option<&str>,
    output: &Path,
    start: Instant,
) {
    let [mw, mh] = session.mask_space().mask_size();
    println!("session {}", session.id);
    println!("  mask {}x{} (scale {:?})", mw, mh, session.mask_space().scale());
    println!("  {} stamps, generation {}", queued, session.mask().generation());
    for class in 1..=MAX_CLASSES as u8 {
        let n = session.mask().count(class);
        if n > 0 {
            println!("  class {}: {} cells", class, n);
        }
    }
    let via = match gpu_adapter {
        Some(name) => format!("GPU '{}'", name),
        None => "CPU".to_string(),
    };
    println!(
        "  {}x{} frame via {} → {} ({:.0}ms)",
        frame.width(),
        frame.height(),
        via,
        output.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );
}

// ============================================================================
// Helpers
// ============================================================================

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}_annotated.png", stem))
}

fn parse_floats(s: &str) -> Result<Vec<f32>, String> {
    s.split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|_| format!("'{}' is not a number", p.trim())))
        .collect()
}

fn parse_class(v: f32) -> Result<u8, String> {
    if v.fract() == 0.0 && v >= 0.0 && v <= u8::MAX as f32 && is_paintable(v as u8) {
        Ok(v as u8)
    } else {
        Err(format!("class must be 1..={}, got {}", MAX_CLASSES, v))
    }
}

pub fn parse_size(s: &str) -> Result<[u32; 2], String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("canvas size must be non-zero".into());
    }
    Ok([w, h])
}

pub fn parse_pair(s: &str) -> Result<[f32; 2], String> {
    match parse_floats(s)?.as_slice() {
        &[x, y] => Ok([x, y]),
        _ => Err(format!("expected X,Y, got '{}'", s)),
    }
}

pub fn parse_stamp(s: &str) -> Result<StampSpec, String> {
    let (nums, paint) = match s.rsplit_once(',') {
        Some((head, tail)) if tail.trim().eq_ignore_ascii_case("erase") => (head, false),
        _ => (s, true),
    };
    match parse_floats(nums)?.as_slice() {
        &[x, y, r, class] => Ok(StampSpec {
            center: [x, y],
            radius: r,
            class: parse_class(class)?,
            paint,
        }),
        _ => Err(format!("expected X,Y,R,CLASS[,erase], got '{}'", s)),
    }
}

pub fn parse_stroke(s: &str) -> Result<StrokeSpec, String> {
    let v = parse_floats(s)?;
    if v.len() < 4 || v.len() % 2 != 0 {
        return Err(format!("expected CLASS,R,X1,Y1[,X2,Y2...], got '{}'", s));
    }
    Ok(StrokeSpec {
        class: parse_class(v[0])?,
        radius: v[1],
        points: v[2..].chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stamp_arguments() {
        assert_eq!(
            parse_stamp("10,20.5,4,3").unwrap(),
            StampSpec { center: [10.0, 20.5], radius: 4.0, class: 3, paint: true }
        );
        let erase = parse_stamp("1,2,3,8,erase").unwrap();
        assert!(!erase.paint);
        assert_eq!(erase.class, 8);
        assert!(parse_stamp("1,2,3,0").is_err());
        assert!(parse_stamp("1,2,3,9").is_err());
        assert!(parse_stamp("1,2,3").is_err());
        assert!(parse_stamp("1,2,3,1.5").is_err());
    }

    #[test]
    fn parses_strokes_sizes_and_pairs() {
        let s = parse_stroke("2,6,0,0,10,10,20,0").unwrap();
        assert_eq!(s.class, 2);
        assert_eq!(s.radius, 6.0);
        assert_eq!(s.points, vec![[0.0, 0.0], [10.0, 10.0], [20.0, 0.0]]);
        assert!(parse_stroke("2,6,0").is_err());

        assert_eq!(parse_size("640x480").unwrap(), [640, 480]);
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("640").is_err());
        assert_eq!(parse_pair("-3,4.5").unwrap(), [-3.0, 4.5]);
    }

    #[test]
    fn command_line_round_trip() {
        let args = CliArgs::try_parse_from([
            "maskcanvas",
            "-i",
            "in.png",
            "--stamp",
            "5,5,2,1",
            "--stamp",
            "6,6,1,1,erase",
            "--pan",
            "-10,4",
            "--connectivity",
            "4",
            "--mode",
            "single",
            "--save-settings",
        ])
        .unwrap();
        assert_eq!(args.stamps.len(), 2);
        assert!(args.save_settings);
        assert_eq!(args.pan, Some([-10.0, 4.0]));
        let s = build_settings(&args).unwrap();
        assert_eq!(s.edge_connectivity, EdgeConnectivity::Four);
        assert!(matches!(s.mode, CompositeMode::SingleOverlay { .. }));
    }

    #[test]
    fn bad_connectivity_is_rejected() {
        let args = CliArgs::try_parse_from(["maskcanvas", "-i", "in.png", "--connectivity", "6"]).unwrap();
        assert!(matches!(build_settings(&args), Err(CliError::Args(_))));
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("shots/a.jpg")),
            PathBuf::from("shots/a_annotated.png")
        );
    }
}
