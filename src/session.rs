// ============================================================================
// ANNOTATION SESSION — owns the mask and serialises every write to it
// ============================================================================
//
// Ownership rule: the session is the only writer of its `MaskStore`.
// Producers (input threads, scripted replays) hold a `StampSender` and push
// `StampCommand`s; the session drains them in arrival order at the start of
// each frame.  A frame is therefore composited only after every stamp queued
// before it has fully landed, and never sees a partially applied stamp.
// ============================================================================

use std::sync::mpsc::{self, Receiver, Sender};

use image::RgbaImage;
use uuid::Uuid;

use crate::brush::{segment_centers, stamp};
use crate::compositor::{build_uniforms, composite};
use crate::mask::{EdgeConnectivity, MaskDelta, MaskSnapshot, MaskStore};
use crate::mask_space::MaskSpace;
use crate::palette::{is_paintable, MAX_CLASSES};
use crate::settings::EditSettings;
use crate::transform::{CanvasTransform, TransformError};
use crate::uniforms::{BrushParams, CanvasUniforms};

/// One queued stamp, already expressed in mask space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StampCommand {
    pub params: BrushParams,
    pub active_class: u8,
}

/// Cloneable producer handle.  Sending never blocks and never drops.
#[derive(Clone, Debug)]
pub struct StampSender {
    tx: Sender<StampCommand>,
}

impl StampSender {
    /// Queue a stamp.  Returns `false` if the session has been dropped.
    ///
    /// # Panics
    /// If `active_class` is not in `1..=MAX_CLASSES`.
    pub fn send(&self, params: BrushParams, active_class: u8) -> bool {
        assert!(
            is_paintable(active_class),
            "active class {} outside 1..={}",
            active_class,
            MAX_CLASSES
        );
        self.tx.send(StampCommand { params, active_class }).is_ok()
    }
}

/// Producer-side helper turning canvas pointer samples into evenly spaced
/// mask-space stamps.  It holds a copy of the view at stroke start, so the
/// stroke stays consistent even if the view changes mid-gesture.
#[derive(Debug)]
pub struct StrokeBuilder {
    sender: StampSender,
    transform: CanvasTransform,
    space: MaskSpace,
    radius_mask: f32,
    spacing_mask: f32,
    paint: bool,
    active_class: u8,
    last: Option<[f32; 2]>,
}

impl StrokeBuilder {
    /// Feed one pointer sample (canvas pixels).  Returns how many stamps were
    /// queued.
    pub fn sample(&mut self, canvas_point: [f32; 2]) -> usize {
        let target = self.space.canvas_to_mask(&self.transform, canvas_point);
        if !target[0].is_finite() || !target[1].is_finite() {
            return 0;
        }
        let mut queued = 0;
        match self.last {
            None => {
                if self.sender.send(BrushParams::new(target, self.radius_mask, self.paint), self.active_class) {
                    queued += 1;
                }
            }
            Some(prev) => {
                for c in segment_centers(prev, target, self.spacing_mask) {
                    if self.sender.send(BrushParams::new(c, self.radius_mask, self.paint), self.active_class) {
                        queued += 1;
                    }
                }
            }
        }
        self.last = Some(target);
        queued
    }
}

/// Everything the compositor needs for one frame.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub uniforms: CanvasUniforms,
    pub connectivity: EdgeConnectivity,
    pub mask_generation: u64,
    /// Mask region changed since the previous frame, and the generation it
    /// starts from.  Only valid for a GPU copy that synced that generation.
    pub mask_dirty: Option<MaskDelta>,
    /// Stamps applied while building this frame.
    pub stamps_applied: usize,
}

pub struct AnnotationSession {
    pub id: Uuid,
    space: MaskSpace,
    mask: MaskStore,
    transform: CanvasTransform,
    canvas_size: [u32; 2],
    settings: EditSettings,
    tx: Sender<StampCommand>,
    rx: Receiver<StampCommand>,
}

impl AnnotationSession {
    /// Start a session for an image of the given size, fitted into `canvas_size`.
    pub fn new(image_width: u32, image_height: u32, canvas_size: [u32; 2], settings: EditSettings) -> Self {
        let space = MaskSpace::new(image_width, image_height);
        let [mw, mh] = space.mask_size();
        let image_size = space.image_size();
        let transform = CanvasTransform::fit(
            [canvas_size[0] as f32, canvas_size[1] as f32],
            [image_size[0] as f32, image_size[1] as f32],
        );
        let (tx, rx) = mpsc::channel();
        let id = Uuid::new_v4();
        crate::log_info!(
            "session {}: image {}x{}, mask {}x{} (scale {:?})",
            id, image_size[0], image_size[1], mw, mh, space.scale()
        );
        if !space.is_uniform() {
            crate::log_warn!("session {}: mask clamp is non-uniform, using per-axis scale", id);
        }
        Self {
            id,
            space,
            mask: MaskStore::new(mw, mh),
            transform,
            canvas_size,
            settings: settings.sanitized(),
            tx,
            rx,
        }
    }

    /// Resume a session from a mask hand-off blob.  The snapshot must match
    /// the mask size derived from the image.
    pub fn with_mask(
        image_width: u32,
        image_height: u32,
        canvas_size: [u32; 2],
        settings: EditSettings,
        snapshot: MaskSnapshot,
    ) -> Option<Self> {
        let mut session = Self::new(image_width, image_height, canvas_size, settings);
        let [mw, mh] = session.space.mask_size();
        if [snapshot.width, snapshot.height] != [mw, mh] || snapshot.cells.len() != mw as usize * mh as usize {
            crate::log_err!(
                "session {}: snapshot is {}x{}, expected {:?}",
                session.id, snapshot.width, snapshot.height, session.space.mask_size()
            );
            return None;
        }
        session.mask = snapshot.into_store();
        Some(session)
    }

    pub fn stamp_sender(&self) -> StampSender {
        StampSender { tx: self.tx.clone() }
    }

    /// Begin a stroke with the current view, brush radius and selected class.
    pub fn begin_stroke(&self, paint: bool) -> StrokeBuilder {
        let radius_mask = self.space.canvas_radius_to_mask(&self.transform, self.settings.brush_radius);
        StrokeBuilder {
            sender: self.stamp_sender(),
            transform: self.transform.clone(),
            space: self.space,
            radius_mask,
            spacing_mask: (radius_mask * self.settings.stamp_spacing).max(0.5),
            paint,
            active_class: self.settings.palette.active_class(),
            last: None,
        }
    }

    pub fn set_transform(&mut self, pan: [f32; 2], zoom: f32, rotation: f32) -> Result<(), TransformError> {
        let result = self.transform.set_transform(pan, zoom, rotation);
        if let Err(e) = &result {
            crate::log_warn!("session {}: transform rejected: {}", self.id, e);
        }
        result
    }

    pub fn set_canvas_size(&mut self, size: [u32; 2]) {
        self.canvas_size = size;
    }

    pub fn select_class(&mut self, class: u8) -> bool {
        self.settings.palette.select(class)
    }

    /// Apply every queued stamp in arrival order.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            stamp(&mut self.mask, &cmd.params, cmd.active_class);
            applied += 1;
        }
        applied
    }

    /// Drain the queue without touching the CPU mask, for a GPU stamp engine.
    /// The caller must load the GPU result back with `load_mask_cells`.
    pub fn take_pending(&mut self) -> Vec<StampCommand> {
        self.rx.try_iter().collect()
    }

    /// Drain the stamp queue, then freeze the uniforms for this frame.
    pub fn begin_frame(&mut self) -> FrameSnapshot {
        let stamps_applied = self.apply_pending();
        FrameSnapshot {
            uniforms: build_uniforms(&self.transform, &self.space, self.canvas_size, &self.settings),
            connectivity: self.settings.edge_connectivity,
            mask_generation: self.mask.generation(),
            mask_dirty: self.mask.take_dirty(),
            stamps_applied,
        }
    }

    /// CPU composite of a frame.
    pub fn render_cpu(&self, frame: &FrameSnapshot, image: &RgbaImage) -> RgbaImage {
        composite(&frame.uniforms, frame.connectivity, image, &self.mask)
    }

    pub fn mask(&self) -> &MaskStore {
        &self.mask
    }

    /// Replace mask contents with a GPU readback.  The GPU copy is
    /// authoritative only when stamps were applied there.
    pub fn load_mask_cells(&mut self, cells: &[u32]) -> bool {
        self.mask.load_from_u32(cells)
    }

    pub fn mask_snapshot(&self) -> MaskSnapshot {
        self.mask.snapshot()
    }

    pub fn mask_space(&self) -> &MaskSpace {
        &self.space
    }

    pub fn transform(&self) -> &CanvasTransform {
        &self.transform
    }

    pub fn canvas_size(&self) -> [u32; 2] {
        self.canvas_size
    }

    pub fn settings(&self) -> &EditSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EditSettings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_stamps_apply_in_order_before_the_frame() {
        let mut s = AnnotationSession::new(32, 32, [32, 32], EditSettings::default());
        let tx = s.stamp_sender();
        tx.send(BrushParams::new([20.0, 20.0], 6.0, true), 1);
        tx.send(BrushParams::new([20.0, 20.0], 6.0, true), 2);
        tx.send(BrushParams::new([20.0, 20.0], 3.0, false), 2);
        let frame = s.begin_frame();
        assert_eq!(frame.stamps_applied, 3);
        // Last paint wins, then the erase clears its own class in the center.
        assert_eq!(s.mask().count(1), 0);
        assert_eq!(s.mask().get(20, 20), Some(0));
        assert_eq!(s.mask().get(20, 25), Some(2));
        assert!(frame.mask_dirty.is_some());

        let next = s.begin_frame();
        assert_eq!(next.stamps_applied, 0);
        assert!(next.mask_dirty.is_none());
        assert_eq!(next.mask_generation, frame.mask_generation);
    }

    #[test]
    fn senders_work_across_threads() {
        let mut s = AnnotationSession::new(64, 64, [64, 64], EditSettings::default());
        let tx = s.stamp_sender();
        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                tx.send(BrushParams::new([10.0 + i as f32 * 10.0, 64.0], 4.0, true), 3);
            }
        });
        handle.join().unwrap();
        assert_eq!(s.begin_frame().stamps_applied, 10);
        assert!(s.mask().count(3) > 0);
    }

    #[test]
    fn stroke_builder_fills_gaps_between_samples() {
        let mut settings = EditSettings::default();
        settings.brush_radius = 2.0;
        settings.stamp_spacing = 0.5;
        settings.palette.select(4);
        let mut s = AnnotationSession::new(100, 100, [100, 100], settings);
        let mut stroke = s.begin_stroke(true);
        assert_eq!(stroke.sample([10.0, 50.0]), 1);
        assert!(stroke.sample([90.0, 50.0]) > 1);
        s.begin_frame();
        // Canvas row y=50 maps to mask row 100; every cell along the path is painted.
        for x in 20..180 {
            assert_eq!(s.mask().get(x, 100), Some(4), "gap at mask x={}", x);
        }
    }

    #[test]
    fn rejected_transform_keeps_previous_view() {
        let mut s = AnnotationSession::new(10, 10, [10, 10], EditSettings::default());
        let before = *s.transform().forward();
        assert!(s.set_transform([0.0, 0.0], -2.0, 0.0).is_err());
        assert_eq!(*s.transform().forward(), before);
    }

    #[test]
    fn resume_from_snapshot_requires_matching_size() {
        let mut s = AnnotationSession::new(10, 10, [10, 10], EditSettings::default());
        s.stamp_sender().send(BrushParams::new([5.0, 5.0], 3.0, true), 1);
        s.begin_frame();
        let snap = s.mask_snapshot();

        let resumed = AnnotationSession::with_mask(10, 10, [10, 10], EditSettings::default(), snap.clone()).unwrap();
        assert_eq!(resumed.mask().cells(), s.mask().cells());
        assert!(AnnotationSession::with_mask(20, 10, [10, 10], EditSettings::default(), snap).is_none());
    }

    #[test]
    #[should_panic]
    fn sending_reserved_class_panics() {
        let s = AnnotationSession::new(4, 4, [4, 4], EditSettings::default());
        s.stamp_sender().send(BrushParams::new([1.0, 1.0], 1.0, true), 0);
    }
}
