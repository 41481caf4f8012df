// ============================================================================
// GPU RENDERER — top-level coordinator for GPU stamping and compositing
// ============================================================================
//
// Mirrors the CPU path in `crate::compositor` / `crate::brush`.  The mask
// texture follows the session's `MaskStore` by generation: unchanged
// generation = no upload, a frame delta starting at this copy's generation =
// partial upload, anything else = full upload.  When stamps are applied here instead of on the CPU, read the mask
// back into the session and call `mark_mask_synced` so the next sync does not
// overwrite the GPU result.
// ============================================================================

use image::RgbaImage;

use super::compositor::{readback_texture, CanvasPipeline};
use super::compute::BrushStampPipeline;
use super::context::GpuContext;
use super::pool::TargetPool;
use super::texture::{ImageTexture, MaskTexture};
use crate::mask::{DirtyRect, EdgeConnectivity, MaskDelta, MaskStore};
use crate::session::{FrameSnapshot, StampCommand};

/// Mask texture plus the bind groups that reference it.
struct GpuMaskState {
    texture: MaskTexture,
    stamp_bg: wgpu::BindGroup,
    generation: u64,
}

pub struct GpuRenderer {
    pub ctx: GpuContext,
    canvas: CanvasPipeline,
    stamp: BrushStampPipeline,
    target_pool: TargetPool,
    image: Option<ImageTexture>,
    mask: Option<GpuMaskState>,
    /// Image + mask bind group for the canvas pass; rebuilt when either changes.
    canvas_bg: Option<wgpu::BindGroup>,
    output: Option<wgpu::Texture>,
    cached_staging_buf: Option<(wgpu::Buffer, u64)>,
}

impl GpuRenderer {
    pub fn try_new(preferred_gpu: &str, connectivity: EdgeConnectivity) -> Option<Self> {
        let ctx = GpuContext::new(preferred_gpu)?;
        let canvas = CanvasPipeline::new(&ctx.device, connectivity);
        let stamp = BrushStampPipeline::new(&ctx.device);
        Some(Self {
            ctx,
            canvas,
            stamp,
            target_pool: TargetPool::new(),
            image: None,
            mask: None,
            canvas_bg: None,
            output: None,
            cached_staging_buf: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    fn rebuild_canvas_bg(&mut self) {
        self.canvas_bg = match (&self.image, &self.mask) {
            (Some(img), Some(m)) => Some(self.canvas.texture_bind_group(
                &self.ctx.device,
                &img.view,
                &m.texture.view,
            )),
            _ => None,
        };
    }

    // ========================================================================
    // SYNCHRONISATION
    // ========================================================================

    /// Upload a new source image.  Returns `false` if it exceeds the device
    /// texture limit.
    pub fn upload_image(&mut self, image: &RgbaImage) -> bool {
        if !self.ctx.supports_size(image.width(), image.height()) {
            crate::log_warn!(
                "gpu: image {}x{} exceeds texture limit {}",
                image.width(),
                image.height(),
                self.ctx.max_texture_dim
            );
            return false;
        }
        self.image = Some(ImageTexture::new(&self.ctx.device, &self.ctx.queue, image));
        self.rebuild_canvas_bg();
        true
    }

    /// Bring the mask texture up to date with `mask`.  `dirty` is the delta
    /// reported by the current frame; it is uploaded on its own only when this
    /// copy is exactly at the delta's starting generation (frames rendered on
    /// the CPU or skipped in between force a full upload).
    pub fn sync_mask(&mut self, mask: &MaskStore, dirty: Option<MaskDelta>) {
        let generation = mask.generation();
        let reusable = self.mask.as_ref().is_some_and(|s| s.texture.matches(mask));
        if !reusable {
            let texture = MaskTexture::new(&self.ctx.device, &self.ctx.queue, mask);
            let stamp_bg = self.stamp.texture_bind_group(&self.ctx.device, &texture);
            self.mask = Some(GpuMaskState {
                texture,
                stamp_bg,
                generation,
            });
            self.rebuild_canvas_bg();
            return;
        }

        let Some(state) = &mut self.mask else { return };
        if state.generation == generation {
            return;
        }
        match dirty {
            Some(delta) if delta.since == state.generation => {
                state.texture.update_rect(&self.ctx.queue, mask, &delta.rect)
            }
            _ => state.texture.upload_full(&self.ctx.queue, mask),
        }
        state.generation = generation;
    }

    /// Record that the GPU mask already equals the CPU mask at `generation`.
    pub fn mark_mask_synced(&mut self, generation: u64) {
        if let Some(state) = &mut self.mask {
            state.generation = generation;
        }
    }

    // ========================================================================
    // STAMPING
    // ========================================================================

    /// Apply stamps to the GPU mask in order.  Requires a prior `sync_mask`.
    pub fn apply_stamps(&mut self, stamps: &[StampCommand]) -> Option<DirtyRect> {
        let state = self.mask.as_ref()?;
        self.stamp.apply(&self.ctx, &state.texture, &state.stamp_bg, stamps)
    }

    /// Read the mask back, one `u32` class per cell, row-major.
    pub fn read_mask(&mut self) -> Option<Vec<u32>> {
        let state = self.mask.as_ref()?;
        let bytes = readback_texture(
            &self.ctx,
            &state.texture.texture,
            state.texture.width,
            state.texture.height,
            &mut self.cached_staging_buf,
        )?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    // ========================================================================
    // COMPOSITING
    // ========================================================================

    fn ensure_output(&mut self, width: u32, height: u32) {
        let stale = self
            .output
            .as_ref()
            .is_some_and(|t| t.width() != width || t.height() != height);
        if stale {
            if let Some(old) = self.output.take() {
                self.target_pool.release(old);
            }
        }
        if self.output.is_none() {
            let texture = self.target_pool.acquire(width, height).unwrap_or_else(|| {
                self.ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("canvas_output"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.canvas.output_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            });
            self.output = Some(texture);
        }
    }

    /// Render one frame and read it back.  `None` when no image / mask has
    /// been uploaded yet, the canvas is empty, or the readback fails.
    pub fn render(&mut self, frame: &FrameSnapshot) -> Option<RgbaImage> {
        let width = frame.uniforms.canvas_size[0] as u32;
        let height = frame.uniforms.canvas_size[1] as u32;
        if width == 0 || height == 0 || !self.ctx.supports_size(width, height) {
            return None;
        }
        self.canvas_bg.as_ref()?;

        self.canvas.set_connectivity(&self.ctx.device, frame.connectivity);
        self.ensure_output(width, height);
        let output = self.output.as_ref()?;
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let canvas_bg = self.canvas_bg.as_ref()?;
        self.canvas.render(&self.ctx, &frame.uniforms, canvas_bg, &view);

        let pixels = readback_texture(&self.ctx, output, width, height, &mut self.cached_staging_buf)?;
        RgbaImage::from_raw(width, height, pixels)
    }

    /// Drop cached render targets (e.g. after switching to a new image).
    pub fn release_targets(&mut self) {
        if let Some(old) = self.output.take() {
            self.target_pool.release(old);
        }
        self.target_pool.clear();
    }

    pub fn pooled_targets(&self) -> usize {
        self.target_pool.pooled_count()
    }
}
