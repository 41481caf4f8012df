// ============================================================================
// TEXTURES — source image and class mask, with partial mask upload
// ============================================================================

use image::RgbaImage;

use crate::mask::{DirtyRect, MaskStore};

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Read-only RGBA8 copy of the source image.  Sampled with `textureLoad`,
/// so no sampler or mip chain is needed.
pub struct ImageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl ImageTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ImageTexture"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent(width, height),
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// `R32Uint` class mask plus the equally sized scratch target the stamp
/// pass writes into.
///
/// ### `update_rect`
/// After CPU stamping only the dirty rectangle is re-uploaded, never the
/// whole 4096² mask.
pub struct MaskTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub scratch: wgpu::Texture,
    pub scratch_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl MaskTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, mask: &MaskStore) -> Self {
        let (width, height) = (mask.width(), mask.height());
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("MaskTexture"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let scratch = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("MaskTexture scratch"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let scratch_view = scratch.create_view(&wgpu::TextureViewDescriptor::default());
        let tex = Self {
            texture,
            view,
            scratch,
            scratch_view,
            width,
            height,
        };
        tex.upload_full(queue, mask);
        tex
    }

    pub fn matches(&self, mask: &MaskStore) -> bool {
        self.width == mask.width() && self.height == mask.height()
    }

    /// Upload the cells inside `rect` from `mask`.
    pub fn update_rect(&self, queue: &wgpu::Queue, mask: &MaskStore, rect: &DirtyRect) {
        if rect.is_empty() {
            return;
        }
        let data = mask.extract_region_u32(rect);
        debug_assert_eq!(data.len(), (rect.width * rect.height) as usize);

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * rect.width),
                rows_per_image: Some(rect.height),
            },
            extent(rect.width, rect.height),
        );
    }

    pub fn upload_full(&self, queue: &wgpu::Queue, mask: &MaskStore) {
        self.update_rect(queue, mask, &DirtyRect::full(self.width, self.height));
    }
}
