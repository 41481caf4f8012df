// ============================================================================
// GPU BRUSH STAMP — circular paint / erase on the R32Uint mask texture
// ============================================================================
//
// Storage textures are write-only in core WebGPU, so each stamp runs as a
// two-step sequence recorded into one encoder:
//
//   1. compute pass over the stamp's clipped bounding box: read the mask
//      (sampled), write the stamped result into the scratch texture
//   2. copy the same box from scratch back into the mask
//
// A batch of stamps is recorded back to back and submitted once; wgpu orders
// the passes, so stamp N+1 sees the result of stamp N.
// ============================================================================

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::shaders::{BRUSH_STAMP_SHADER, STAMP_WORKGROUP};
use super::texture::MaskTexture;
use crate::brush::stamp_bounds;
use crate::mask::DirtyRect;
use crate::palette::is_paintable;
use crate::session::StampCommand;
use crate::uniforms::{BrushParams, BufferIndex, StampDispatch, TextureIndex, BUFFER_GROUP, TEXTURE_GROUP};

/// Per-stamp uniform buffers.  Each stamp in a batch needs its own pair,
/// since `write_buffer` contents land before the whole submission runs.
struct StampSlot {
    brush_buf: wgpu::Buffer,
    region_buf: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct BrushStampPipeline {
    pipeline: wgpu::ComputePipeline,
    buffer_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    /// Grows to the largest batch seen; reused via `queue.write_buffer()`.
    cached_slots: Vec<StampSlot>,
}

impl BrushStampPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brush_stamp_shader"),
            source: wgpu::ShaderSource::Wgsl(BRUSH_STAMP_SHADER.into()),
        });

        let uniform = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let buffer_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush_stamp_buffer_bgl"),
            entries: &[
                uniform(BufferIndex::BRUSH_PARAMS),
                uniform(BufferIndex::STAMP_DISPATCH),
            ],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush_stamp_texture_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: TextureIndex::OUTPUT,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: MaskTexture::FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: TextureIndex::MASK_INPUT,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Uint,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("brush_stamp_pipeline_layout"),
            bind_group_layouts: &[&buffer_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("brush_stamp_pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "cs_brush_stamp",
            compilation_options: Default::default(),
        });

        Self {
            pipeline,
            buffer_bgl,
            texture_bgl,
            cached_slots: Vec::new(),
        }
    }

    /// Texture bind group for a mask allocation.  Rebuild whenever the mask
    /// texture is recreated.
    pub fn texture_bind_group(&self, device: &wgpu::Device, mask: &MaskTexture) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brush_stamp_texture_bg"),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: TextureIndex::OUTPUT,
                    resource: wgpu::BindingResource::TextureView(&mask.scratch_view),
                },
                wgpu::BindGroupEntry {
                    binding: TextureIndex::MASK_INPUT,
                    resource: wgpu::BindingResource::TextureView(&mask.view),
                },
            ],
        })
    }

    fn ensure_slots(&mut self, device: &wgpu::Device, count: usize) {
        while self.cached_slots.len() < count {
            let brush_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("brush_params_buf"),
                size: std::mem::size_of::<BrushParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let region_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stamp_dispatch_buf"),
                contents: bytemuck::bytes_of(&StampDispatch::zeroed()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("brush_stamp_buffer_bg"),
                layout: &self.buffer_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: BufferIndex::BRUSH_PARAMS,
                        resource: brush_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: BufferIndex::STAMP_DISPATCH,
                        resource: region_buf.as_entire_binding(),
                    },
                ],
            });
            self.cached_slots.push(StampSlot {
                brush_buf,
                region_buf,
                bind_group,
            });
        }
    }

    /// Apply `stamps` in order to `mask`.  Returns the union of the touched
    /// boxes, or `None` when every stamp was clipped away.
    ///
    /// Panics if any stamp carries a class outside `1..=MAX_CLASSES`.
    pub fn apply(
        &mut self,
        ctx: &GpuContext,
        mask: &MaskTexture,
        texture_bg: &wgpu::BindGroup,
        stamps: &[StampCommand],
    ) -> Option<DirtyRect> {
        let regions: Vec<(usize, DirtyRect)> = stamps
            .iter()
            .enumerate()
            .filter_map(|(i, cmd)| {
                assert!(is_paintable(cmd.active_class), "active class {} out of range", cmd.active_class);
                stamp_bounds(cmd.params.center, cmd.params.radius, mask.width, mask.height).map(|r| (i, r))
            })
            .collect();
        if regions.is_empty() {
            return None;
        }

        self.ensure_slots(&ctx.device, regions.len());

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("brush_stamp_encoder"),
        });
        let mut touched: Option<DirtyRect> = None;

        for (slot, &(i, rect)) in self.cached_slots.iter().zip(&regions) {
            let cmd = &stamps[i];
            let region = StampDispatch {
                origin: [rect.x, rect.y],
                extent: [rect.width, rect.height],
                active_class: cmd.active_class as u32,
                _pad: [0; 3],
            };
            ctx.queue.write_buffer(&slot.brush_buf, 0, bytemuck::bytes_of(&cmd.params));
            ctx.queue.write_buffer(&slot.region_buf, 0, bytemuck::bytes_of(&region));

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("brush_stamp_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(BUFFER_GROUP, &slot.bind_group, &[]);
                pass.set_bind_group(TEXTURE_GROUP, texture_bg, &[]);
                pass.dispatch_workgroups(
                    rect.width.div_ceil(STAMP_WORKGROUP),
                    rect.height.div_ceil(STAMP_WORKGROUP),
                    1,
                );
            }

            let origin = wgpu::Origin3d {
                x: rect.x,
                y: rect.y,
                z: 0,
            };
            encoder.copy_texture_to_texture(
                wgpu::ImageCopyTexture {
                    texture: &mask.scratch,
                    mip_level: 0,
                    origin,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyTexture {
                    texture: &mask.texture,
                    mip_level: 0,
                    origin,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: rect.width,
                    height: rect.height,
                    depth_or_array_layers: 1,
                },
            );

            touched = Some(match touched {
                Some(t) => t.union(&rect),
                None => rect,
            });
        }

        ctx.submit_one(encoder);
        touched
    }
}
