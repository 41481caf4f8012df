// ============================================================================
// CANVAS PIPELINE — GPU composite of image + class overlay
// ============================================================================
//
// One full-canvas quad per frame.  Hardware blending is DISABLED (Replace):
// the fragment shader does the contrast / brightness adjustment and the
// overlay blend itself, so the output texture holds the final straight-alpha
// frame and can be read back as-is.
//
//   group 0  binding 0  CanvasUniforms      (uniform)
//            binding 1  QuadVertices        (uniform)
//   group 1  binding 0  image               texture_2d<f32>
//            binding 1  mask                texture_2d<u32>
// ============================================================================

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::shaders::canvas_shader;
use crate::mask::EdgeConnectivity;
use crate::uniforms::{BufferIndex, CanvasUniforms, QuadVertices, TextureIndex, BUFFER_GROUP, TEXTURE_GROUP};

pub struct CanvasPipeline {
    pipeline: wgpu::RenderPipeline,
    pub buffer_bgl: wgpu::BindGroupLayout,
    pub texture_bgl: wgpu::BindGroupLayout,
    uniform_buf: wgpu::Buffer,
    _quad_buf: wgpu::Buffer,
    buffer_bg: wgpu::BindGroup,
    connectivity: EdgeConnectivity,
    pub output_format: wgpu::TextureFormat,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl CanvasPipeline {
    pub fn new(device: &wgpu::Device, connectivity: EdgeConnectivity) -> Self {
        let output_format = wgpu::TextureFormat::Rgba8Unorm;

        let buffer_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas_buffer_bgl"),
            entries: &[
                uniform_entry(
                    BufferIndex::Uniforms as u32,
                    wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ),
                uniform_entry(BufferIndex::Vertices as u32, wgpu::ShaderStages::VERTEX),
            ],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas_texture_bgl"),
            entries: &[
                texture_entry(
                    TextureIndex::Image as u32,
                    wgpu::TextureSampleType::Float { filterable: false },
                ),
                texture_entry(TextureIndex::Mask as u32, wgpu::TextureSampleType::Uint),
            ],
        });

        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("canvas_uniform_buf"),
            contents: bytemuck::bytes_of(&CanvasUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let quad_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("canvas_quad_buf"),
            contents: bytemuck::bytes_of(&QuadVertices::full_canvas()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let buffer_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("canvas_buffer_bg"),
            layout: &buffer_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BufferIndex::Uniforms as u32,
                    resource: uniform_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BufferIndex::Vertices as u32,
                    resource: quad_buf.as_entire_binding(),
                },
            ],
        });

        let pipeline = Self::build_pipeline(device, &buffer_bgl, &texture_bgl, output_format, connectivity);

        Self {
            pipeline,
            buffer_bgl,
            texture_bgl,
            uniform_buf,
            _quad_buf: quad_buf,
            buffer_bg,
            connectivity,
            output_format,
        }
    }

    fn build_pipeline(
        device: &wgpu::Device,
        buffer_bgl: &wgpu::BindGroupLayout,
        texture_bgl: &wgpu::BindGroupLayout,
        output_format: wgpu::TextureFormat,
        connectivity: EdgeConnectivity,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("canvas_shader"),
            source: wgpu::ShaderSource::Wgsl(canvas_shader(connectivity).into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("canvas_pipeline_layout"),
            bind_group_layouts: &[buffer_bgl, texture_bgl],
            push_constant_ranges: &[],
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("canvas_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_canvas",
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_canvas",
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None, // shader writes the final value
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        })
    }

    /// Rebuild the pipeline when the edge rule changes.
    pub fn set_connectivity(&mut self, device: &wgpu::Device, connectivity: EdgeConnectivity) {
        if connectivity == self.connectivity {
            return;
        }
        self.pipeline = Self::build_pipeline(
            device,
            &self.buffer_bgl,
            &self.texture_bgl,
            self.output_format,
            connectivity,
        );
        self.connectivity = connectivity;
    }

    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        image_view: &wgpu::TextureView,
        mask_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("canvas_texture_bg"),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: TextureIndex::Image as u32,
                    resource: wgpu::BindingResource::TextureView(image_view),
                },
                wgpu::BindGroupEntry {
                    binding: TextureIndex::Mask as u32,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
            ],
        })
    }

    /// Draw one frame into `output_view` (cleared to transparent first).
    pub fn render(
        &self,
        ctx: &GpuContext,
        uniforms: &CanvasUniforms,
        texture_bg: &wgpu::BindGroup,
        output_view: &wgpu::TextureView,
    ) {
        ctx.queue.write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("canvas_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("canvas_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(BUFFER_GROUP, &self.buffer_bg, &[]);
            pass.set_bind_group(TEXTURE_GROUP, texture_bg, &[]);
            pass.draw(0..6, 0..1);
        }
        ctx.submit_one(encoder);
    }
}

// ============================================================================
// READBACK
// ============================================================================

/// Copy a whole 4-byte-per-texel texture into CPU memory, tightly packed.
///
/// The staging buffer is cached across calls and only regrown when a larger
/// texture comes through.  Returns `None` if mapping fails.
pub fn readback_texture(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    cached_staging: &mut Option<(wgpu::Buffer, u64)>,
) -> Option<Vec<u8>> {
    let device = &ctx.device;

    let bytes_per_row = super::aligned_bytes_per_row(width);
    let buffer_size = (bytes_per_row * height) as u64;

    let reuse = matches!(cached_staging, Some((_, sz)) if *sz >= buffer_size);
    if !reuse {
        let buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        *cached_staging = Some((buf, buffer_size));
    }
    let (staging, _) = cached_staging.as_ref()?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.submit_one(encoder);

    let slice = staging.slice(..buffer_size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            crate::log_err!("gpu: readback map error: {:?}", e);
            return None;
        }
        Err(e) => {
            crate::log_err!("gpu: readback channel error: {:?}", e);
            return None;
        }
    }

    let mapped = slice.get_mapped_range();
    let actual_row = (width * super::BYTES_PER_TEXEL) as usize;
    let mut result = Vec::with_capacity(actual_row * height as usize);
    for y in 0..height as usize {
        let start = y * bytes_per_row as usize;
        result.extend_from_slice(&mapped[start..start + actual_row]);
    }
    drop(mapped);
    staging.unmap();

    Some(result)
}
