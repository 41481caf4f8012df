// ============================================================================
// GPU CONTEXT — headless wgpu Device / Queue for stamping and compositing
// ============================================================================

use std::sync::Arc;

use crate::mask_space::MAX_MASK_DIMENSION;

/// Device, queue and adapter facts shared by every pipeline.
///
/// Creation is fallible by nature: no adapter, no compute support, or a
/// device that cannot hold a full-size mask all yield `None`, and the caller
/// stays on the CPU path.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    pub max_texture_dim: u32,
}

impl GpuContext {
    /// Hardware adapter first, then the software fallback adapter.
    pub fn new(preferred_gpu: &str) -> Option<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Some(ctx);
        }
        crate::log_warn!("gpu: no hardware adapter, trying software fallback");
        pollster::block_on(Self::new_async(preferred_gpu, true))
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power = match preferred_gpu.to_lowercase().as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            crate::log_warn!("gpu: adapter '{}' lacks compute shaders", info.name);
            return None;
        }

        let limits = adapter.limits();
        if limits.max_texture_dimension_2d < MAX_MASK_DIMENSION {
            crate::log_warn!(
                "gpu: adapter '{}' max texture {} < mask limit {}",
                info.name,
                limits.max_texture_dimension_2d,
                MAX_MASK_DIMENSION
            );
            return None;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("MaskCanvas GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
                        max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
                        max_compute_workgroups_per_dimension: limits
                            .max_compute_workgroups_per_dimension,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        crate::log_info!("gpu: using '{}' ({:?})", info.name, info.backend);

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: info.name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
