// ============================================================================
// GPU MODULE — hardware-accelerated stamping and compositing for MaskCanvas
// ============================================================================
//
// Architecture:
//   context.rs    — wgpu Device, Queue, adapter init
//   shaders.rs    — all WGSL shader source (inline strings)
//   texture.rs    — image / mask textures with partial upload
//   compositor.rs — render pipeline producing the displayed canvas frame
//   compute.rs    — compute pipeline for brush stamps
//   pool.rs       — render-target recycling pool
//   renderer.rs   — top-level GpuRenderer coordinator
// ============================================================================

pub mod context;
pub mod shaders;
pub mod texture;
pub mod compositor;
pub mod compute;
pub mod pool;
pub mod renderer;

pub use renderer::GpuRenderer;

/// Bytes per texel for every texture this module reads back
/// (`Rgba8Unorm` frames and `R32Uint` masks).
pub const BYTES_PER_TEXEL: u32 = 4;

/// Row pitch for texture→buffer copies: `width * 4` rounded up to
/// `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256).
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * BYTES_PER_TEXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_pitch_is_256_aligned() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        assert_eq!(aligned_bytes_per_row(200), 1024);
    }
}
