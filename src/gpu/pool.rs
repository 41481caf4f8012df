// ============================================================================
// TARGET POOL — recycle frame render targets across canvas resizes
// ============================================================================

use std::collections::HashMap;

type PoolKey = (u32, u32);

/// Frame render targets keyed by canvas size.
///
/// A view that is resized back and forth (window drag, panel toggle) hands
/// its old target back here instead of dropping it, and picks it up again
/// when the canvas returns to that size.
pub struct TargetPool {
    pool: HashMap<PoolKey, Vec<wgpu::Texture>>,
    max_per_key: usize,
}

impl TargetPool {
    pub fn new() -> Self {
        Self {
            pool: HashMap::new(),
            max_per_key: 2,
        }
    }

    pub fn acquire(&mut self, width: u32, height: u32) -> Option<wgpu::Texture> {
        self.pool.get_mut(&(width, height)).and_then(|v| v.pop())
    }

    /// Return a target for reuse.  Dropped if the slot for this size is full.
    pub fn release(&mut self, texture: wgpu::Texture) {
        let key = (texture.width(), texture.height());
        let entry = self.pool.entry(key).or_default();
        if entry.len() < self.max_per_key {
            entry.push(texture);
        }
    }

    pub fn clear(&mut self) {
        self.pool.clear();
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.values().map(|v| v.len()).sum()
    }
}

impl Default for TargetPool {
    fn default() -> Self {
        Self::new()
    }
}
