// ============================================================================
// MASK STORE — one class index per oversampled mask cell
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::palette::MAX_CLASSES;

/// Class value of an unpainted cell.
pub const NO_CLASS: u8 = 0;

/// Rectangular region of mask cells touched since the last GPU sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    pub fn full(width: u32, height: u32) -> Self {
        DirtyRect { x: 0, y: 0, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &DirtyRect) -> DirtyRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        DirtyRect { x: x0, y: y0, width: x1 - x0, height: y1 - y0 }
    }

}

/// Cells changed between generation `since` and the store's current
/// generation.  A consumer whose copy is at any other generation cannot use
/// `rect` alone and must re-read the whole mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskDelta {
    pub since: u64,
    pub rect: DirtyRect,
}

/// Which neighbors decide whether a painted cell sits on a region boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeConnectivity {
    /// Left, right, up, down.
    Four,
    /// The four axis neighbors plus diagonals.
    #[default]
    Eight,
}

impl EdgeConnectivity {
    pub fn offsets(self) -> &'static [(i32, i32)] {
        const FOUR: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        const EIGHT: [(i32, i32); 8] = [
            (-1, -1), (0, -1), (1, -1),
            (-1, 0),           (1, 0),
            (-1, 1),  (0, 1),  (1, 1),
        ];
        match self {
            EdgeConnectivity::Four => &FOUR,
            EdgeConnectivity::Eight => &EIGHT,
        }
    }
}

/// Dense per-cell class grid.  Written only by the brush stamp engine.
#[derive(Clone, Debug)]
pub struct MaskStore {
    width: u32,
    height: u32,
    cells: Vec<u8>,
    /// Bumped on every mutation.
    generation: u64,
    /// Union of cells changed since the last `take_dirty()`.
    dirty: Option<DirtyRect>,
    /// Generation at the last `take_dirty()` (or load).
    dirty_since: u64,
}

impl MaskStore {
    /// Create an empty (all `NO_CLASS`) mask.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            cells: vec![NO_CLASS; width as usize * height as usize],
            generation: 0,
            dirty: None,
            dirty_since: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Class at `(x, y)`, or `None` outside the mask.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// Class at a signed coordinate, clamping to the nearest border cell.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.cells[self.index(cx, cy)]
    }

    /// Mutable row slice; used by the stamp engine for its bounded scan.
    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = self.index(0, y);
        let end = start + self.width as usize;
        &mut self.cells[start..end]
    }

    /// Record a mutation over `rect`.
    pub(crate) fn mark_dirty(&mut self, rect: DirtyRect) {
        if rect.is_empty() {
            return;
        }
        self.generation += 1;
        self.dirty = Some(match self.dirty {
            Some(existing) => existing.union(&rect),
            None => rect,
        });
    }

    /// Region changed since the previous call (for partial GPU upload),
    /// tagged with the generation it is relative to.
    pub fn take_dirty(&mut self) -> Option<MaskDelta> {
        let since = std::mem::replace(&mut self.dirty_since, self.generation);
        self.dirty.take().map(|rect| MaskDelta { since, rect })
    }

    /// `true` if a painted cell touches a cell of another class.  Unpainted
    /// cells are never edges.  Neighbors past the border count as the same
    /// class, so regions touching the mask border are not outlined there.
    pub fn is_edge(&self, x: u32, y: u32, connectivity: EdgeConnectivity) -> bool {
        let Some(class) = self.get(x, y) else { return false };
        if class == NO_CLASS {
            return false;
        }
        connectivity.offsets().iter().any(|&(dx, dy)| {
            let nx = x as i64 + dx as i64;
            let ny = y as i64 + dy as i64;
            if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                return false;
            }
            self.cells[self.index(nx as u32, ny as u32)] != class
        })
    }

    /// Number of cells holding `class`.
    pub fn count(&self, class: u8) -> usize {
        self.cells.iter().filter(|&&c| c == class).count()
    }

    /// Copy out a rectangle of cells, widened to `u32` for GPU upload.
    pub fn extract_region_u32(&self, rect: &DirtyRect) -> Vec<u32> {
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = self.index(rect.x, y);
            out.extend(self.cells[start..start + rect.width as usize].iter().map(|&c| c as u32));
        }
        out
    }

    /// Replace all cells from a GPU readback (one `u32` per cell).
    ///
    /// Refuses (and leaves the store untouched) when the length is wrong or
    /// any value is not a class index.
    pub fn load_from_u32(&mut self, data: &[u32]) -> bool {
        if data.len() != self.cells.len() {
            return false;
        }
        if let Some(bad) = data.iter().find(|&&c| c > MAX_CLASSES as u32) {
            crate::log_err!("mask: readback holds class {} (max {})", bad, MAX_CLASSES);
            return false;
        }
        for (dst, &src) in self.cells.iter_mut().zip(data) {
            *dst = src as u8;
        }
        self.generation += 1;
        self.dirty = None;
        self.dirty_since = self.generation;
        true
    }

    /// Consistent copy for the saving subsystem.
    pub fn snapshot(&self) -> MaskSnapshot {
        MaskSnapshot {
            width: self.width,
            height: self.height,
            generation: self.generation,
            cells: self.cells.clone(),
        }
    }
}

// ============================================================================
// HAND-OFF FORMAT
// ============================================================================

const SNAPSHOT_MAGIC: &[u8; 4] = b"MSK1";

/// Frozen mask contents handed to persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskSnapshot {
    pub width: u32,
    pub height: u32,
    pub generation: u64,
    pub cells: Vec<u8>,
}

/// Error type for mask snapshot encoding.
#[derive(Debug)]
pub enum SnapshotError {
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SnapshotError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<Box<bincode::ErrorKind>> for SnapshotError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SnapshotError::Serialize(e.to_string())
    }
}

impl MaskSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut out = SNAPSHOT_MAGIC.to_vec();
        out.extend(bincode::serialize(self)?);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let Some(body) = bytes.strip_prefix(SNAPSHOT_MAGIC.as_slice()) else {
            return Err(SnapshotError::InvalidFormat("missing MSK1 header".into()));
        };
        let snap: MaskSnapshot = bincode::deserialize(body)?;
        if snap.width == 0 || snap.height == 0 {
            return Err(SnapshotError::InvalidFormat(format!(
                "empty {}x{} mask",
                snap.width, snap.height
            )));
        }
        if snap.cells.len() != snap.width as usize * snap.height as usize {
            return Err(SnapshotError::InvalidFormat(format!(
                "{} cells for a {}x{} mask",
                snap.cells.len(),
                snap.width,
                snap.height
            )));
        }
        if let Some(bad) = snap.cells.iter().find(|&&c| c as usize > MAX_CLASSES) {
            return Err(SnapshotError::InvalidFormat(format!("class index {} out of range", bad)));
        }
        Ok(snap)
    }

    /// Rebuild a store from a snapshot that passed `from_bytes` (or came
    /// from `MaskStore::snapshot`).  Generation is carried over.
    pub fn into_store(self) -> MaskStore {
        debug_assert_eq!(self.cells.len(), self.width as usize * self.height as usize);
        MaskStore {
            width: self.width,
            height: self.height,
            generation: self.generation,
            cells: self.cells,
            dirty: None,
            dirty_since: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: u32, y: u32, width: u32, height: u32) -> DirtyRect {
        DirtyRect { x, y, width, height }
    }

    #[test]
    fn new_mask_is_unpainted() {
        let m = MaskStore::new(8, 4);
        assert_eq!(m.cells().len(), 32);
        assert_eq!(m.count(NO_CLASS), 32);
        assert_eq!(m.get(8, 0), None);
        assert_eq!(m.get_clamped(-3, 100), NO_CLASS);
    }

    #[test]
    fn dirty_rects_union_and_bump_generation() {
        let mut m = MaskStore::new(16, 16);
        m.mark_dirty(rect(2, 2, 2, 2));
        m.mark_dirty(rect(10, 1, 1, 5));
        m.mark_dirty(rect(0, 0, 0, 0));
        assert_eq!(m.generation(), 2);
        assert_eq!(m.take_dirty(), Some(MaskDelta { since: 0, rect: rect(2, 1, 9, 5) }));
        assert_eq!(m.take_dirty(), None);
    }

    #[test]
    fn edges_between_classes_only() {
        let mut m = MaskStore::new(4, 3);
        m.row_mut(1).copy_from_slice(&[1, 1, 2, 0]);
        assert!(m.is_edge(1, 1, EdgeConnectivity::Four));
        assert!(m.is_edge(2, 1, EdgeConnectivity::Four));
        assert!(!m.is_edge(3, 1, EdgeConnectivity::Four), "unpainted cells are never edges");
        assert!(m.is_edge(0, 1, EdgeConnectivity::Four), "row above is unpainted");
    }

    #[test]
    fn border_does_not_create_edges() {
        let mut m = MaskStore::new(3, 3);
        for y in 0..3 {
            m.row_mut(y).fill(4);
        }
        for y in 0..3 {
            for x in 0..3 {
                assert!(!m.is_edge(x, y, EdgeConnectivity::Eight));
            }
        }
    }

    #[test]
    fn diagonal_neighbor_only_counts_with_eight_connectivity() {
        let mut m = MaskStore::new(3, 3);
        for y in 0..3 {
            m.row_mut(y).fill(1);
        }
        m.row_mut(0)[0] = 2;
        assert!(!m.is_edge(1, 1, EdgeConnectivity::Four));
        assert!(m.is_edge(1, 1, EdgeConnectivity::Eight));
    }

    #[test]
    fn snapshot_bytes_restore_the_store() {
        let mut m = MaskStore::new(5, 2);
        m.row_mut(1)[3] = 7;
        m.mark_dirty(rect(3, 1, 1, 1));
        let bytes = m.snapshot().to_bytes().unwrap();
        let restored = MaskSnapshot::from_bytes(&bytes).unwrap().into_store();
        assert_eq!(restored.cells(), m.cells());
        assert_eq!(restored.generation(), 1);
    }

    #[test]
    fn snapshot_rejects_garbage() {
        assert!(matches!(MaskSnapshot::from_bytes(b"nope"), Err(SnapshotError::InvalidFormat(_))));

        let bad = MaskSnapshot { width: 2, height: 2, generation: 0, cells: vec![0, 1, 2] };
        let bytes = bad.to_bytes().unwrap();
        assert!(matches!(MaskSnapshot::from_bytes(&bytes), Err(SnapshotError::InvalidFormat(_))));

        let out_of_range = MaskSnapshot { width: 1, height: 1, generation: 0, cells: vec![9] };
        let bytes = out_of_range.to_bytes().unwrap();
        assert!(MaskSnapshot::from_bytes(&bytes).is_err());
    }

    #[test]
    fn snapshot_rejects_zero_sized_masks() {
        for (width, height) in [(0, 4), (4, 0), (0, 0)] {
            let empty = MaskSnapshot { width, height, generation: 3, cells: vec![] };
            let bytes = empty.to_bytes().unwrap();
            assert!(
                matches!(MaskSnapshot::from_bytes(&bytes), Err(SnapshotError::InvalidFormat(_))),
                "{}x{} accepted",
                width,
                height
            );
        }
    }

    #[test]
    fn delta_is_relative_to_the_previous_take() {
        let mut m = MaskStore::new(16, 16);
        m.mark_dirty(rect(1, 1, 2, 2));
        let first = m.take_dirty().unwrap();
        assert_eq!(first.since, 0);
        assert_eq!(m.generation(), 1);

        m.mark_dirty(rect(8, 8, 1, 1));
        m.mark_dirty(rect(12, 3, 1, 1));
        let second = m.take_dirty().unwrap();
        assert_eq!(second.since, 1);
        assert_eq!(second.rect, rect(8, 3, 5, 6));
        assert_eq!(m.generation(), 3);

        assert!(m.load_from_u32(&[2; 256]));
        m.mark_dirty(rect(0, 0, 1, 1));
        assert_eq!(m.take_dirty().unwrap().since, 4);
    }

    #[test]
    fn readback_with_bad_class_is_refused() {
        let mut m = MaskStore::new(2, 2);
        m.row_mut(0)[1] = 3;
        let generation = m.generation();
        assert!(!m.load_from_u32(&[0, 1, MAX_CLASSES as u32 + 1, 0]));
        assert_eq!(m.cells(), &[0, 3, 0, 0]);
        assert_eq!(m.generation(), generation);
        assert!(m.load_from_u32(&[0, 1, MAX_CLASSES as u32, 0]));
    }

    #[test]
    fn region_extraction_widens_cells() {
        let mut m = MaskStore::new(4, 4);
        m.row_mut(2).copy_from_slice(&[0, 3, 5, 0]);
        assert_eq!(m.extract_region_u32(&rect(1, 2, 2, 1)), vec![3, 5]);
        assert!(m.load_from_u32(&[1; 16]));
        assert_eq!(m.count(1), 16);
        assert!(!m.load_from_u32(&[1; 3]));
    }
}
