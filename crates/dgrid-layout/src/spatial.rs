//! Uniform-grid spatial index for broad-phase collision queries.
//!
//! The workspace is divided into square buckets of `bucket_size` units. A
//! panel is registered in every bucket its box touches, so any two boxes
//! that overlap share at least one bucket. Queries collect the panels in
//! the buckets touched by the (gap-inflated) query box.
//!
//! Queries never produce false negatives. They may return false positives,
//! which the narrow phase in [`crate::collision`] filters out.
//!
//! Boxes that would span more than [`MAX_BUCKETS_PER_ENTRY`] buckets, and
//! boxes with non-finite geometry, are kept in an overflow set that every
//! query returns. This bounds the per-update cost without losing recall.

use std::collections::BTreeSet;

use dgrid_core::geometry::{Bounds, Position};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::panel::PanelId;

/// Upper bound on buckets a single entry may occupy before it is moved to
/// the overflow set.
pub const MAX_BUCKETS_PER_ENTRY: u64 = 4_096;

type BucketKey = (i64, i64);

/// Inclusive bucket range covered by one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRange {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl CellRange {
    fn cell_count(self) -> u64 {
        let w = (self.x1 - self.x0 + 1).max(0) as u64;
        let h = (self.y1 - self.y0 + 1).max(0) as u64;
        w.saturating_mul(h)
    }

    fn keys(self) -> impl Iterator<Item = BucketKey> {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    bounds: Bounds,
    cells: Option<CellRange>,
}

/// Bucketed lookup from workspace area to panel ids.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bucket_size: f64,
    buckets: FxHashMap<BucketKey, FxHashSet<PanelId>>,
    entries: FxHashMap<PanelId, IndexEntry>,
    overflow: FxHashSet<PanelId>,
}

impl SpatialIndex {
    /// Create an empty index. Non-positive or non-finite bucket sizes fall
    /// back to 1.0.
    #[must_use]
    pub fn new(bucket_size: f64) -> Self {
        let bucket_size = if bucket_size.is_finite() && bucket_size > 0.0 {
            bucket_size
        } else {
            1.0
        };
        Self {
            bucket_size,
            buckets: FxHashMap::default(),
            entries: FxHashMap::default(),
            overflow: FxHashSet::default(),
        }
    }

    #[must_use]
    pub const fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    /// Number of indexed panels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of non-empty buckets (diagnostics).
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn contains(&self, id: PanelId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Indexed bounds for a panel.
    #[must_use]
    pub fn bounds(&self, id: PanelId) -> Option<Bounds> {
        self.entries.get(&id).map(|entry| entry.bounds)
    }

    /// Register a panel. Re-adding an existing id replaces its bounds.
    pub fn add(&mut self, id: PanelId, bounds: Bounds) {
        if self.entries.contains_key(&id) {
            self.update(id, bounds);
            return;
        }
        let cells = self.cells_for(&bounds, 0.0);
        self.insert_cells(id, cells);
        self.entries.insert(id, IndexEntry { bounds, cells });
    }

    /// Remove a panel. Returns whether it was present.
    pub fn remove(&mut self, id: PanelId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        self.remove_cells(id, entry.cells);
        true
    }

    /// Move a panel to new bounds, touching only the buckets that changed.
    pub fn update(&mut self, id: PanelId, bounds: Bounds) {
        let Some(entry) = self.entries.get(&id).copied() else {
            self.add(id, bounds);
            return;
        };
        let cells = self.cells_for(&bounds, 0.0);
        if cells != entry.cells {
            self.remove_cells(id, entry.cells);
            self.insert_cells(id, cells);
        }
        self.entries.insert(id, IndexEntry { bounds, cells });
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.entries.clear();
        self.overflow.clear();
    }

    /// Candidate panels that may overlap `bounds` inflated by `gap`.
    ///
    /// The result is sorted by id so callers iterate deterministically.
    #[must_use]
    pub fn find_nearby(&self, bounds: &Bounds, gap: f64) -> BTreeSet<PanelId> {
        let mut out: BTreeSet<PanelId> = self.overflow.iter().copied().collect();
        match self.cells_for(bounds, gap.max(0.0)) {
            Some(range) if range.cell_count() <= MAX_BUCKETS_PER_ENTRY => {
                for key in range.keys() {
                    if let Some(bucket) = self.buckets.get(&key) {
                        out.extend(bucket.iter().copied());
                    }
                }
            }
            // Query too large or not finite: every entry is a candidate.
            _ => out.extend(self.entries.keys().copied()),
        }
        out
    }

    /// Panels whose indexed box contains `point`, topmost-first ordering is
    /// left to the caller.
    #[must_use]
    pub fn query_point(&self, point: Position) -> Vec<PanelId> {
        let key = (
            (point.x / self.bucket_size).floor() as i64,
            (point.y / self.bucket_size).floor() as i64,
        );
        let mut candidates: BTreeSet<PanelId> = self.overflow.iter().copied().collect();
        if let Some(bucket) = self.buckets.get(&key) {
            candidates.extend(bucket.iter().copied());
        }
        candidates
            .into_iter()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| entry.bounds.contains_point(point))
            })
            .collect()
    }

    fn cells_for(&self, bounds: &Bounds, gap: f64) -> Option<CellRange> {
        if !bounds.is_finite() || !gap.is_finite() {
            return None;
        }
        let b = self.bucket_size;
        // The right/bottom bucket is inclusive so a box ending exactly on a
        // bucket boundary is also registered in the next bucket. This only
        // adds false positives.
        let range = CellRange {
            x0: ((bounds.x - gap) / b).floor() as i64,
            y0: ((bounds.y - gap) / b).floor() as i64,
            x1: ((bounds.right() + gap) / b).floor() as i64,
            y1: ((bounds.bottom() + gap) / b).floor() as i64,
        };
        Some(range)
    }

    fn insert_cells(&mut self, id: PanelId, cells: Option<CellRange>) {
        match cells {
            Some(range) if range.cell_count() <= MAX_BUCKETS_PER_ENTRY => {
                for key in range.keys() {
                    self.buckets.entry(key).or_default().insert(id);
                }
            }
            _ => {
                self.overflow.insert(id);
            }
        }
    }

    fn remove_cells(&mut self, id: PanelId, cells: Option<CellRange>) {
        match cells {
            Some(range) if range.cell_count() <= MAX_BUCKETS_PER_ENTRY => {
                for key in range.keys() {
                    if let Some(bucket) = self.buckets.get_mut(&key) {
                        bucket.remove(&id);
                        if bucket.is_empty() {
                            self.buckets.remove(&key);
                        }
                    }
                }
            }
            _ => {
                self.overflow.remove(&id);
            }
        }
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GRID_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> PanelId {
        PanelId::new(raw).expect("test ID must be non-zero")
    }

    #[test]
    fn panel_occupies_every_touched_bucket() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(10.0, 10.0, 30.0, 15.0));
        // x: 10..40 -> buckets 0..=2, y: 10..25 -> buckets 0..=1
        assert_eq!(index.bucket_count(), 6);
    }

    #[test]
    fn nearby_includes_true_collisions() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(100.0, 100.0, 200.0, 150.0));
        index.add(id(2), Bounds::new(400.0, 400.0, 200.0, 150.0));
        let nearby = index.find_nearby(&Bounds::new(150.0, 125.0, 200.0, 150.0), 0.0);
        assert!(nearby.contains(&id(1)));
        assert!(!nearby.contains(&id(2)));
    }

    #[test]
    fn gap_widens_the_query() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 20.0, 20.0));
        let far = Bounds::new(70.0, 0.0, 20.0, 20.0);
        assert!(index.find_nearby(&far, 0.0).is_empty());
        assert!(index.find_nearby(&far, 40.0).contains(&id(1)));
    }

    #[test]
    fn update_moves_buckets() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 10.0, 10.0));
        index.update(id(1), Bounds::new(500.0, 500.0, 10.0, 10.0));
        assert!(
            index
                .find_nearby(&Bounds::new(0.0, 0.0, 10.0, 10.0), 0.0)
                .is_empty()
        );
        assert!(
            index
                .find_nearby(&Bounds::new(505.0, 505.0, 1.0, 1.0), 0.0)
                .contains(&id(1))
        );
        assert_eq!(index.bounds(id(1)), Some(Bounds::new(500.0, 500.0, 10.0, 10.0)));
    }

    #[test]
    fn remove_cleans_empty_buckets() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 50.0, 50.0));
        assert!(index.remove(id(1)));
        assert!(!index.remove(id(1)));
        assert_eq!(index.bucket_count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn huge_boxes_go_to_overflow_and_are_always_candidates() {
        let mut index = SpatialIndex::new(1.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 10_000.0, 10_000.0));
        assert_eq!(index.bucket_count(), 0);
        let nearby = index.find_nearby(&Bounds::new(9_000.0, 9_000.0, 1.0, 1.0), 0.0);
        assert!(nearby.contains(&id(1)));
        assert!(index.remove(id(1)));
        assert!(
            index
                .find_nearby(&Bounds::new(0.0, 0.0, 1.0, 1.0), 0.0)
                .is_empty()
        );
    }

    #[test]
    fn non_finite_bounds_are_never_lost() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(f64::NAN, 0.0, 10.0, 10.0));
        assert!(
            index
                .find_nearby(&Bounds::new(0.0, 0.0, 1.0, 1.0), 0.0)
                .contains(&id(1))
        );
    }

    #[test]
    fn query_point_filters_exactly() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 15.0, 15.0));
        index.add(id(2), Bounds::new(16.0, 0.0, 15.0, 15.0));
        assert_eq!(index.query_point(Position::new(5.0, 5.0)), vec![id(1)]);
        assert_eq!(index.query_point(Position::new(17.0, 5.0)), vec![id(2)]);
        assert!(index.query_point(Position::new(15.5, 5.0)).is_empty());
    }

    #[test]
    fn invalid_bucket_size_falls_back() {
        assert_eq!(SpatialIndex::new(0.0).bucket_size(), 1.0);
        assert_eq!(SpatialIndex::new(f64::INFINITY).bucket_size(), 1.0);
    }
}
