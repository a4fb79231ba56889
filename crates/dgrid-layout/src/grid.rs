//! Grid quantization and magnetic snapping.
//!
//! Every function here is pure. A non-positive or non-finite grid size
//! disables quantization and returns the input unchanged.

use dgrid_core::geometry::{Bounds, Position, Size};
use serde::{Deserialize, Serialize};

use crate::panel::{Panel, PanelId};

/// Tolerance used by [`is_on_grid`], relative to the grid multiple.
pub const GRID_EPSILON: f64 = 1e-9;

fn usable(grid_size: f64) -> bool {
    grid_size.is_finite() && grid_size > 0.0
}

/// Round `value` to the nearest multiple of `grid_size`; halves round up.
#[inline]
#[must_use]
pub fn snap_value(value: f64, grid_size: f64) -> f64 {
    if !usable(grid_size) || !value.is_finite() {
        return value;
    }
    (value / grid_size + 0.5).floor() * grid_size
}

/// Round each axis to the nearest grid multiple. Idempotent.
#[must_use]
pub fn snap_to_grid(position: Position, grid_size: f64) -> Position {
    Position::new(
        snap_value(position.x, grid_size),
        snap_value(position.y, grid_size),
    )
}

/// Whether both axes sit on a grid multiple.
#[must_use]
pub fn is_on_grid(position: Position, grid_size: f64) -> bool {
    if !usable(grid_size) {
        return false;
    }
    let on = |value: f64| {
        let q = value / grid_size;
        (q - q.round()).abs() <= GRID_EPSILON * q.abs().max(1.0)
    };
    on(position.x) && on(position.y)
}

/// Result of a magnetic snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticSnap {
    pub position: Position,
    pub snapped: bool,
}

/// Snap only when the nearest grid point is within `threshold` (Euclidean).
#[must_use]
pub fn magnetic_snap_to_grid(position: Position, grid_size: f64, threshold: f64) -> MagneticSnap {
    let nearest = snap_to_grid(position, grid_size);
    if usable(grid_size) && position.distance(nearest) <= threshold {
        MagneticSnap {
            position: nearest,
            snapped: true,
        }
    } else {
        MagneticSnap {
            position,
            snapped: false,
        }
    }
}

/// Snapped positions for every panel, in input order.
///
/// Only the origin moves; sizes are left alone.
#[must_use]
pub fn align_to_grid<'a>(
    panels: impl IntoIterator<Item = &'a Panel>,
    grid_size: f64,
) -> Vec<(PanelId, Position)> {
    panels
        .into_iter()
        .map(|panel| (panel.id, snap_to_grid(panel.position, grid_size)))
        .collect()
}

/// Round each dimension to the grid, never below one grid step.
#[must_use]
pub fn snap_size_to_grid(size: Size, grid_size: f64) -> Size {
    if !usable(grid_size) {
        return size;
    }
    Size::new(
        snap_value(size.width, grid_size).max(grid_size),
        snap_value(size.height, grid_size).max(grid_size),
    )
}

/// The closest of `common_sizes` within `distance`, if any. Earlier entries
/// win ties.
#[must_use]
pub fn snap_to_common_size(size: Size, common_sizes: &[Size], distance: f64) -> Option<Size> {
    let mut best: Option<(f64, Size)> = None;
    for candidate in common_sizes {
        let dw = candidate.width - size.width;
        let dh = candidate.height - size.height;
        let d = (dw * dw + dh * dh).sqrt();
        if d > distance {
            continue;
        }
        if best.is_none_or(|(best_d, _)| d < best_d) {
            best = Some((d, *candidate));
        }
    }
    best.map(|(_, size)| size)
}

/// Result of an edge snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSnap {
    pub position: Position,
    pub snapped_x: bool,
    pub snapped_y: bool,
}

/// Align `subject` to the nearest edge of any neighbour within `distance`.
///
/// On each axis the subject's leading and trailing edges are compared with
/// every neighbour's leading and trailing edges; the smallest adjustment
/// wins and earlier neighbours win ties.
#[must_use]
pub fn magnetic_snap_to_edges(subject: &Bounds, neighbours: &[Bounds], distance: f64) -> EdgeSnap {
    let dx = nearest_edge_adjustment(
        subject.left(),
        subject.right(),
        neighbours.iter().map(|n| (n.left(), n.right())),
        distance,
    );
    let dy = nearest_edge_adjustment(
        subject.top(),
        subject.bottom(),
        neighbours.iter().map(|n| (n.top(), n.bottom())),
        distance,
    );
    EdgeSnap {
        position: Position::new(subject.x + dx.unwrap_or(0.0), subject.y + dy.unwrap_or(0.0)),
        snapped_x: dx.is_some(),
        snapped_y: dy.is_some(),
    }
}

fn nearest_edge_adjustment(
    lead: f64,
    trail: f64,
    edges: impl Iterator<Item = (f64, f64)>,
    distance: f64,
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (n_lead, n_trail) in edges {
        for adjustment in [
            n_lead - lead,
            n_trail - lead,
            n_lead - trail,
            n_trail - trail,
        ] {
            if !adjustment.is_finite() || adjustment.abs() > distance {
                continue;
            }
            if best.is_none_or(|b| adjustment.abs() < b.abs()) {
                best = Some(adjustment);
            }
        }
    }
    best
}

/// Magnetic grid snap with hysteresis for live drags.
///
/// A drag that snapped on the previous frame keeps that grid point while the
/// pointer stays within `snap_distance + hysteresis` of it, so small jitter
/// near the capture boundary does not flicker between snapped and free.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapTuning {
    pub grid_size: f64,
    pub snap_distance: f64,
    pub hysteresis: f64,
}

impl Default for SnapTuning {
    fn default() -> Self {
        Self {
            grid_size: crate::config::DEFAULT_GRID_SIZE,
            snap_distance: crate::config::DEFAULT_SNAP_DISTANCE,
            hysteresis: crate::config::DEFAULT_SNAP_HYSTERESIS,
        }
    }
}

/// Snap decision categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapReason {
    RetainedPrevious,
    SnappedNearest,
    UnsnapOutsideWindow,
}

/// Output of [`SnapTuning::decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapDecision {
    pub input: Position,
    pub snapped: Option<Position>,
    pub nearest: Position,
    pub nearest_distance: f64,
    pub reason: SnapReason,
}

impl SnapDecision {
    /// The position to display: snapped if any, otherwise the input.
    #[must_use]
    pub fn position(&self) -> Position {
        self.snapped.unwrap_or(self.input)
    }
}

impl SnapTuning {
    #[must_use]
    pub fn decide(self, position: Position, previous: Option<Position>) -> SnapDecision {
        let nearest = snap_to_grid(position, self.grid_size);
        let nearest_distance = position.distance(nearest);

        if let Some(previous) = previous
            && position.distance(previous) <= self.snap_distance + self.hysteresis
        {
            return SnapDecision {
                input: position,
                snapped: Some(previous),
                nearest,
                nearest_distance,
                reason: SnapReason::RetainedPrevious,
            };
        }

        if usable(self.grid_size) && nearest_distance <= self.snap_distance {
            SnapDecision {
                input: position,
                snapped: Some(nearest),
                nearest,
                nearest_distance,
                reason: SnapReason::SnappedNearest,
            }
        } else {
            SnapDecision {
                input: position,
                snapped: None,
                nearest,
                nearest_distance,
                reason: SnapReason::UnsnapOutsideWindow,
            }
        }
    }
}
