//! Container clamping, size constraints, placement and free-space analysis.

use dgrid_core::geometry::{Bounds, Position, Size};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::collision::{
    Placement, PlacementStrategy, SearchBudget, fallback_placement, is_valid_position,
};
use crate::error::Axis;
use crate::grid::{snap_to_common_size, snap_value};
use crate::panel::PanelConstraints;

/// Clamp a box of `size` at `position` fully inside `container`.
///
/// On an axis where the box is larger than the container it is pinned to
/// the container origin.
#[must_use]
pub fn constrain_position(position: Position, size: Size, container: &Bounds) -> Position {
    let clamp_axis = |value: f64, extent: f64, origin: f64, span: f64| {
        if extent >= span {
            origin
        } else {
            value.clamp(origin, origin + span - extent)
        }
    };
    Position::new(
        clamp_axis(position.x, size.width, container.x, container.width),
        clamp_axis(position.y, size.height, container.y, container.height),
    )
}

/// First free slot for `size` scanning the container row-major at `budget.step`.
///
/// Slots are tried from the container origin, left to right and then top to
/// bottom. Once the budget is spent (or every slot is taken) the shared
/// stacking/below-all fallback runs from the container origin.
pub fn find_optimal_position(
    size: Size,
    existing: &[Bounds],
    container: &Bounds,
    gap: f64,
    budget: &SearchBudget,
) -> Placement {
    let step = if budget.step.is_finite() && budget.step > 0.0 {
        budget.step
    } else {
        1.0
    };
    let origin = container.position();
    let mut iterations = 0;

    if size.width <= container.width && size.height <= container.height {
        let max_x = container.right() - size.width;
        let max_y = container.bottom() - size.height;
        let mut row = 0u32;
        'scan: loop {
            let y = origin.y + f64::from(row) * step;
            if y > max_y {
                break;
            }
            let mut col = 0u32;
            loop {
                let x = origin.x + f64::from(col) * step;
                if x > max_x {
                    break;
                }
                if iterations >= budget.max_iterations {
                    break 'scan;
                }
                iterations += 1;
                let candidate = Position::new(x, y);
                if is_valid_position(candidate, size, existing, gap) {
                    trace!(iterations, x, y, "free slot found");
                    return Placement {
                        position: candidate,
                        strategy: PlacementStrategy::Desired,
                        iterations,
                    };
                }
                col += 1;
            }
            row += 1;
        }
    }

    fallback_placement(origin, size, existing, gap, budget, Some(container), iterations)
}

/// Free space left in a container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvailableSpace {
    /// Exact free area: container area minus the union of occupied boxes.
    pub total_area: f64,
    /// Maximal free rectangles, sorted top-left first. Regions may overlap
    /// one another.
    pub regions: Vec<Bounds>,
}

/// Upper bound on the free-rectangle working set in
/// [`calculate_available_space`].
pub const MAX_FREE_REGIONS: usize = 2048;

/// Partition the free part of `container` into maximal rectangles.
///
/// Occupied boxes are clipped to the container first; boxes outside it are
/// ignored.
///
/// Each occupied box splits every free rectangle it touches and the result
/// is pruned pairwise, so cost grows with the square of the working set per
/// box. The working set is capped at [`MAX_FREE_REGIONS`], keeping the
/// largest rectangles; past the cap `regions` may miss small gaps but
/// `total_area` stays exact. The area sweep is O(n² log n) in the number of
/// occupied boxes.
#[must_use]
pub fn calculate_available_space(occupied: &[Bounds], container: &Bounds) -> AvailableSpace {
    let clipped: Vec<Bounds> = occupied
        .iter()
        .filter(|b| b.is_finite())
        .filter_map(|b| b.intersection_opt(container))
        .collect();

    let mut free = if container.is_empty() {
        Vec::new()
    } else {
        vec![*container]
    };
    for used in &clipped {
        let mut next = Vec::with_capacity(free.len() + 4);
        for rect in free {
            if rect.intersects(used) {
                split_free_rect(&rect, used, &mut next);
            } else {
                next.push(rect);
            }
        }
        free = prune_contained(next);
        if free.len() > MAX_FREE_REGIONS {
            warn!(
                regions = free.len(),
                cap = MAX_FREE_REGIONS,
                "free region set truncated"
            );
            free.sort_by(|a, b| b.area().total_cmp(&a.area()));
            free.truncate(MAX_FREE_REGIONS);
        }
    }
    free.sort_by(|a, b| {
        a.y.total_cmp(&b.y)
            .then(a.x.total_cmp(&b.x))
            .then(b.width.total_cmp(&a.width))
            .then(b.height.total_cmp(&a.height))
    });

    let occupied_area = union_area(&clipped);
    AvailableSpace {
        total_area: (container.area() - occupied_area).max(0.0),
        regions: free,
    }
}

/// Up to four maximal pieces of `rect` around `used`.
fn split_free_rect(rect: &Bounds, used: &Bounds, out: &mut Vec<Bounds>) {
    if used.x > rect.x {
        out.push(Bounds::new(rect.x, rect.y, used.x - rect.x, rect.height));
    }
    if used.right() < rect.right() {
        out.push(Bounds::new(
            used.right(),
            rect.y,
            rect.right() - used.right(),
            rect.height,
        ));
    }
    if used.y > rect.y {
        out.push(Bounds::new(rect.x, rect.y, rect.width, used.y - rect.y));
    }
    if used.bottom() < rect.bottom() {
        out.push(Bounds::new(
            rect.x,
            used.bottom(),
            rect.width,
            rect.bottom() - used.bottom(),
        ));
    }
}

fn prune_contained(rects: Vec<Bounds>) -> Vec<Bounds> {
    let mut kept: Vec<Bounds> = Vec::with_capacity(rects.len());
    for (i, rect) in rects.iter().enumerate() {
        if rect.is_empty() {
            continue;
        }
        let dominated = rects.iter().enumerate().any(|(j, other)| {
            // Identical rectangles: keep the first occurrence only.
            i != j && other.contains(rect) && (other != rect || j < i)
        });
        if !dominated {
            kept.push(*rect);
        }
    }
    kept
}

/// Area of the union of `boxes`, sweeping vertical slabs between distinct
/// x edges and merging the y intervals that cross each slab.
fn union_area(boxes: &[Bounds]) -> f64 {
    if boxes.is_empty() {
        return 0.0;
    }
    let mut xs: Vec<f64> = boxes.iter().flat_map(|b| [b.x, b.right()]).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();

    let mut area = 0.0;
    let mut spans: Vec<(f64, f64)> = Vec::with_capacity(boxes.len());
    for xw in xs.windows(2) {
        let (left, right) = (xw[0], xw[1]);
        spans.clear();
        spans.extend(
            boxes
                .iter()
                .filter(|b| b.x <= left && b.right() >= right)
                .map(|b| (b.y, b.bottom())),
        );
        if spans.is_empty() {
            continue;
        }
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut covered = 0.0;
        let (mut start, mut end) = spans[0];
        for &(top, bottom) in &spans[1..] {
            if top > end {
                covered += end - start;
                start = top;
                end = bottom;
            } else if bottom > end {
                end = bottom;
            }
        }
        covered += end - start;
        area += covered * (right - left);
    }
    area
}

/// One change made by [`enforce_constraints`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    ClampedToMin { axis: Axis, from: f64, to: f64 },
    ClampedToMax { axis: Axis, from: f64, to: f64 },
    AspectRatioRestored { axis: Axis, from: f64, to: f64 },
    SnappedToGrid { axis: Axis, from: f64, to: f64 },
    SnappedToCommonSize { from: Size, to: Size },
    /// Shrunk so the box stays inside the container.
    ClampedToContainer { axis: Axis, from: f64, to: f64 },
}

/// A size after the constraint pipeline, with what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSize {
    pub size: Size,
    pub adjustments: Vec<Adjustment>,
}

impl ConstrainedSize {
    #[must_use]
    pub fn was_adjusted(&self) -> bool {
        !self.adjustments.is_empty()
    }
}

/// Apply the fixed constraint pipeline to a requested size.
///
/// 1. Clamp each axis to `[min, max]`.
/// 2. When `aspect_locked`, recompute the axis that changed less relative to
///    `original` so the ratio holds again. The ratio is the panel's aspect
///    constraint if it has one, otherwise the ratio of `original`. If the
///    recomputed axis leaves its bounds it is clamped and the other axis is
///    recomputed from it.
/// 3. When size snapping is enabled, snap to a common size within the snap
///    distance, or else round each axis to the grid without leaving
///    `[min, max]`.
#[must_use]
pub fn enforce_constraints(
    requested: Size,
    constraints: &PanelConstraints,
    original: Size,
    aspect_locked: bool,
) -> ConstrainedSize {
    let mut adjustments = Vec::new();
    let mut width = clamp_axis(Axis::Width, requested.width, constraints, &mut adjustments);
    let mut height = clamp_axis(Axis::Height, requested.height, constraints, &mut adjustments);

    let ratio = constraints
        .aspect_ratio
        .map(|aspect| aspect.ratio)
        .or_else(|| original.aspect_ratio())
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0);
    if aspect_locked && let Some(ratio) = ratio {
        let tolerance = constraints
            .aspect_ratio
            .map_or(0.0, |aspect| aspect.tolerance.max(0.0));
        let actual = width / height;
        if !(actual.is_finite() && ((actual - ratio) / ratio).abs() <= tolerance) {
            let width_change = relative_change(width, original.width);
            let height_change = relative_change(height, original.height);
            if height_change <= width_change {
                let target = width / ratio;
                let before = height;
                height = clamp_silently(Axis::Height, target, constraints);
                adjustments.push(Adjustment::AspectRatioRestored {
                    axis: Axis::Height,
                    from: before,
                    to: height,
                });
                if height != target {
                    let back = clamp_silently(Axis::Width, height * ratio, constraints);
                    adjustments.push(Adjustment::AspectRatioRestored {
                        axis: Axis::Width,
                        from: width,
                        to: back,
                    });
                    width = back;
                }
            } else {
                let target = height * ratio;
                let before = width;
                width = clamp_silently(Axis::Width, target, constraints);
                adjustments.push(Adjustment::AspectRatioRestored {
                    axis: Axis::Width,
                    from: before,
                    to: width,
                });
                if width != target {
                    let back = clamp_silently(Axis::Height, width / ratio, constraints);
                    adjustments.push(Adjustment::AspectRatioRestored {
                        axis: Axis::Height,
                        from: height,
                        to: back,
                    });
                    height = back;
                }
            }
        }
    }

    if let Some(snap) = constraints.snap.as_ref().filter(|snap| snap.enabled) {
        let current = Size::new(width, height);
        let common = snap_to_common_size(current, &snap.common_sizes, snap.snap_distance)
            .filter(|candidate| size_violations(*candidate, constraints).is_empty());
        if let Some(common) = common {
            if common != current {
                adjustments.push(Adjustment::SnappedToCommonSize {
                    from: current,
                    to: common,
                });
            }
            width = common.width;
            height = common.height;
        } else if let Some(grid) = constraints.snap_grid() {
            width = snap_axis(Axis::Width, width, grid, constraints, &mut adjustments);
            height = snap_axis(Axis::Height, height, grid, constraints, &mut adjustments);
        }
    }

    ConstrainedSize {
        size: Size::new(width, height),
        adjustments,
    }
}

fn relative_change(value: f64, original: f64) -> f64 {
    if original.abs() > f64::EPSILON {
        ((value - original) / original).abs()
    } else {
        (value - original).abs()
    }
}

fn clamp_silently(axis: Axis, value: f64, constraints: &PanelConstraints) -> f64 {
    let (min, max) = constraints.axis_bounds(axis);
    let value = value.max(min);
    match max {
        Some(max) => value.min(max),
        None => value,
    }
}

fn clamp_axis(
    axis: Axis,
    value: f64,
    constraints: &PanelConstraints,
    adjustments: &mut Vec<Adjustment>,
) -> f64 {
    let (min, max) = constraints.axis_bounds(axis);
    if !(value >= min) {
        adjustments.push(Adjustment::ClampedToMin {
            axis,
            from: value,
            to: min,
        });
        return min;
    }
    if let Some(max) = max
        && value > max
    {
        adjustments.push(Adjustment::ClampedToMax {
            axis,
            from: value,
            to: max,
        });
        return max;
    }
    value
}

fn snap_axis(
    axis: Axis,
    value: f64,
    grid: f64,
    constraints: &PanelConstraints,
    adjustments: &mut Vec<Adjustment>,
) -> f64 {
    let (min, max) = constraints.axis_bounds(axis);
    let mut snapped = snap_value(value, grid);
    if snapped < min {
        snapped = (min / grid).ceil() * grid;
    }
    if let Some(max) = max
        && snapped > max
    {
        snapped = (max / grid).floor() * grid;
    }
    let in_range = snapped >= min && max.is_none_or(|max| snapped <= max);
    if !in_range || snapped == value {
        return value;
    }
    adjustments.push(Adjustment::SnappedToGrid {
        axis,
        from: value,
        to: snapped,
    });
    snapped
}

/// A size outside a panel's limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeViolation {
    BelowMinimum { axis: Axis, actual: f64, min: f64 },
    AboveMaximum { axis: Axis, actual: f64, max: f64 },
}

/// Limit breaches of `size` against `constraints`, width first.
#[must_use]
pub fn size_violations(size: Size, constraints: &PanelConstraints) -> Vec<SizeViolation> {
    let mut out = Vec::new();
    for (axis, actual) in [(Axis::Width, size.width), (Axis::Height, size.height)] {
        let (min, max) = constraints.axis_bounds(axis);
        if !(actual >= min) {
            out.push(SizeViolation::BelowMinimum { axis, actual, min });
        } else if let Some(max) = max
            && actual > max
        {
            out.push(SizeViolation::AboveMaximum { axis, actual, max });
        }
    }
    out
}
