//! Exact overlap tests and overlap-avoidance search.
//!
//! Two-stage detection: the [`SpatialIndex`] produces a candidate set (broad
//! phase) and [`check_collision`] filters it exactly (narrow phase).
//!
//! # Overlap avoidance
//!
//! [`prevent_overlap`] looks for the collision-free position closest to a
//! desired one:
//!
//! 1. The desired position itself.
//! 2. An expanding ring search at `step` granularity. Ring `r` holds the
//!    offsets whose Chebyshev distance from the desired cell is `r`,
//!    enumerated row-major (top row left to right, then each following
//!    row). Among free candidates the winner has the smallest Euclidean
//!    displacement, then the smallest `y`, then the smallest `x`. The search
//!    stops once no later ring can beat the current winner, or when the
//!    iteration budget runs out.
//! 3. Diagonal stacking at `stack_offset` from the desired position.
//! 4. Directly below every obstacle, which is always free.

use dgrid_core::geometry::{Bounds, Position, Size};
use tracing::{debug, trace, warn};

use crate::panel::{Panel, PanelId};
use crate::spatial::SpatialIndex;

/// Upper bound on diagonal stacking attempts before the below-all fallback.
const MAX_STACK_ATTEMPTS: usize = 64;

/// Relative tolerance for displacement ties.
const DISPLACEMENT_EPSILON: f64 = 1e-9;

/// Exact axis-aligned overlap test, inflated by `gap`.
///
/// Boxes closer than `gap` on both axes collide; boxes exactly `gap` apart
/// (or touching, when `gap` is 0) do not.
#[inline]
#[must_use]
pub fn check_collision(a: &Bounds, b: &Bounds, gap: f64) -> bool {
    let gap = gap.max(0.0);
    a.x < b.right() + gap && b.x < a.right() + gap && a.y < b.bottom() + gap && b.y < a.bottom() + gap
}

/// Outcome of a narrow-phase pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollisionResult {
    pub colliding: bool,
    /// Colliding panels, in candidate order.
    pub panels: Vec<PanelId>,
}

/// Narrow-phase test of `subject` against a candidate list.
pub fn find_collisions<I>(candidates: I, subject: &Bounds, gap: f64) -> CollisionResult
where
    I: IntoIterator<Item = (PanelId, Bounds)>,
{
    let panels: Vec<PanelId> = candidates
        .into_iter()
        .filter(|(_, bounds)| check_collision(bounds, subject, gap))
        .map(|(id, _)| id)
        .collect();
    CollisionResult {
        colliding: !panels.is_empty(),
        panels,
    }
}

/// Broad phase via `index`, narrow phase against the indexed bounds.
///
/// `skip` excludes ids from the result (the subject itself, the other
/// members of a group drag, hidden panels).
pub fn find_collisions_indexed(
    index: &SpatialIndex,
    subject: &Bounds,
    gap: f64,
    skip: impl Fn(PanelId) -> bool,
) -> CollisionResult {
    let candidates = index
        .find_nearby(subject, gap)
        .into_iter()
        .filter(|id| !skip(*id))
        .filter_map(|id| index.bounds(id).map(|bounds| (id, bounds)));
    find_collisions(candidates, subject, gap)
}

/// Visible panels as `(id, bounds)` obstacles, excluding `exclude`.
pub fn panel_obstacles<'a>(
    panels: impl IntoIterator<Item = &'a Panel>,
    exclude: &[PanelId],
) -> Vec<(PanelId, Bounds)> {
    panels
        .into_iter()
        .filter(|panel| panel.visible && !exclude.contains(&panel.id))
        .map(|panel| (panel.id, panel.bounds()))
        .collect()
}

/// Pure predicate: `size` at `position` is clear of every obstacle.
#[must_use]
pub fn is_valid_position(position: Position, size: Size, obstacles: &[Bounds], gap: f64) -> bool {
    let subject = Bounds::from_parts(position, size);
    !obstacles
        .iter()
        .any(|obstacle| check_collision(obstacle, &subject, gap))
}

/// Bounds for placement searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBudget {
    /// Search granularity (normally the grid size).
    pub step: f64,
    /// Maximum candidate positions examined.
    pub max_iterations: usize,
    /// Diagonal offset used when stacking.
    pub stack_offset: f64,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            step: crate::config::DEFAULT_GRID_SIZE,
            max_iterations: crate::config::DEFAULT_MAX_SEARCH_ITERATIONS,
            stack_offset: crate::config::DEFAULT_GRID_SIZE,
        }
    }
}

impl SearchBudget {
    fn step(&self) -> f64 {
        if self.step.is_finite() && self.step > 0.0 {
            self.step
        } else {
            1.0
        }
    }

    fn stack_offset(&self) -> f64 {
        if self.stack_offset.is_finite() && self.stack_offset > 0.0 {
            self.stack_offset
        } else {
            self.step()
        }
    }
}

/// How [`prevent_overlap`] found its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// The desired position was already free.
    Desired,
    /// Found by the ring search in ring `ring`.
    RingSearch { ring: u32 },
    /// Found by diagonal stacking after `attempt` offsets.
    Stacked { attempt: u32 },
    /// Placed below every obstacle.
    BelowAll,
}

/// Result of an overlap-avoidance search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Position,
    pub strategy: PlacementStrategy,
    /// Candidate positions examined.
    pub iterations: usize,
}

/// Find a collision-free position for `size` as close to `desired` as
/// possible.
///
/// When `container` is given, ring and stacking candidates must lie inside
/// it. The final below-all fallback ignores the container; it is the one
/// step that is guaranteed to succeed.
pub fn prevent_overlap(
    desired: Position,
    size: Size,
    obstacles: &[Bounds],
    gap: f64,
    budget: &SearchBudget,
    container: Option<&Bounds>,
) -> Placement {
    let fits = |pos: Position| {
        container.is_none_or(|area| area.contains(&Bounds::from_parts(pos, size)))
    };
    let free = |pos: Position| is_valid_position(pos, size, obstacles, gap);

    let mut iterations = 1;
    if free(desired) && fits(desired) {
        return Placement {
            position: desired,
            strategy: PlacementStrategy::Desired,
            iterations,
        };
    }

    let step = budget.step();
    let mut best: Option<(f64, Position, u32)> = None;
    let mut ring: u32 = 1;
    'rings: while iterations < budget.max_iterations {
        if let Some((best_d2, _, _)) = best {
            let nearest_in_ring = f64::from(ring) * step;
            if nearest_in_ring * nearest_in_ring > best_d2 * (1.0 + DISPLACEMENT_EPSILON) {
                break;
            }
        }
        for (dx, dy) in ring_offsets(ring) {
            if iterations >= budget.max_iterations {
                break 'rings;
            }
            iterations += 1;
            let candidate = Position::new(
                desired.x + f64::from(dx) * step,
                desired.y + f64::from(dy) * step,
            );
            if !fits(candidate) || !free(candidate) {
                continue;
            }
            let d2 = squared_distance(desired, candidate);
            if is_better(d2, candidate, best.map(|(d, p, _)| (d, p))) {
                best = Some((d2, candidate, ring));
            }
        }
        ring = ring.saturating_add(1);
    }

    if let Some((_, position, ring)) = best {
        trace!(ring, iterations, "overlap resolved by ring search");
        return Placement {
            position,
            strategy: PlacementStrategy::RingSearch { ring },
            iterations,
        };
    }

    fallback_placement(desired, size, obstacles, gap, budget, container, iterations)
}

/// Diagonal stacking from `desired`, then the below-all position.
///
/// Shared by every placement search once its scan is exhausted. The result
/// never collides with `obstacles`.
pub(crate) fn fallback_placement(
    desired: Position,
    size: Size,
    obstacles: &[Bounds],
    gap: f64,
    budget: &SearchBudget,
    container: Option<&Bounds>,
    mut iterations: usize,
) -> Placement {
    let fits = |pos: Position| {
        container.is_none_or(|area| area.contains(&Bounds::from_parts(pos, size)))
    };
    let offset = budget.stack_offset();
    for attempt in 1..=MAX_STACK_ATTEMPTS {
        iterations += 1;
        let k = attempt as f64 * offset;
        let candidate = Position::new(desired.x + k, desired.y + k);
        if fits(candidate) && is_valid_position(candidate, size, obstacles, gap) {
            debug!(attempt, iterations, "placement resolved by stacking");
            return Placement {
                position: candidate,
                strategy: PlacementStrategy::Stacked {
                    attempt: attempt as u32,
                },
                iterations,
            };
        }
    }

    let floor = obstacles
        .iter()
        .map(Bounds::bottom)
        .filter(|bottom| bottom.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let x = container.map_or(desired.x, |area| desired.x.max(area.x));
    let y = if floor.is_finite() {
        floor + gap.max(0.0)
    } else {
        desired.y
    };
    warn!(iterations, y, "placement search exhausted; placing below all panels");
    Placement {
        position: Position::new(x, y),
        strategy: PlacementStrategy::BelowAll,
        iterations,
    }
}

/// Offsets with Chebyshev distance `ring`, row-major.
fn ring_offsets(ring: u32) -> impl Iterator<Item = (i32, i32)> {
    let r = i32::try_from(ring).unwrap_or(i32::MAX);
    (-r..=r).flat_map(move |dy| {
        let edge_row = dy.abs() == r;
        (-r..=r)
            .filter(move |dx| edge_row || dx.abs() == r)
            .map(move |dx| (dx, dy))
    })
}

fn squared_distance(a: Position, b: Position) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Displacement, then top-most, then left-most.
fn is_better(d2: f64, candidate: Position, best: Option<(f64, Position)>) -> bool {
    let Some((best_d2, best_pos)) = best else {
        return true;
    };
    let tolerance = DISPLACEMENT_EPSILON * best_d2.max(1.0);
    if d2 < best_d2 - tolerance {
        return true;
    }
    if d2 > best_d2 + tolerance {
        return false;
    }
    (candidate.y, candidate.x) < (best_pos.y, best_pos.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> PanelId {
        PanelId::new(raw).expect("test ID must be non-zero")
    }

    #[test]
    fn overlapping_boxes_collide() {
        let a = Bounds::new(100.0, 100.0, 200.0, 150.0);
        let b = Bounds::new(150.0, 125.0, 200.0, 150.0);
        assert!(check_collision(&a, &b, 0.0));
        assert!(check_collision(&b, &a, 0.0));
    }

    #[test]
    fn touching_boxes_do_not_collide_without_gap() {
        let a = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let b = Bounds::new(100.0, 0.0, 100.0, 100.0);
        assert!(!check_collision(&a, &b, 0.0));
        assert!(check_collision(&a, &b, 1.0));
    }

    #[test]
    fn exact_gap_is_allowed() {
        let a = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let b = Bounds::new(110.0, 0.0, 100.0, 100.0);
        assert!(!check_collision(&a, &b, 10.0));
        assert!(check_collision(&a, &b, 10.5));
    }

    #[test]
    fn find_collisions_reports_colliding_panels() {
        let subject = Bounds::new(150.0, 125.0, 200.0, 150.0);
        let hit = find_collisions(
            [(id(1), Bounds::new(100.0, 100.0, 200.0, 150.0))],
            &subject,
            0.0,
        );
        assert!(hit.colliding);
        assert_eq!(hit.panels, vec![id(1)]);

        let miss = find_collisions(
            [(id(2), Bounds::new(400.0, 400.0, 200.0, 150.0))],
            &subject,
            0.0,
        );
        assert!(!miss.colliding);
        assert!(miss.panels.is_empty());
    }

    #[test]
    fn indexed_lookup_skips_requested_ids() {
        let mut index = SpatialIndex::new(20.0);
        index.add(id(1), Bounds::new(0.0, 0.0, 100.0, 100.0));
        index.add(id(2), Bounds::new(50.0, 50.0, 100.0, 100.0));
        let subject = Bounds::new(60.0, 60.0, 10.0, 10.0);
        let all = find_collisions_indexed(&index, &subject, 0.0, |_| false);
        assert_eq!(all.panels, vec![id(1), id(2)]);
        let skipped = find_collisions_indexed(&index, &subject, 0.0, |panel| panel == id(1));
        assert_eq!(skipped.panels, vec![id(2)]);
    }

    #[test]
    fn valid_position_is_pure() {
        let obstacles = [Bounds::new(0.0, 0.0, 100.0, 100.0)];
        let size = Size::new(50.0, 50.0);
        assert!(!is_valid_position(Position::new(50.0, 50.0), size, &obstacles, 0.0));
        assert!(is_valid_position(Position::new(100.0, 0.0), size, &obstacles, 0.0));
        assert_eq!(obstacles[0], Bounds::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn free_desired_position_is_kept() {
        let placement = prevent_overlap(
            Position::new(300.0, 300.0),
            Size::new(50.0, 50.0),
            &[Bounds::new(0.0, 0.0, 100.0, 100.0)],
            0.0,
            &SearchBudget::default(),
            None,
        );
        assert_eq!(placement.position, Position::new(300.0, 300.0));
        assert_eq!(placement.strategy, PlacementStrategy::Desired);
    }

    #[test]
    fn ring_search_prefers_smallest_displacement() {
        // Obstacle covers x in [0, 100); desired box at x=80 overlaps by 20+.
        let obstacles = [Bounds::new(0.0, 0.0, 100.0, 100.0)];
        let placement = prevent_overlap(
            Position::new(80.0, 0.0),
            Size::new(40.0, 40.0),
            &obstacles,
            0.0,
            &SearchBudget::default(),
            None,
        );
        // One step right (x=100) is the closest free cell.
        assert_eq!(placement.position, Position::new(100.0, 0.0));
        assert_eq!(placement.strategy, PlacementStrategy::RingSearch { ring: 1 });
    }

    #[test]
    fn ties_break_top_left() {
        // Symmetric obstacle: moving up or left by one step are equally far.
        let obstacles = [Bounds::new(10.0, 10.0, 20.0, 20.0)];
        let placement = prevent_overlap(
            Position::new(20.0, 20.0),
            Size::new(10.0, 10.0),
            &obstacles,
            0.0,
            &SearchBudget {
                step: 20.0,
                ..SearchBudget::default()
            },
            None,
        );
        // Candidates at distance 20: (20,0) up, (0,20) left, (40,20) right, (20,40) down.
        // Top-most wins: (20, 0).
        assert_eq!(placement.position, Position::new(20.0, 0.0));
    }

    #[test]
    fn container_restricts_candidates() {
        let container = Bounds::new(0.0, 0.0, 200.0, 100.0);
        let obstacles = [Bounds::new(0.0, 0.0, 100.0, 100.0)];
        let placement = prevent_overlap(
            Position::new(0.0, 0.0),
            Size::new(100.0, 100.0),
            &obstacles,
            0.0,
            &SearchBudget::default(),
            Some(&container),
        );
        assert_eq!(placement.position, Position::new(100.0, 0.0));
        assert!(container.contains(&Bounds::from_parts(
            placement.position,
            Size::new(100.0, 100.0)
        )));
    }

    #[test]
    fn exhausted_budget_falls_back_and_is_collision_free() {
        let obstacles: Vec<Bounds> = (0..5)
            .map(|i| Bounds::new(0.0, f64::from(i) * 100.0, 1_000.0, 100.0))
            .collect();
        let size = Size::new(50.0, 50.0);
        let placement = prevent_overlap(
            Position::new(10.0, 10.0),
            size,
            &obstacles,
            0.0,
            &SearchBudget {
                step: 20.0,
                max_iterations: 4,
                stack_offset: 20.0,
            },
            None,
        );
        assert!(matches!(
            placement.strategy,
            PlacementStrategy::Stacked { .. } | PlacementStrategy::BelowAll
        ));
        assert!(is_valid_position(placement.position, size, &obstacles, 0.0));
    }

    #[test]
    fn below_all_respects_gap() {
        let obstacles = [Bounds::new(0.0, 0.0, 100.0, 100.0)];
        let container = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let size = Size::new(100.0, 100.0);
        let placement = prevent_overlap(
            Position::new(0.0, 0.0),
            size,
            &obstacles,
            8.0,
            &SearchBudget::default(),
            Some(&container),
        );
        assert_eq!(placement.strategy, PlacementStrategy::BelowAll);
        assert_eq!(placement.position, Position::new(0.0, 108.0));
        assert!(is_valid_position(placement.position, size, &obstacles, 8.0));
    }

    #[test]
    fn ring_offsets_cover_perimeter_only() {
        let ring1: Vec<_> = ring_offsets(1).collect();
        assert_eq!(ring1.len(), 8);
        assert_eq!(ring1[0], (-1, -1));
        assert!(!ring1.contains(&(0, 0)));
        assert_eq!(ring_offsets(3).count(), 24);
    }
}
