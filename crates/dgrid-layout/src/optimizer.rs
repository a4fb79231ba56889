//! Whole-layout validation and repair.
//!
//! [`validate_layout`] reports every structural problem in a set of panels
//! without changing anything. [`optimize_layout`] produces a repaired copy:
//! sizes clamped to constraints, boxes pulled into the container, overlaps
//! separated and (optionally) the layout compacted toward the origin. Every
//! pass is bounded by [`OptimizeOptions::max_iterations`] or by the panel
//! count, so the optimizer always terminates.

use dgrid_core::geometry::{Bounds, Position};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

use crate::collision::{SearchBudget, check_collision, find_collisions_indexed, prevent_overlap};
use crate::config::LayoutConfig;
use crate::error::Axis;
use crate::grid::{GRID_EPSILON, snap_to_grid};
use crate::panel::{Panel, PanelId};
use crate::resolver::constrain_position;
use crate::spatial::SpatialIndex;

/// How bad a layout issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Stable machine-readable issue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutIssueCode {
    NonFiniteGeometry,
    EmptySize,
    DuplicatePanelId,
    InvalidConstraint,
    BelowMinimum,
    AboveMaximum,
    OutOfBounds,
    Overlap,
}

/// One problem found by [`validate_layout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutIssue {
    pub code: LayoutIssueCode,
    pub severity: IssueSeverity,
    /// Whether [`optimize_layout`] can fix it.
    pub repairable: bool,
    pub panel: PanelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_panel: Option<PanelId>,
    pub message: String,
}

impl LayoutIssue {
    fn error(code: LayoutIssueCode, panel: PanelId, message: String) -> Self {
        Self {
            code,
            severity: IssueSeverity::Error,
            repairable: matches!(
                code,
                LayoutIssueCode::BelowMinimum
                    | LayoutIssueCode::AboveMaximum
                    | LayoutIssueCode::OutOfBounds
                    | LayoutIssueCode::Overlap
            ),
            panel,
            related_panel: None,
            message,
        }
    }

    fn warning(mut self) -> Self {
        self.severity = IssueSeverity::Warning;
        self
    }

    fn related(mut self, other: PanelId) -> Self {
        self.related_panel = Some(other);
        self
    }
}

/// Result of [`validate_layout`].
///
/// `valid` is false exactly when `errors` holds an issue of
/// [`IssueSeverity::Error`]; warnings alone leave the layout valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<LayoutIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<LayoutIssue>) -> Self {
        let valid = !errors
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Error);
        Self { valid, errors }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.valid
    }

    /// Issues carrying `code`.
    pub fn with_code(&self, code: LayoutIssueCode) -> impl Iterator<Item = &LayoutIssue> {
        self.errors.iter().filter(move |issue| issue.code == code)
    }
}

/// Check a set of panels against their constraints, the container and each
/// other.
///
/// Hidden panels are checked for shape only; a hidden panel outside the
/// container is a warning. Overlaps between visible panels are reported once
/// per pair, lower id first.
#[must_use]
pub fn validate_layout(panels: &[Panel], container: &Bounds, gap: f64) -> ValidationReport {
    let mut issues = Vec::new();
    let mut seen: FxHashSet<PanelId> = FxHashSet::default();
    let mut index = SpatialIndex::default();

    let mut ordered: Vec<&Panel> = panels.iter().collect();
    ordered.sort_by_key(|panel| panel.id);

    for panel in ordered {
        let id = panel.id;
        if !seen.insert(id) {
            issues.push(LayoutIssue::error(
                LayoutIssueCode::DuplicatePanelId,
                id,
                format!("panel id {id} appears more than once"),
            ));
            continue;
        }
        let bounds = panel.bounds();
        if !bounds.is_finite() {
            issues.push(LayoutIssue::error(
                LayoutIssueCode::NonFiniteGeometry,
                id,
                format!("panel {id} has non-finite geometry"),
            ));
            continue;
        }
        if bounds.is_empty() {
            issues.push(LayoutIssue::error(
                LayoutIssueCode::EmptySize,
                id,
                format!("panel {id} has a non-positive size"),
            ));
            continue;
        }
        if let Err(err) = panel.constraints.validate(id) {
            issues.push(LayoutIssue::error(
                LayoutIssueCode::InvalidConstraint,
                id,
                err.to_string(),
            ));
        } else {
            for (axis, actual) in [(Axis::Width, bounds.width), (Axis::Height, bounds.height)] {
                let (min, max) = panel.constraints.axis_bounds(axis);
                if actual < min {
                    issues.push(LayoutIssue::error(
                        LayoutIssueCode::BelowMinimum,
                        id,
                        format!("panel {id} {axis} {actual} is below the minimum {min}"),
                    ));
                }
                if let Some(max) = max
                    && actual > max
                {
                    issues.push(LayoutIssue::error(
                        LayoutIssueCode::AboveMaximum,
                        id,
                        format!("panel {id} {axis} {actual} exceeds the maximum {max}"),
                    ));
                }
            }
        }
        if !container.contains(&bounds) {
            let issue = LayoutIssue::error(
                LayoutIssueCode::OutOfBounds,
                id,
                format!("panel {id} leaves the container"),
            );
            issues.push(if panel.visible { issue } else { issue.warning() });
        }
        if !panel.visible {
            continue;
        }
        let hits = find_collisions_indexed(&index, &bounds, gap, |_| false);
        for other in hits.panels {
            issues.push(
                LayoutIssue::error(
                    LayoutIssueCode::Overlap,
                    other,
                    format!("panels {other} and {id} overlap"),
                )
                .related(id),
            );
        }
        index.add(id, bounds);
    }

    let report = ValidationReport::from_issues(issues);
    if !report.valid {
        debug!(issues = report.errors.len(), "layout validation found errors");
    }
    report
}

/// Tuning for [`optimize_layout`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    pub grid_size: f64,
    pub minimize_overlaps: bool,
    pub compact_layout: bool,
    pub gap: f64,
    /// Upper bound on overlap-separation passes.
    pub max_iterations: usize,
    /// Budget for each per-panel placement search.
    #[serde(skip)]
    pub search: SearchBudget,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

impl OptimizeOptions {
    /// Options matching a workspace config: overlaps separated, no
    /// compaction.
    #[must_use]
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            grid_size: config.grid_size,
            minimize_overlaps: true,
            compact_layout: false,
            gap: config.min_gap,
            max_iterations: config.optimize_max_iterations,
            search: config.search(),
        }
    }

    #[must_use]
    pub fn compact(mut self, compact: bool) -> Self {
        self.compact_layout = compact;
        self
    }
}

/// Result of [`optimize_layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeReport {
    /// Repaired panels, in the input order.
    pub panels: Vec<Panel>,
    /// Overlap-separation passes run.
    pub passes: usize,
    /// Whether the last pass found no overlap.
    pub converged: bool,
    /// Panels whose bounds changed, ascending.
    pub moved: Vec<PanelId>,
}

/// Produce a repaired copy of `panels`.
///
/// 1. Sizes are clamped to each panel's min/max and positions pulled into the
///    container.
/// 2. With `compact_layout`, positions snap to the grid.
/// 3. With `minimize_overlaps`, visible panels are visited in id order. A
///    panel that collides with an earlier one moves to the nearest spot clear
///    of every other panel ([`prevent_overlap`] restricted to the container),
///    so older panels keep their place. Passes repeat until
///    one finds nothing to move or `max_iterations` passes have run.
/// 4. With `compact_layout`, panels sorted by `(y, x, id)` slide up, then
///    left, to the smallest free grid-aligned coordinate.
///
/// Hidden panels are only clamped.
#[must_use]
pub fn optimize_layout(
    panels: &[Panel],
    container: &Bounds,
    options: &OptimizeOptions,
) -> OptimizeReport {
    let span = debug_span!(
        "layout.optimize",
        panels = panels.len(),
        passes = tracing::field::Empty
    );
    let _guard = span.enter();

    let grid = if options.grid_size.is_finite() && options.grid_size > 0.0 {
        Some(options.grid_size)
    } else {
        None
    };
    let gap = options.gap.max(0.0);
    let mut out: Vec<Panel> = panels.to_vec();

    for panel in &mut out {
        sanitize(panel, container);
        if options.compact_layout
            && let Some(grid) = grid
        {
            let snapped = snap_to_grid(panel.position, grid);
            panel.position = constrain_position(snapped, panel.size, container);
        }
    }

    let mut order: Vec<usize> = (0..out.len()).filter(|&i| out[i].visible).collect();
    order.sort_by_key(|&i| out[i].id);

    let mut passes = 0;
    let mut converged = !options.minimize_overlaps || !has_overlap(&out, &order, gap);
    if options.minimize_overlaps {
        while !converged && passes < options.max_iterations.max(1) {
            passes += 1;
            let mut moved_any = false;
            for (k, &i) in order.iter().enumerate() {
                let bounds = out[i].bounds();
                let blocked = order[..k]
                    .iter()
                    .any(|&j| check_collision(&bounds, &out[j].bounds(), gap));
                if !blocked {
                    continue;
                }
                let obstacles: Vec<Bounds> = order
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| out[j].bounds())
                    .collect();
                let placement = prevent_overlap(
                    bounds.position(),
                    bounds.size(),
                    &obstacles,
                    gap,
                    &options.search,
                    Some(container),
                );
                out[i].position = placement.position;
                moved_any = true;
            }
            converged = !moved_any || !has_overlap(&out, &order, gap);
        }
        if !converged {
            warn!(passes, "overlap optimization hit its pass limit");
        }
    }

    if options.compact_layout {
        compact(&mut out, &order, container, gap, grid);
    }

    span.record("passes", passes);
    let mut moved: Vec<PanelId> = panels
        .iter()
        .zip(&out)
        .filter(|(before, after)| before.bounds() != after.bounds())
        .map(|(panel, _)| panel.id)
        .collect();
    moved.sort_unstable();
    moved.dedup();
    debug!(passes, converged, moved = moved.len(), "layout optimized");
    OptimizeReport {
        panels: out,
        passes,
        converged,
        moved,
    }
}

fn sanitize(panel: &mut Panel, container: &Bounds) {
    let mut size = panel.size;
    if !size.is_finite() {
        size = panel.constraints.min_size;
    }
    let min = panel.constraints.min_size;
    size = size.max(min);
    if let Some(max) = panel.constraints.max_size
        && max.width >= min.width
        && max.height >= min.height
    {
        size = size.min(max);
    }
    let position = if panel.position.is_finite() {
        panel.position
    } else {
        container.position()
    };
    panel.size = size;
    panel.position = constrain_position(position, size, container);
}

fn has_overlap(panels: &[Panel], order: &[usize], gap: f64) -> bool {
    order.iter().enumerate().any(|(k, &i)| {
        order[k + 1..]
            .iter()
            .any(|&j| check_collision(&panels[i].bounds(), &panels[j].bounds(), gap))
    })
}

fn compact(
    panels: &mut [Panel],
    order: &[usize],
    container: &Bounds,
    gap: f64,
    grid: Option<f64>,
) {
    let mut sweep: Vec<usize> = order.to_vec();
    sweep.sort_by(|&a, &b| {
        let (pa, pb) = (panels[a].position, panels[b].position);
        pa.y.total_cmp(&pb.y)
            .then(pa.x.total_cmp(&pb.x))
            .then(panels[a].id.cmp(&panels[b].id))
    });

    for &i in &sweep {
        let size = panels[i].size;
        let others: Vec<Bounds> = order
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| panels[j].bounds())
            .collect();
        let fits = |pos: Position| {
            let candidate = Bounds::from_parts(pos, size);
            container.contains(&candidate)
                && !others.iter().any(|other| check_collision(&candidate, other, gap))
        };

        let current = panels[i].position;
        let y = slide(
            current.y,
            container.y,
            others.iter().map(|other| other.bottom() + gap),
            grid,
            |y| fits(Position::new(current.x, y)),
        );
        let x = slide(
            current.x,
            container.x,
            others.iter().map(|other| other.right() + gap),
            grid,
            |x| fits(Position::new(x, y)),
        );
        panels[i].position = Position::new(x, y);
    }
}

/// Smallest coordinate at most `current` drawn from the container edge and
/// the far edges of other panels that `accept` allows.
fn slide(
    current: f64,
    origin: f64,
    edges: impl Iterator<Item = f64>,
    grid: Option<f64>,
    accept: impl Fn(f64) -> bool,
) -> f64 {
    let mut candidates: Vec<f64> = std::iter::once(origin)
        .chain(edges.map(|edge| match grid {
            Some(grid) => ceil_to_grid(edge, grid),
            None => edge,
        }))
        .filter(|&value| value.is_finite() && value < current)
        .collect();
    candidates.sort_by(f64::total_cmp);
    candidates
        .into_iter()
        .find(|&value| accept(value))
        .unwrap_or(current)
}

fn ceil_to_grid(value: f64, grid: f64) -> f64 {
    let steps = value / grid;
    let nearest = steps.round();
    if (steps - nearest).abs() < GRID_EPSILON {
        nearest * grid
    } else {
        steps.ceil() * grid
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Subscriber;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use dgrid_core::geometry::Size;

    use super::*;
    use crate::panel::PanelConstraints;

    fn id(raw: u64) -> PanelId {
        PanelId::new(raw).expect("test ID must be non-zero")
    }

    fn panel(raw: u64, x: f64, y: f64, w: f64, h: f64) -> Panel {
        Panel::new(id(raw), "widget", Bounds::new(x, y, w, h))
    }

    fn container() -> Bounds {
        Bounds::new(0.0, 0.0, 1200.0, 800.0)
    }

    #[test]
    fn clean_layout_is_valid() {
        let panels = vec![panel(1, 0.0, 0.0, 200.0, 200.0), panel(2, 200.0, 0.0, 200.0, 200.0)];
        let report = validate_layout(&panels, &container(), 0.0);
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn empty_panel_is_an_unrepairable_error() {
        let panels = vec![
            panel(1, 100.0, 100.0, -50.0, -50.0),
            panel(2, 300.0, 0.0, 0.0, 100.0),
        ];
        let report = validate_layout(&panels, &container(), 0.0);
        assert!(!report.valid);
        let empty: Vec<&LayoutIssue> = report.with_code(LayoutIssueCode::EmptySize).collect();
        assert_eq!(empty.len(), 2);
        assert!(empty.iter().all(|issue| !issue.repairable));
    }

    #[test]
    fn overlap_reported_once_per_pair() {
        let panels = vec![
            panel(2, 150.0, 125.0, 200.0, 150.0),
            panel(1, 100.0, 100.0, 200.0, 150.0),
        ];
        let report = validate_layout(&panels, &container(), 0.0);
        assert!(!report.valid);
        let overlaps: Vec<&LayoutIssue> = report.with_code(LayoutIssueCode::Overlap).collect();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].panel, id(1));
        assert_eq!(overlaps[0].related_panel, Some(id(2)));
        assert!(overlaps[0].repairable);
    }

    #[test]
    fn gap_turns_touching_panels_into_overlap() {
        let panels = vec![panel(1, 0.0, 0.0, 100.0, 100.0), panel(2, 100.0, 0.0, 100.0, 100.0)];
        assert!(validate_layout(&panels, &container(), 0.0).valid);
        assert!(!validate_layout(&panels, &container(), 8.0).valid);
    }

    #[test]
    fn size_and_bounds_issues() {
        let small = panel(1, 0.0, 0.0, 50.0, 200.0)
            .with_constraints(PanelConstraints::with_min(Size::new(100.0, 100.0)));
        let outside = panel(2, 1100.0, 0.0, 200.0, 100.0);
        let report = validate_layout(&[small, outside], &container(), 0.0);
        let codes: Vec<LayoutIssueCode> = report.errors.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![LayoutIssueCode::BelowMinimum, LayoutIssueCode::OutOfBounds]
        );
    }

    #[test]
    fn hidden_out_of_bounds_is_a_warning() {
        let hidden = panel(1, 1100.0, 0.0, 200.0, 100.0).hidden();
        let over = panel(2, 1100.0, 0.0, 100.0, 100.0);
        let report = validate_layout(&[hidden, over], &container(), 0.0);
        assert!(report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].severity, IssueSeverity::Warning);
    }

    #[test]
    fn duplicate_and_non_finite_are_not_repairable() {
        let report = validate_layout(
            &[
                panel(1, 0.0, 0.0, 10.0, 10.0),
                panel(1, 500.0, 0.0, 10.0, 10.0),
                panel(2, f64::NAN, 0.0, 10.0, 10.0),
            ],
            &container(),
            0.0,
        );
        assert!(!report.valid);
        assert!(report.errors.iter().all(|issue| !issue.repairable));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn optimize_separates_overlaps() {
        let panels = vec![
            panel(1, 100.0, 100.0, 200.0, 150.0),
            panel(2, 150.0, 125.0, 200.0, 150.0),
            panel(3, 120.0, 110.0, 200.0, 150.0),
        ];
        let report = optimize_layout(&panels, &container(), &OptimizeOptions::default());
        assert!(report.converged);
        assert_eq!(report.passes, 1);
        assert!(validate_layout(&report.panels, &container(), 0.0).valid);
        assert_eq!(report.moved, vec![id(2), id(3)]);
        assert_eq!(report.panels[0].position, Position::new(100.0, 100.0));
    }

    #[test]
    fn optimize_clean_layout_is_a_no_op() {
        let panels = vec![panel(1, 0.0, 0.0, 100.0, 100.0), panel(2, 300.0, 0.0, 100.0, 100.0)];
        let report = optimize_layout(&panels, &container(), &OptimizeOptions::default());
        assert_eq!(report.passes, 0);
        assert!(report.moved.is_empty());
        assert_eq!(report.panels, panels);
    }

    #[test]
    fn optimize_clamps_size_and_container() {
        let panels = vec![
            panel(1, 1150.0, 780.0, 40.0, 100.0)
                .with_constraints(PanelConstraints::with_min(Size::new(100.0, 100.0))),
        ];
        let report = optimize_layout(&panels, &container(), &OptimizeOptions::default());
        assert_eq!(report.panels[0].bounds(), Bounds::new(1100.0, 700.0, 100.0, 100.0));
    }

    #[test]
    fn compaction_moves_toward_origin() {
        let panels = vec![
            panel(1, 400.0, 300.0, 200.0, 100.0),
            panel(2, 420.0, 520.0, 200.0, 100.0),
        ];
        let options = OptimizeOptions::default().compact(true);
        let report = optimize_layout(&panels, &container(), &options);
        assert_eq!(report.panels[0].position, Position::new(0.0, 0.0));
        assert_eq!(report.panels[1].position, Position::new(200.0, 0.0));
        assert!(validate_layout(&report.panels, &container(), 0.0).valid);
    }

    #[test]
    fn compaction_stacks_below_when_row_is_full() {
        let panels = vec![
            panel(1, 0.0, 0.0, 1200.0, 100.0),
            panel(2, 333.0, 517.0, 200.0, 100.0),
        ];
        let options = OptimizeOptions {
            gap: 10.0,
            ..OptimizeOptions::default().compact(true)
        };
        let report = optimize_layout(&panels, &container(), &options);
        assert_eq!(report.panels[1].position, Position::new(0.0, 120.0));
    }

    #[test]
    fn hidden_panels_do_not_block() {
        let panels = vec![
            panel(1, 0.0, 0.0, 200.0, 200.0).hidden(),
            panel(2, 50.0, 50.0, 200.0, 200.0),
        ];
        let report = optimize_layout(&panels, &container(), &OptimizeOptions::default());
        assert!(report.moved.is_empty());
    }

    #[derive(Default)]
    struct OptimizeTraceState {
        saw_span: bool,
        saw_passes: bool,
    }

    struct OptimizeTraceCapture {
        state: Arc<Mutex<OptimizeTraceState>>,
    }

    impl<S> Layer<S> for OptimizeTraceCapture
    where
        S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::Id,
            _ctx: Context<'_, S>,
        ) {
            if attrs.metadata().name() == "layout.optimize" {
                self.state.lock().expect("trace lock").saw_span = true;
            }
        }

        fn on_record(
            &self,
            id: &tracing::Id,
            values: &tracing::span::Record<'_>,
            ctx: Context<'_, S>,
        ) {
            let Some(span) = ctx.span(id) else {
                return;
            };
            if span.metadata().name() != "layout.optimize" {
                return;
            }
            struct V {
                saw: bool,
            }
            impl tracing::field::Visit for V {
                fn record_u64(&mut self, field: &tracing::field::Field, _value: u64) {
                    if field.name() == "passes" {
                        self.saw = true;
                    }
                }

                fn record_debug(
                    &mut self,
                    _field: &tracing::field::Field,
                    _value: &dyn std::fmt::Debug,
                ) {
                }
            }
            let mut v = V { saw: false };
            values.record(&mut v);
            if v.saw {
                self.state.lock().expect("trace lock").saw_passes = true;
            }
        }
    }

    #[test]
    fn optimize_emits_span_with_pass_count() {
        let state = Arc::new(Mutex::new(OptimizeTraceState::default()));
        let subscriber = tracing_subscriber::registry().with(OptimizeTraceCapture {
            state: Arc::clone(&state),
        });
        let _guard = tracing::subscriber::set_default(subscriber);

        let panels = vec![
            panel(1, 100.0, 100.0, 200.0, 150.0),
            panel(2, 150.0, 125.0, 200.0, 150.0),
        ];
        let _ = optimize_layout(&panels, &container(), &OptimizeOptions::default());

        let snapshot = state.lock().expect("trace lock");
        assert!(snapshot.saw_span, "expected layout.optimize span");
        assert!(snapshot.saw_passes, "expected passes record");
    }
}
