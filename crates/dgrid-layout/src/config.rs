//! Caller-supplied tuning for a workspace.
//!
//! All values have defaults matching common dashboard behavior. A config can
//! be built in code with the `with_*` helpers or deserialized from JSON; in
//! both cases call [`LayoutConfig::validate`] (or construct via
//! [`LayoutConfig::new`]) before use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grid::SnapTuning;

/// Default grid pitch in workspace units.
pub const DEFAULT_GRID_SIZE: f64 = 20.0;

/// Default magnetic snap distance.
pub const DEFAULT_SNAP_DISTANCE: f64 = 15.0;

/// Default stickiness window that keeps a drag on its previous snap point.
pub const DEFAULT_SNAP_HYSTERESIS: f64 = 4.0;

/// Default minimum gap between committed panels.
pub const DEFAULT_MIN_GAP: f64 = 0.0;

/// Default number of retained history entries.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Default preview throttle interval in milliseconds.
pub const DEFAULT_COMMIT_THROTTLE_MS: u64 = 16;

/// Default upper bound on candidate positions examined by one placement search.
pub const DEFAULT_MAX_SEARCH_ITERATIONS: usize = 4_096;

/// Default upper bound on full passes of the overlap optimizer.
pub const DEFAULT_OPTIMIZE_MAX_ITERATIONS: usize = 16;

/// What a multi-panel drag does with a companion whose candidate collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDragPolicy {
    /// Hold the colliding companion at its last valid position for this
    /// frame and keep moving the rest of the group.
    #[default]
    SkipColliding,
    /// Reject the whole frame for every member.
    AbortGroup,
}

/// Workspace tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub grid_size: f64,
    pub snap_distance: f64,
    pub snap_hysteresis: f64,
    /// Snap dragged panels to the grid.
    pub snap_to_grid: bool,
    /// Snap dragged panels to neighbouring panel edges.
    pub snap_to_edges: bool,
    pub min_gap: f64,
    pub history_depth: usize,
    pub commit_throttle_ms: u64,
    /// Spatial index bucket size; `None` uses `grid_size`.
    pub bucket_size: Option<f64>,
    pub max_search_iterations: usize,
    /// Diagonal offset used when the placement search falls back to stacking.
    /// `None` uses `grid_size`.
    pub stack_offset: Option<f64>,
    pub optimize_max_iterations: usize,
    pub group_drag_policy: GroupDragPolicy,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            snap_distance: DEFAULT_SNAP_DISTANCE,
            snap_hysteresis: DEFAULT_SNAP_HYSTERESIS,
            snap_to_grid: true,
            snap_to_edges: false,
            min_gap: DEFAULT_MIN_GAP,
            history_depth: DEFAULT_HISTORY_DEPTH,
            commit_throttle_ms: DEFAULT_COMMIT_THROTTLE_MS,
            bucket_size: None,
            max_search_iterations: DEFAULT_MAX_SEARCH_ITERATIONS,
            stack_offset: None,
            optimize_max_iterations: DEFAULT_OPTIMIZE_MAX_ITERATIONS,
            group_drag_policy: GroupDragPolicy::default(),
        }
    }
}

impl LayoutConfig {
    /// Validated config with the given grid and snap distance; other fields
    /// take their defaults.
    pub fn new(grid_size: f64, snap_distance: f64) -> Result<Self, ConfigError> {
        let config = Self {
            grid_size,
            snap_distance,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("grid_size", self.grid_size)?;
        non_negative("snap_distance", self.snap_distance)?;
        non_negative("snap_hysteresis", self.snap_hysteresis)?;
        non_negative("min_gap", self.min_gap)?;
        if let Some(bucket) = self.bucket_size {
            positive("bucket_size", bucket)?;
        }
        if let Some(offset) = self.stack_offset {
            positive("stack_offset", offset)?;
        }
        nonzero("history_depth", self.history_depth)?;
        nonzero("max_search_iterations", self.max_search_iterations)?;
        nonzero("optimize_max_iterations", self.optimize_max_iterations)?;
        Ok(())
    }

    #[must_use]
    pub fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.grid_size = grid_size;
        self
    }

    #[must_use]
    pub fn with_snap_distance(mut self, snap_distance: f64) -> Self {
        self.snap_distance = snap_distance;
        self
    }

    #[must_use]
    pub fn with_snapping(mut self, grid: bool, edges: bool) -> Self {
        self.snap_to_grid = grid;
        self.snap_to_edges = edges;
        self
    }

    #[must_use]
    pub fn with_min_gap(mut self, min_gap: f64) -> Self {
        self.min_gap = min_gap;
        self
    }

    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    #[must_use]
    pub fn with_commit_throttle(mut self, interval: Duration) -> Self {
        self.commit_throttle_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_group_drag_policy(mut self, policy: GroupDragPolicy) -> Self {
        self.group_drag_policy = policy;
        self
    }

    /// Effective spatial index bucket size.
    #[must_use]
    pub fn bucket_size(&self) -> f64 {
        self.bucket_size.unwrap_or(self.grid_size)
    }

    /// Effective stacking offset for search fallbacks.
    #[must_use]
    pub fn stack_offset(&self) -> f64 {
        self.stack_offset.unwrap_or(self.grid_size)
    }

    #[must_use]
    pub fn commit_throttle(&self) -> Duration {
        Duration::from_millis(self.commit_throttle_ms)
    }

    /// Magnetic snap tuning derived from this config.
    #[must_use]
    pub fn snap_tuning(&self) -> SnapTuning {
        SnapTuning {
            grid_size: self.grid_size,
            snap_distance: self.snap_distance,
            hysteresis: self.snap_hysteresis,
        }
    }

    /// Search budget for placement searches.
    #[must_use]
    pub fn search(&self) -> crate::collision::SearchBudget {
        crate::collision::SearchBudget {
            step: self.grid_size,
            max_iterations: self.max_search_iterations,
            stack_offset: self.stack_offset(),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroCount { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LayoutConfig::default();
        assert_eq!(config.grid_size, 20.0);
        assert_eq!(config.snap_distance, 15.0);
        assert_eq!(config.min_gap, 0.0);
        assert_eq!(config.history_depth, 50);
        assert_eq!(config.commit_throttle(), Duration::from_millis(16));
        assert_eq!(config.bucket_size(), 20.0);
        assert_eq!(config.group_drag_policy, GroupDragPolicy::SkipColliding);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_grid_is_rejected() {
        let err = LayoutConfig::new(0.0, 15.0).expect_err("zero grid");
        assert_eq!(
            err,
            ConfigError::NonPositive {
                field: "grid_size",
                value: 0.0
            }
        );
    }

    #[test]
    fn nan_gap_is_rejected() {
        let config = LayoutConfig::default().with_min_gap(f64::NAN);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Negative {
                field: "min_gap",
                ..
            })
        ));
    }

    #[test]
    fn zero_history_is_rejected() {
        let config = LayoutConfig::default().with_history_depth(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCount {
                field: "history_depth"
            })
        );
    }

    #[test]
    fn bucket_size_override() {
        let config = LayoutConfig {
            bucket_size: Some(64.0),
            ..LayoutConfig::default()
        };
        assert_eq!(config.bucket_size(), 64.0);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: LayoutConfig =
            serde_json::from_str(r#"{"grid_size": 10, "group_drag_policy": "abort_group"}"#)
                .expect("config json");
        assert_eq!(config.grid_size, 10.0);
        assert_eq!(config.snap_distance, DEFAULT_SNAP_DISTANCE);
        assert_eq!(config.group_drag_policy, GroupDragPolicy::AbortGroup);
    }
}
