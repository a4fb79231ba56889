//! Hard errors raised by the layout engine.
//!
//! Soft conditions seen during a live preview (collisions, size limits,
//! container overflow) are not errors; they travel as violation and warning
//! lists on the preview itself. The types here cover misuse of the store and
//! the session controllers, and commit-time validation failures.

use thiserror::Error;

use crate::panel::PanelId;

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Which kind of interactive session holds a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Drag,
    Resize,
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drag => f.write_str("drag"),
            Self::Resize => f.write_str("resize"),
        }
    }
}

/// Size axis named in constraint diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Width,
    Height,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Width => f.write_str("width"),
            Self::Height => f.write_str("height"),
        }
    }
}

/// Why the store refused to commit new geometry for a panel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitRejection {
    #[error("geometry is not finite")]
    NonFinite,

    #[error("{axis} {actual} is below the minimum {min}")]
    BelowMinimum { axis: Axis, actual: f64, min: f64 },

    #[error("{axis} {actual} exceeds the maximum {max}")]
    AboveMaximum { axis: Axis, actual: f64, max: f64 },

    #[error("width and height must be positive")]
    EmptySize,

    #[error("box leaves the container")]
    OutOfBounds,

    #[error("box overlaps panel {other}")]
    Overlap { other: PanelId },
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {field} value {value} (must be a finite number > 0)")]
    NonPositive { field: &'static str, value: f64 },

    #[error("invalid {field} value {value} (must be a finite number >= 0)")]
    Negative { field: &'static str, value: f64 },

    #[error("invalid {field} value 0 (must be at least 1)")]
    ZeroCount { field: &'static str },
}

/// Errors from store and session operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("panel id must be non-zero")]
    ZeroPanelId,

    #[error("panel id allocator overflowed after {current}")]
    PanelIdOverflow { current: PanelId },

    #[error("unknown panel {id}")]
    UnknownPanel { id: PanelId },

    #[error("panel {id} already exists")]
    DuplicatePanel { id: PanelId },

    #[error("invalid constraints on panel {id}: {axis} max {max} is below min {min}")]
    InvalidConstraint {
        id: PanelId,
        axis: Axis,
        min: f64,
        max: f64,
    },

    #[error("invalid minimum size {width}x{height} on panel {id} (must be finite and >= 0)")]
    InvalidMinSize { id: PanelId, width: f64, height: f64 },

    #[error("invalid aspect ratio {ratio} on panel {id}")]
    InvalidAspectRatio { id: PanelId, ratio: f64 },

    #[error("commit rejected for panel {id}: {reason}")]
    CommitRejected { id: PanelId, reason: CommitRejection },

    #[error("panel {id} is already in a {kind} session")]
    SessionActive { id: PanelId, kind: InteractionKind },

    #[error("no active {kind} session")]
    NoActiveSession { kind: InteractionKind },

    #[error("panel {id} is hidden and cannot be moved interactively")]
    PanelHidden { id: PanelId },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> PanelId {
        PanelId::new(raw).expect("test ID must be non-zero")
    }

    #[test]
    fn commit_rejection_display_names_axis() {
        let err = LayoutError::CommitRejected {
            id: id(3),
            reason: CommitRejection::BelowMinimum {
                axis: Axis::Width,
                actual: 50.0,
                min: 100.0,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("panel 3"));
        assert!(msg.contains("width 50 is below the minimum 100"));
    }

    #[test]
    fn config_error_converts() {
        let err: LayoutError = ConfigError::ZeroCount {
            field: "history_depth",
        }
        .into();
        assert!(matches!(err, LayoutError::Config(_)));
        assert!(err.to_string().contains("history_depth"));
    }

    #[test]
    fn session_error_display() {
        let err = LayoutError::SessionActive {
            id: id(7),
            kind: InteractionKind::Resize,
        };
        assert_eq!(err.to_string(), "panel 7 is already in a resize session");
    }
}
