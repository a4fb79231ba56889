#![forbid(unsafe_code)]

//! Panel layout engine.
//!
//! # Role in dgrid
//! `dgrid-layout` owns the committed geometry of a workspace's panels and the
//! interactive sessions that change it. Hosts feed pointer and keyboard input
//! in (with explicit timestamps) and render from [`LayoutStore`] state and the
//! controllers' previews.
//!
//! # Primary responsibilities
//! - **Store**: the only writer of committed panel geometry; every commit is
//!   checked against size limits, the container and the other visible panels.
//! - **Spatial index and collisions**: bucketed broad phase plus exact AABB
//!   tests, and nearest-free-spot search for placement.
//! - **Snapping and constraints**: magnetic grid and edge snapping with
//!   hysteresis; min/max/aspect/common-size enforcement for resizes.
//! - **Sessions**: drag (single and group), resize from eight handles and
//!   keyboard nudges, each committed in one batch with bounded undo history.
//! - **Whole-layout tools**: validation, overlap repair and compaction,
//!   versioned JSON snapshots.
//!
//! # How it fits in the system
//! A [`Workspace`] bundles one store, one history and one controller of each
//! kind. Everything is single-threaded; nothing is global.

pub mod collision;
pub mod config;
pub mod drag;
pub mod error;
pub mod grid;
pub mod history;
pub mod optimizer;
pub mod panel;
pub mod resize;
pub mod resolver;
pub mod snapshot;
pub mod spatial;
pub mod store;
pub mod workspace;

pub use collision::{
    CollisionResult, Placement, PlacementStrategy, SearchBudget, check_collision,
    find_collisions, prevent_overlap,
};
pub use config::{GroupDragPolicy, LayoutConfig};
pub use drag::{DragController, DragOutcome, DragPreview, DragState, project_drag_ghost};
pub use error::{Axis, CommitRejection, ConfigError, InteractionKind, LayoutError, Result};
pub use grid::{SnapDecision, SnapReason, SnapTuning, snap_to_grid};
pub use history::{History, HistoryEntry, OperationKind};
pub use optimizer::{
    LayoutIssue, LayoutIssueCode, OptimizeOptions, OptimizeReport, ValidationReport,
    optimize_layout, validate_layout,
};
pub use panel::{
    AspectRatioConstraint, Panel, PanelConstraints, PanelId, PanelSpec, SnapConstraints,
};
pub use resize::{ResizeController, ResizeHandle, ResizeOutcome, ResizePreview, ResizeState};
pub use resolver::{Adjustment, AvailableSpace, ConstrainedSize, enforce_constraints};
pub use snapshot::{LayoutSnapshot, SNAPSHOT_VERSION, SnapshotError, export_layout, import_layout};
pub use spatial::SpatialIndex;
pub use store::LayoutStore;
pub use workspace::Workspace;
