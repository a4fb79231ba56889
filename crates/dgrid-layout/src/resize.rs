//! Resize sessions.
//!
//! ```text
//! Idle -> Resizing -> Idle   (end commits, cancel reverts)
//! ```
//!
//! The preview always renders. Constraint adjustments travel as `warnings`
//! and whatever is still wrong with the final preview box (collisions,
//! container overflow, limit breaches) as `violations`. Only the store can
//! refuse the change, when the session ends.

use std::time::Instant;

use dgrid_core::geometry::{Bounds, Delta, Position, Size};
use dgrid_core::input::Modifiers;
use dgrid_core::throttle::CommitThrottle;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::drag::elapsed_ms;
use crate::error::{Axis, InteractionKind, LayoutError, Result};
use crate::history::{History, HistoryEntry, OperationKind};
use crate::panel::PanelId;
use crate::resolver::{Adjustment, SizeViolation, enforce_constraints, size_violations};
use crate::store::LayoutStore;

/// Edge or corner being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeHandle {
    #[serde(rename = "n")]
    North,
    #[serde(rename = "s")]
    South,
    #[serde(rename = "e")]
    East,
    #[serde(rename = "w")]
    West,
    #[serde(rename = "ne")]
    NorthEast,
    #[serde(rename = "nw")]
    NorthWest,
    #[serde(rename = "se")]
    SouthEast,
    #[serde(rename = "sw")]
    SouthWest,
}

impl ResizeHandle {
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::NorthEast,
        Self::NorthWest,
        Self::SouthEast,
        Self::SouthWest,
    ];

    /// Horizontal edge moved: `-1` west, `1` east, `0` none.
    #[must_use]
    pub const fn horizontal(self) -> i8 {
        match self {
            Self::East | Self::NorthEast | Self::SouthEast => 1,
            Self::West | Self::NorthWest | Self::SouthWest => -1,
            Self::North | Self::South => 0,
        }
    }

    /// Vertical edge moved: `-1` north, `1` south, `0` none.
    #[must_use]
    pub const fn vertical(self) -> i8 {
        match self {
            Self::South | Self::SouthEast | Self::SouthWest => 1,
            Self::North | Self::NorthEast | Self::NorthWest => -1,
            Self::East | Self::West => 0,
        }
    }

    #[must_use]
    pub const fn is_corner(self) -> bool {
        self.horizontal() != 0 && self.vertical() != 0
    }

    /// Requested size for a cumulative pointer delta.
    #[must_use]
    pub fn apply(self, start: Size, delta: Delta) -> Size {
        Size::new(
            start.width + f64::from(self.horizontal()) * delta.dx,
            start.height + f64::from(self.vertical()) * delta.dy,
        )
    }

    /// Box of `size` anchored on the edges this handle does not move.
    #[must_use]
    pub fn anchor(self, start: &Bounds, size: Size) -> Bounds {
        let x = if self.horizontal() < 0 {
            start.right() - size.width
        } else {
            start.x
        };
        let y = if self.vertical() < 0 {
            start.bottom() - size.height
        } else {
            start.y
        };
        Bounds::new(x, y, size.width, size.height)
    }
}

/// Something wrong with the current preview box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ResizeViolation {
    Size(SizeViolation),
    Collision { panels: Vec<PanelId> },
    OutOfBounds,
    /// Width or height reached zero.
    EmptySize,
}

/// Preview handed to the view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizePreview {
    pub panel: PanelId,
    pub bounds: Bounds,
    pub violations: Vec<ResizeViolation>,
    pub warnings: Vec<Adjustment>,
}

impl ResizePreview {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// State of an active resize.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeSession {
    pub panel: PanelId,
    pub handle: ResizeHandle,
    /// Pointer position when the session started.
    pub pointer_origin: Position,
    pub start: Bounds,
    pub cumulative: Delta,
    pub modifiers: Modifiers,
    pub preview: Bounds,
    pub violations: Vec<ResizeViolation>,
    pub warnings: Vec<Adjustment>,
}

impl ResizeSession {
    /// Current pointer position: the origin plus the accumulated deltas.
    #[must_use]
    pub fn pointer(&self) -> Position {
        self.pointer_origin.offset(self.cumulative)
    }

    fn snapshot(&self) -> ResizePreview {
        ResizePreview {
            panel: self.panel,
            bounds: self.preview,
            violations: self.violations.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// How a resize ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeOutcome {
    pub panel: PanelId,
    /// Committed bounds, or the unchanged start bounds.
    pub bounds: Bounds,
    pub rejection: Option<LayoutError>,
}

impl ResizeOutcome {
    #[must_use]
    pub fn committed(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Lifecycle state of a [`ResizeController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResizeState {
    Idle,
    Resizing { panel: PanelId, handle: ResizeHandle },
}

/// Resize state machine for one workspace.
#[derive(Debug, Clone)]
pub struct ResizeController {
    session: Option<ResizeSession>,
    throttle: CommitThrottle<ResizePreview>,
    published: Option<ResizePreview>,
    epoch: Instant,
}

impl ResizeController {
    #[must_use]
    pub fn new(throttle: CommitThrottle<ResizePreview>, epoch: Instant) -> Self {
        Self {
            session: None,
            throttle,
            published: None,
            epoch,
        }
    }

    #[must_use]
    pub fn state(&self) -> ResizeState {
        match &self.session {
            None => ResizeState::Idle,
            Some(session) => ResizeState::Resizing {
                panel: session.panel,
                handle: session.handle,
            },
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&ResizeSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn preview(&self) -> Option<ResizePreview> {
        self.session.as_ref().map(ResizeSession::snapshot)
    }

    #[must_use]
    pub fn published_preview(&self) -> Option<&ResizePreview> {
        self.published.as_ref()
    }

    /// Begin resizing `id` from `handle`.
    ///
    /// Resizing the panel that is already being resized is rejected; a
    /// resize on another panel is committed first.
    pub fn start(
        &mut self,
        store: &mut LayoutStore,
        history: &mut History,
        id: PanelId,
        handle: ResizeHandle,
        pointer: Position,
        now: Instant,
    ) -> Result<()> {
        if let Some(active) = &self.session {
            if active.panel == id {
                return Err(LayoutError::SessionActive {
                    id,
                    kind: InteractionKind::Resize,
                });
            }
            debug!(previous = %active.panel, next = %id, "force-committing active resize");
            self.end(store, history, now)?;
        }

        store.begin_interaction(id, InteractionKind::Resize)?;
        let start = store.get(id)?.bounds();
        store.bring_to_front(id)?;
        self.throttle.clear();
        self.published = None;
        debug!(panel = %id, ?handle, "resize started");
        self.session = Some(ResizeSession {
            panel: id,
            handle,
            pointer_origin: pointer,
            start,
            cumulative: Delta::ZERO,
            modifiers: Modifiers::none(),
            preview: start,
            violations: Vec::new(),
            warnings: Vec::new(),
        });
        Ok(())
    }

    /// Apply an incremental pointer delta and return the new preview.
    pub fn move_by(
        &mut self,
        store: &LayoutStore,
        delta: Delta,
        modifiers: Modifiers,
        now: Instant,
    ) -> Result<ResizePreview> {
        let session = self.session.as_mut().ok_or(LayoutError::NoActiveSession {
            kind: InteractionKind::Resize,
        })?;
        let panel = store.get(session.panel)?;
        session.cumulative = session.cumulative.add(delta);
        session.modifiers = modifiers;

        let handle = session.handle;
        let start = session.start;
        let requested = handle.apply(start.size(), session.cumulative);
        let aspect_locked = modifiers.aspect_lock()
            || panel
                .constraints
                .aspect_ratio
                .is_some_and(|aspect| aspect.enforce_on_resize);
        let constrained =
            enforce_constraints(requested, &panel.constraints, start.size(), aspect_locked);
        let mut warnings = constrained.adjustments;
        let mut size = constrained.size;

        let container = store.container();
        let room_w = if handle.horizontal() < 0 {
            start.right() - container.x
        } else {
            container.right() - start.x
        };
        let room_h = if handle.vertical() < 0 {
            start.bottom() - container.y
        } else {
            container.bottom() - start.y
        };
        if size.width > room_w {
            warnings.push(Adjustment::ClampedToContainer {
                axis: Axis::Width,
                from: size.width,
                to: room_w,
            });
            size.width = room_w;
        }
        if size.height > room_h {
            warnings.push(Adjustment::ClampedToContainer {
                axis: Axis::Height,
                from: size.height,
                to: room_h,
            });
            size.height = room_h;
        }

        let bounds = handle.anchor(&start, size);
        let mut violations: Vec<ResizeViolation> = size_violations(size, &panel.constraints)
            .into_iter()
            .map(ResizeViolation::Size)
            .collect();
        if size.is_empty() {
            violations.push(ResizeViolation::EmptySize);
        }
        if !container.contains(&bounds) {
            violations.push(ResizeViolation::OutOfBounds);
        }
        let hits = store.find_collisions(&bounds, &[session.panel]);
        if hits.colliding {
            violations.push(ResizeViolation::Collision {
                panels: hits.panels,
            });
        }

        session.preview = bounds;
        session.violations = violations;
        session.warnings = warnings;
        let preview = session.snapshot();
        let pointer = session.pointer();
        trace!(
            panel = %session.panel,
            pointer_x = pointer.x,
            pointer_y = pointer.y,
            width = bounds.width,
            height = bounds.height,
            violations = preview.violations.len(),
            warnings = preview.warnings.len(),
            "resize moved"
        );
        if let Some(released) = self.throttle.push(preview.clone(), now) {
            self.published = Some(released);
        }
        Ok(preview)
    }

    /// Release a throttled preview whose interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<&ResizePreview> {
        let released = self.throttle.poll(now)?;
        self.published = Some(released);
        self.published.as_ref()
    }

    /// Commit the preview. A refused commit leaves the start bounds in place.
    pub fn end(
        &mut self,
        store: &mut LayoutStore,
        history: &mut History,
        now: Instant,
    ) -> Result<ResizeOutcome> {
        let session = self.session.take().ok_or(LayoutError::NoActiveSession {
            kind: InteractionKind::Resize,
        })?;
        if let Some(last) = self.throttle.flush() {
            self.published = Some(last);
        }
        store.end_interaction(session.panel, InteractionKind::Resize);

        if session.preview == session.start {
            return Ok(ResizeOutcome {
                panel: session.panel,
                bounds: session.start,
                rejection: None,
            });
        }
        if let Err(err) = store.commit_geometry(session.panel, session.preview) {
            warn!(panel = %session.panel, error = %err, "resize commit rejected; reverting");
            return Ok(ResizeOutcome {
                panel: session.panel,
                bounds: session.start,
                rejection: Some(err),
            });
        }
        history.push(HistoryEntry {
            panel_id: session.panel,
            from: session.start,
            to: session.preview,
            timestamp_ms: elapsed_ms(self.epoch, now),
            kind: OperationKind::Resize,
        });
        debug!(
            panel = %session.panel,
            width = session.preview.width,
            height = session.preview.height,
            "resize committed"
        );
        Ok(ResizeOutcome {
            panel: session.panel,
            bounds: session.preview,
            rejection: None,
        })
    }

    /// Abandon the session. Returns whether one was active.
    pub fn cancel(&mut self, store: &mut LayoutStore) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        store.end_interaction(session.panel, InteractionKind::Resize);
        self.throttle.clear();
        self.published = None;
        debug!(panel = %session.panel, "resize cancelled");
        true
    }
}
