//! Drag sessions.
//!
//! ```text
//! Idle -> Dragging -> Idle   (end commits, cancel reverts)
//! ```
//!
//! A session moves the pressed panel plus every other selected panel. Each
//! pointer move produces an optimistic preview; the store is written once,
//! as a single batch, when the session ends. Previews are offered to a
//! [`CommitThrottle`] so the view layer sees at most one per interval.
//!
//! Members whose candidate position collides keep their last valid preview
//! for that frame. Moving members must also clear the held boxes of blocked
//! members, so the set of previews is always free of overlaps. With [`GroupDragPolicy::AbortGroup`] a single collision
//! holds back the whole group instead.

use std::time::Instant;

use dgrid_core::geometry::{Bounds, Delta, Position, Size};
use dgrid_core::input::{Modifiers, NudgeDirection};
use dgrid_core::throttle::CommitThrottle;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::collision::check_collision;
use crate::config::GroupDragPolicy;
use crate::error::{InteractionKind, LayoutError, Result};
use crate::grid::{SnapTuning, magnetic_snap_to_edges, magnetic_snap_to_grid};
use crate::history::{History, HistoryEntry, OperationKind};
use crate::panel::PanelId;
use crate::resolver::constrain_position;
use crate::store::LayoutStore;

/// One panel carried by a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragMember {
    pub id: PanelId,
    pub start: Position,
    pub size: Size,
    /// Last collision-free position seen during the session.
    pub preview: Position,
}

impl DragMember {
    #[must_use]
    pub fn preview_bounds(&self) -> Bounds {
        Bounds::from_parts(self.preview, self.size)
    }

    #[must_use]
    pub fn has_moved(&self) -> bool {
        self.preview != self.start
    }
}

/// State of an active drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    /// The panel under the pointer. Always `members[0]`.
    pub primary: PanelId,
    /// Primary first, then companions in creation order.
    pub members: Vec<DragMember>,
    /// Sum of every delta passed to [`DragController::move_by`].
    pub cumulative: Delta,
    pub modifiers: Modifiers,
    /// Whether the primary's latest candidate was collision-free.
    pub valid: bool,
    /// Companions held back on the latest frame.
    pub skipped: Vec<PanelId>,
    snap_anchor: Option<Position>,
}

impl DragSession {
    #[must_use]
    pub fn member(&self, id: PanelId) -> Option<&DragMember> {
        self.members.iter().find(|member| member.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: PanelId) -> bool {
        self.member(id).is_some()
    }

    fn ids(&self) -> Vec<PanelId> {
        self.members.iter().map(|member| member.id).collect()
    }

    fn preview(&self, snapped: bool) -> DragPreview {
        DragPreview {
            positions: self
                .members
                .iter()
                .map(|member| (member.id, member.preview))
                .collect(),
            valid: self.valid,
            skipped: self.skipped.clone(),
            snapped,
        }
    }
}

/// Optimistic positions for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DragPreview {
    /// Preview origin for each member, primary first.
    pub positions: Vec<(PanelId, Position)>,
    pub valid: bool,
    pub skipped: Vec<PanelId>,
    /// The primary was snapped on this frame.
    pub snapped: bool,
}

impl DragPreview {
    #[must_use]
    pub fn position_of(&self, id: PanelId) -> Option<Position> {
        self.positions
            .iter()
            .find(|(member, _)| *member == id)
            .map(|(_, position)| *position)
    }
}

/// How a drag ended.
#[derive(Debug, Clone, PartialEq)]
pub struct DragOutcome {
    /// Panels whose new position was committed.
    pub moved: Vec<PanelId>,
    /// Store validation error when the batch was refused. In that case every
    /// member stays at its start position and no history is written.
    pub rejection: Option<LayoutError>,
}

impl DragOutcome {
    #[must_use]
    pub fn committed(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Lifecycle state of a [`DragController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DragState {
    Idle,
    Dragging {
        primary: PanelId,
        members: Vec<PanelId>,
    },
}

/// Drag state machine for one workspace.
#[derive(Debug, Clone)]
pub struct DragController {
    session: Option<DragSession>,
    throttle: CommitThrottle<DragPreview>,
    published: Option<DragPreview>,
    epoch: Instant,
}

impl DragController {
    /// A controller publishing previews through `throttle`; history
    /// timestamps count from `epoch`.
    #[must_use]
    pub fn new(throttle: CommitThrottle<DragPreview>, epoch: Instant) -> Self {
        Self {
            session: None,
            throttle,
            published: None,
            epoch,
        }
    }

    #[must_use]
    pub fn state(&self) -> DragState {
        match &self.session {
            None => DragState::Idle,
            Some(session) => DragState::Dragging {
                primary: session.primary,
                members: session.ids(),
            },
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    /// Latest optimistic preview, unthrottled.
    #[must_use]
    pub fn preview(&self) -> Option<DragPreview> {
        self.session.as_ref().map(|session| session.preview(false))
    }

    /// Latest preview released by the throttle.
    #[must_use]
    pub fn published_preview(&self) -> Option<&DragPreview> {
        self.published.as_ref()
    }

    /// Begin dragging `id`.
    ///
    /// Dragging a panel that is already part of the active session is
    /// rejected. Dragging a different panel first ends the active session
    /// and commits it.
    pub fn start(
        &mut self,
        store: &mut LayoutStore,
        history: &mut History,
        id: PanelId,
        modifiers: Modifiers,
        now: Instant,
    ) -> Result<()> {
        if let Some(active) = &self.session {
            if active.contains(id) {
                return Err(LayoutError::SessionActive {
                    id,
                    kind: InteractionKind::Drag,
                });
            }
            debug!(previous = %active.primary, next = %id, "force-committing active drag");
            self.end(store, history, now)?;
        }

        let panel = store.get(id)?;
        if !panel.visible {
            return Err(LayoutError::PanelHidden { id });
        }
        if panel.resizing {
            return Err(LayoutError::SessionActive {
                id,
                kind: InteractionKind::Resize,
            });
        }
        if !panel.selected {
            store.select(id, modifiers.additive_selection())?;
        }

        let mut member_ids = vec![id];
        member_ids.extend(
            store
                .visible_panels()
                .filter(|panel| panel.selected && panel.id != id && !panel.is_interacting())
                .map(|panel| panel.id),
        );
        let mut members: Vec<DragMember> = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            if let Err(err) = store.begin_interaction(member_id, InteractionKind::Drag) {
                for started in &members {
                    store.end_interaction(started.id, InteractionKind::Drag);
                }
                return Err(err);
            }
            let panel = store.get(member_id)?;
            members.push(DragMember {
                id: member_id,
                start: panel.position,
                size: panel.size,
                preview: panel.position,
            });
        }
        store.bring_to_front(id)?;

        self.throttle.clear();
        self.published = None;
        debug!(panel = %id, members = members.len(), "drag started");
        self.session = Some(DragSession {
            primary: id,
            members,
            cumulative: Delta::ZERO,
            modifiers,
            valid: true,
            skipped: Vec::new(),
            snap_anchor: None,
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
    ) -> Result<DragPreview> {
        let session = self.session.as_mut().ok_or(LayoutError::NoActiveSession {
            kind: InteractionKind::Drag,
        })?;
        session.cumulative = session.cumulative.add(delta);
        session.modifiers = modifiers;

        let config = store.config();
        let container = store.container();
        let gap = config.min_gap;
        let member_ids = session.ids();
        let primary = session.members[0];

        let raw = primary.start.offset(session.cumulative);
        let mut candidate = raw;
        let mut snapped = false;
        if modifiers.suppress_snapping() {
            session.snap_anchor = None;
        } else {
            if config.snap_to_grid {
                let decision = config.snap_tuning().decide(raw, session.snap_anchor);
                session.snap_anchor = decision.snapped;
                candidate = decision.position();
                snapped = decision.snapped.is_some();
            }
            if config.snap_to_edges {
                let neighbours: Vec<Bounds> = store
                    .visible_panels()
                    .filter(|panel| !member_ids.contains(&panel.id))
                    .map(|panel| panel.bounds())
                    .collect();
                let edge = magnetic_snap_to_edges(
                    &Bounds::from_parts(candidate, primary.size),
                    &neighbours,
                    config.snap_distance,
                );
                candidate = edge.position;
                snapped |= edge.snapped_x || edge.snapped_y;
            }
        }
        let group_delta = candidate.delta_from(primary.start);

        let positions: Vec<Position> = session
            .members
            .iter()
            .map(|member| {
                constrain_position(member.start.offset(group_delta), member.size, &container)
            })
            .collect();
        let candidates: Vec<Bounds> = session
            .members
            .iter()
            .zip(&positions)
            .map(|(member, position)| Bounds::from_parts(*position, member.size))
            .collect();
        let held: Vec<Bounds> = session.members.iter().map(DragMember::preview_bounds).collect();
        let blocked_by_store: Vec<bool> = candidates
            .iter()
            .map(|bounds| store.find_collisions(bounds, &member_ids).colliding)
            .collect();
        let blocked = settle_group(&candidates, &held, blocked_by_store, gap);
        let proposed: Vec<Option<Position>> = positions
            .into_iter()
            .zip(&blocked)
            .map(|(position, blocked)| (!blocked).then_some(position))
            .collect();

        let any_blocked = proposed.iter().any(Option::is_none);
        let abort = any_blocked && config.group_drag_policy == GroupDragPolicy::AbortGroup;
        session.valid = proposed[0].is_some() && !abort;
        session.skipped.clear();
        for (member, position) in session.members.iter_mut().zip(&proposed) {
            match position {
                Some(position) if !abort => member.preview = *position,
                _ => {
                    if member.id != session.primary {
                        session.skipped.push(member.id);
                    }
                }
            }
        }

        let preview = session.preview(snapped);
        trace!(
            panel = %session.primary,
            dx = session.cumulative.dx,
            dy = session.cumulative.dy,
            valid = preview.valid,
            skipped = preview.skipped.len(),
            "drag moved"
        );
        if let Some(released) = self.throttle.push(preview.clone(), now) {
            self.published = Some(released);
        }
        Ok(preview)
    }

    /// Release a throttled preview whose interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<&DragPreview> {
        let released = self.throttle.poll(now)?;
        self.published = Some(released);
        self.published.as_ref()
    }

    /// Commit the session's last valid previews as one batch.
    pub fn end(
        &mut self,
        store: &mut LayoutStore,
        history: &mut History,
        now: Instant,
    ) -> Result<DragOutcome> {
        let session = self.session.take().ok_or(LayoutError::NoActiveSession {
            kind: InteractionKind::Drag,
        })?;
        if let Some(last) = self.throttle.flush() {
            self.published = Some(last);
        }
        for member in &session.members {
            store.end_interaction(member.id, InteractionKind::Drag);
        }

        let moved: Vec<&DragMember> = session.members.iter().filter(|m| m.has_moved()).collect();
        if moved.is_empty() {
            debug!(panel = %session.primary, "drag ended without movement");
            return Ok(DragOutcome {
                moved: Vec::new(),
                rejection: None,
            });
        }
        let updates: Vec<(PanelId, Bounds)> = moved
            .iter()
            .map(|member| (member.id, member.preview_bounds()))
            .collect();
        if let Err(err) = store.commit_batch(&updates) {
            warn!(panel = %session.primary, error = %err, "drag commit rejected; reverting");
            return Ok(DragOutcome {
                moved: Vec::new(),
                rejection: Some(err),
            });
        }

        let timestamp_ms = elapsed_ms(self.epoch, now);
        for member in &moved {
            history.push(HistoryEntry {
                panel_id: member.id,
                from: Bounds::from_parts(member.start, member.size),
                to: member.preview_bounds(),
                timestamp_ms,
                kind: OperationKind::Drag,
            });
        }
        debug!(panel = %session.primary, moved = moved.len(), "drag committed");
        Ok(DragOutcome {
            moved: moved.iter().map(|member| member.id).collect(),
            rejection: None,
        })
    }

    /// Abandon the session. Returns whether one was active.
    pub fn cancel(&mut self, store: &mut LayoutStore) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        for member in &session.members {
            store.end_interaction(member.id, InteractionKind::Drag);
        }
        self.throttle.clear();
        self.published = None;
        debug!(panel = %session.primary, "drag cancelled");
        true
    }

    /// Move a panel by whole grid steps and commit immediately.
    ///
    /// The move is clamped to the container. Returns the new position, which
    /// equals the old one when the panel is already against the edge.
    pub fn nudge(
        &mut self,
        store: &mut LayoutStore,
        history: &mut History,
        id: PanelId,
        direction: NudgeDirection,
        steps: u32,
        now: Instant,
    ) -> Result<Position> {
        let panel = store.get(id)?;
        if panel.dragging || panel.resizing {
            let kind = if panel.dragging {
                InteractionKind::Drag
            } else {
                InteractionKind::Resize
            };
            return Err(LayoutError::SessionActive { id, kind });
        }
        let from = panel.bounds();
        let (ux, uy) = direction.unit();
        let distance = f64::from(steps) * store.config().grid_size;
        let target = constrain_position(
            from.position().offset(Delta::new(ux * distance, uy * distance)),
            from.size(),
            &store.container(),
        );
        if target == from.position() {
            return Ok(target);
        }
        let to = from.with_position(target);
        store.commit_geometry(id, to)?;
        store.bring_to_front(id)?;
        history.push(HistoryEntry {
            panel_id: id,
            from,
            to,
            timestamp_ms: elapsed_ms(self.epoch, now),
            kind: OperationKind::Nudge,
        });
        debug!(panel = %id, ?direction, steps, "panel nudged");
        Ok(target)
    }
}

pub(crate) fn elapsed_ms(epoch: Instant, now: Instant) -> u64 {
    u64::try_from(now.saturating_duration_since(epoch).as_millis()).unwrap_or(u64::MAX)
}

/// Where a dragged panel would land, derived only from its start, the
/// cumulative pointer delta and the layout constraints.
///
/// Applies a plain magnetic grid snap (when `snap` is given) and clamps to
/// `container`. Collisions are not considered.
#[must_use]
pub fn project_drag_ghost(
    start: Position,
    size: Size,
    cumulative: Delta,
    container: &Bounds,
    snap: Option<&SnapTuning>,
) -> Bounds {
    let mut position = start.offset(cumulative);
    if let Some(snap) = snap {
        position = magnetic_snap_to_grid(position, snap.grid_size, snap.snap_distance).position;
    }
    Bounds::from_parts(constrain_position(position, size, container), size)
}

/// Decide which group members must hold their previous preview.
///
/// `blocked` starts as the members that hit a non-member. A member that
/// moves must clear the held box of every blocked member and the candidate
/// of every earlier moving member; a failure blocks it too, which can in
/// turn block others, so the check repeats until the blocked set is stable.
/// The set only grows, so this ends after at most `members` rounds.
fn settle_group(
    candidates: &[Bounds],
    held: &[Bounds],
    mut blocked: Vec<bool>,
    gap: f64,
) -> Vec<bool> {
    loop {
        let mut changed = false;
        for i in 0..candidates.len() {
            if blocked[i] {
                continue;
            }
            let hits_held = (0..held.len())
                .any(|j| j != i && blocked[j] && check_collision(&held[j], &candidates[i], gap));
            let hits_moving =
                (0..i).any(|j| !blocked[j] && check_collision(&candidates[j], &candidates[i], gap));
            if hits_held || hits_moving {
                blocked[i] = true;
                changed = true;
            }
        }
        if !changed {
            return blocked;
        }
    }
}
