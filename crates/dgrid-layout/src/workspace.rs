//! Per-workspace context: one store, one history and one controller of each
//! kind, sharing a single time epoch.
//!
//! Hosts that manage several workspaces create one [`Workspace`] per
//! workspace; nothing here is global. All session entry points take the
//! current [`Instant`] so behaviour is reproducible under test.

use std::collections::BTreeMap;
use std::time::Instant;

use dgrid_core::geometry::{Bounds, Delta, Position, Size};
use dgrid_core::input::{Modifiers, NudgeDirection};
use dgrid_core::throttle::CommitThrottle;
use tracing::{debug, debug_span, warn};

use crate::config::LayoutConfig;
use crate::drag::{DragController, DragOutcome, DragPreview};
use crate::error::{InteractionKind, LayoutError, Result};
use crate::grid::align_to_grid;
use crate::history::{History, HistoryEntry};
use crate::optimizer::{
    OptimizeOptions, OptimizeReport, ValidationReport, optimize_layout, validate_layout,
};
use crate::panel::{Panel, PanelId, PanelSpec};
use crate::resize::{ResizeController, ResizeHandle, ResizeOutcome, ResizePreview};
use crate::resolver::{AvailableSpace, calculate_available_space, constrain_position};
use crate::snapshot::{LayoutSnapshot, SnapshotError, export_layout, import_snapshot};
use crate::store::LayoutStore;

/// A workspace and its interaction state.
#[derive(Debug)]
pub struct Workspace {
    name: String,
    description: String,
    extensions: BTreeMap<String, String>,
    store: LayoutStore,
    history: History,
    drag: DragController,
    resize: ResizeController,
    epoch: Instant,
}

impl Workspace {
    /// An empty workspace whose history timestamps count from now.
    pub fn new(container: Size, config: LayoutConfig) -> Result<Self> {
        Self::with_epoch(container, config, Instant::now())
    }

    /// An empty workspace whose history timestamps count from `epoch`.
    pub fn with_epoch(container: Size, config: LayoutConfig, epoch: Instant) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_store(LayoutStore::new(container, config), epoch))
    }

    fn from_store(store: LayoutStore, epoch: Instant) -> Self {
        let config = *store.config();
        Self {
            name: "workspace".to_string(),
            description: String::new(),
            extensions: BTreeMap::new(),
            history: History::with_capacity(config.history_depth),
            drag: DragController::new(CommitThrottle::new(config.commit_throttle()), epoch),
            resize: ResizeController::new(CommitThrottle::new(config.commit_throttle()), epoch),
            store,
            epoch,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Host-defined entries carried through export and import untouched.
    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extensions
    }

    #[must_use]
    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &LayoutConfig {
        self.store.config()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    #[must_use]
    pub fn resize(&self) -> &ResizeController {
        &self.resize
    }

    #[must_use]
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    // ---------------------------------------------------------------------
    // Panels
    // ---------------------------------------------------------------------

    pub fn add_panel(&mut self, spec: PanelSpec) -> Result<PanelId> {
        self.store.add_panel(spec)
    }

    /// Remove a panel, abandoning any session that involves it and dropping
    /// its history.
    pub fn remove_panel(&mut self, id: PanelId) -> Result<Panel> {
        self.store.get(id)?;
        if self.drag.session().is_some_and(|session| session.contains(id)) {
            self.drag.cancel(&mut self.store);
        }
        if self
            .resize
            .session()
            .is_some_and(|session| session.panel == id)
        {
            self.resize.cancel(&mut self.store);
        }
        self.history.forget_panel(id);
        self.store.remove_panel(id)
    }

    pub fn select(&mut self, id: PanelId, additive: bool) -> Result<()> {
        self.store.select(id, additive)
    }

    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    pub fn set_visible(&mut self, id: PanelId, visible: bool) -> Result<()> {
        let panel = self.store.get(id)?;
        if !visible && panel.is_interacting() {
            let kind = if panel.dragging {
                InteractionKind::Drag
            } else {
                InteractionKind::Resize
            };
            return Err(LayoutError::SessionActive { id, kind });
        }
        self.store.set_visible(id, visible)
    }

    #[must_use]
    pub fn hit_test(&self, point: Position) -> Option<PanelId> {
        self.store.hit_test(point)
    }

    // ---------------------------------------------------------------------
    // Drag
    // ---------------------------------------------------------------------

    pub fn start_drag(&mut self, id: PanelId, modifiers: Modifiers, now: Instant) -> Result<()> {
        self.drag
            .start(&mut self.store, &mut self.history, id, modifiers, now)
    }

    pub fn drag_move(
        &mut self,
        delta: Delta,
        modifiers: Modifiers,
        now: Instant,
    ) -> Result<DragPreview> {
        self.drag.move_by(&self.store, delta, modifiers, now)
    }

    pub fn end_drag(&mut self, now: Instant) -> Result<DragOutcome> {
        self.drag.end(&mut self.store, &mut self.history, now)
    }

    pub fn cancel_drag(&mut self) -> bool {
        self.drag.cancel(&mut self.store)
    }

    /// Move a panel by grid steps from the keyboard.
    pub fn nudge(
        &mut self,
        id: PanelId,
        direction: NudgeDirection,
        steps: u32,
        now: Instant,
    ) -> Result<Position> {
        self.drag
            .nudge(&mut self.store, &mut self.history, id, direction, steps, now)
    }

    // ---------------------------------------------------------------------
    // Resize
    // ---------------------------------------------------------------------

    pub fn start_resize(
        &mut self,
        id: PanelId,
        handle: ResizeHandle,
        pointer: Position,
        now: Instant,
    ) -> Result<()> {
        if self.drag.session().is_some_and(|session| session.contains(id)) {
            return Err(LayoutError::SessionActive {
                id,
                kind: InteractionKind::Drag,
            });
        }
        self.resize
            .start(&mut self.store, &mut self.history, id, handle, pointer, now)
    }

    pub fn resize_move(
        &mut self,
        delta: Delta,
        modifiers: Modifiers,
        now: Instant,
    ) -> Result<ResizePreview> {
        self.resize.move_by(&self.store, delta, modifiers, now)
    }

    pub fn end_resize(&mut self, now: Instant) -> Result<ResizeOutcome> {
        self.resize.end(&mut self.store, &mut self.history, now)
    }

    pub fn cancel_resize(&mut self) -> bool {
        self.resize.cancel(&mut self.store)
    }

    /// Release throttled previews from both controllers.
    pub fn poll(&mut self, now: Instant) -> (Option<DragPreview>, Option<ResizePreview>) {
        (self.drag.poll(now).cloned(), self.resize.poll(now).cloned())
    }

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    /// Restore the newest history entry's `from` bounds.
    ///
    /// Returns `Ok(None)` when the history is empty. If the restore cannot
    /// be committed (the old spot is now taken, or the panel is in a
    /// session) the entry stays in the history and the error is returned.
    pub fn undo(&mut self) -> Result<Option<HistoryEntry>> {
        let span = debug_span!("workspace.undo", workspace = %self.name);
        let _guard = span.enter();

        let Some(entry) = self.history.pop() else {
            debug!("nothing to undo");
            return Ok(None);
        };
        let restored = self.store.get(entry.panel_id).and_then(|panel| {
            if panel.dragging {
                Err(LayoutError::SessionActive {
                    id: entry.panel_id,
                    kind: InteractionKind::Drag,
                })
            } else if panel.resizing {
                Err(LayoutError::SessionActive {
                    id: entry.panel_id,
                    kind: InteractionKind::Resize,
                })
            } else {
                Ok(())
            }
        });
        let committed =
            restored.and_then(|()| self.store.commit_geometry(entry.panel_id, entry.from));
        if let Err(err) = committed {
            warn!(panel = %entry.panel_id, error = %err, "undo failed");
            self.history.restore(entry);
            return Err(err);
        }
        debug!(panel = %entry.panel_id, kind = ?entry.kind, "undo applied");
        Ok(Some(entry))
    }

    // ---------------------------------------------------------------------
    // Whole-layout operations
    // ---------------------------------------------------------------------

    /// Snap every visible panel's position to the grid in one commit.
    ///
    /// Returns the panels that moved. Fails without changes if the aligned
    /// layout would overlap or leave the container.
    pub fn align_all(&mut self) -> Result<Vec<PanelId>> {
        self.ensure_idle()?;
        let grid = self.config().grid_size;
        let container = self.store.container();
        let updates: Vec<(PanelId, Bounds)> = align_to_grid(self.store.visible_panels(), grid)
            .into_iter()
            .filter_map(|(id, position)| {
                let panel = self.store.panel(id)?;
                let position = constrain_position(position, panel.size, &container);
                (position != panel.position).then(|| (id, panel.bounds().with_position(position)))
            })
            .collect();
        self.store.commit_batch(&updates)?;
        debug!(moved = updates.len(), "panels aligned to grid");
        Ok(updates.into_iter().map(|(id, _)| id).collect())
    }

    /// Validate the committed layout.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let panels: Vec<Panel> = self.store.panels().cloned().collect();
        validate_layout(&panels, &self.store.container(), self.config().min_gap)
    }

    /// Run the optimizer and commit its result in one batch.
    ///
    /// Undo history is not recorded for optimizer moves.
    pub fn optimize(&mut self, options: &OptimizeOptions) -> Result<OptimizeReport> {
        self.ensure_idle()?;
        let panels: Vec<Panel> = self.store.panels().cloned().collect();
        let report = optimize_layout(&panels, &self.store.container(), options);
        let updates: Vec<(PanelId, Bounds)> = report
            .panels
            .iter()
            .filter(|panel| report.moved.contains(&panel.id))
            .map(|panel| (panel.id, panel.bounds()))
            .collect();
        self.store.commit_batch(&updates)?;
        Ok(report)
    }

    /// Largest free rectangles among the visible panels.
    #[must_use]
    pub fn available_space(&self) -> AvailableSpace {
        let occupied: Vec<Bounds> = self.store.visible_panels().map(Panel::bounds).collect();
        calculate_available_space(&occupied, &self.store.container())
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn export(&self) -> LayoutSnapshot {
        let mut snapshot = export_layout(&self.store, self.name.clone(), self.description.clone());
        snapshot.extensions = self.extensions.clone();
        snapshot
    }

    pub fn export_json(&self) -> std::result::Result<String, SnapshotError> {
        self.export().to_json()
    }

    /// Replace the layout with a snapshot.
    ///
    /// The snapshot is fully validated first; on error the workspace is left
    /// as it was. On success any active session is abandoned, the undo
    /// history cleared and the store revision keeps counting up from the
    /// replaced store. Returns the migration warnings, which are also logged.
    pub fn import_json(&mut self, json: &str) -> std::result::Result<Vec<String>, SnapshotError> {
        let snapshot = LayoutSnapshot::from_json(json)?;
        self.import(snapshot)
    }

    pub fn import(
        &mut self,
        snapshot: LayoutSnapshot,
    ) -> std::result::Result<Vec<String>, SnapshotError> {
        let container = self.store.container().size();
        let imported = import_snapshot(snapshot, container, *self.config())?;
        for warning in &imported.warnings {
            warn!(workspace = %imported.name, %warning, "snapshot migrated with warning");
        }
        self.drag.cancel(&mut self.store);
        self.resize.cancel(&mut self.store);
        let previous = self.store.revision();
        self.store = imported.store;
        self.store.continue_revision_from(previous);
        self.name = imported.name;
        self.description = imported.description;
        self.extensions = imported.extensions;
        self.history.clear();
        Ok(imported.warnings)
    }

    fn ensure_idle(&self) -> Result<()> {
        if let Some(session) = self.drag.session() {
            return Err(LayoutError::SessionActive {
                id: session.primary,
                kind: InteractionKind::Drag,
            });
        }
        if let Some(session) = self.resize.session() {
            return Err(LayoutError::SessionActive {
                id: session.panel,
                kind: InteractionKind::Resize,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::CommitRejection;
    use crate::history::OperationKind;

    fn workspace() -> (Workspace, Instant) {
        let epoch = Instant::now();
        let config = LayoutConfig::default().with_commit_throttle(Duration::ZERO);
        let ws = Workspace::with_epoch(Size::new(1200.0, 800.0), config, epoch).expect("workspace");
        (ws, epoch)
    }

    fn add(ws: &mut Workspace, x: f64, y: f64, w: f64, h: f64) -> PanelId {
        ws.add_panel(PanelSpec::new("widget", Size::new(w, h)).at(Position::new(x, y)))
            .expect("add panel")
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LayoutConfig::default().with_grid_size(-1.0);
        assert!(matches!(
            Workspace::new(Size::new(100.0, 100.0), config),
            Err(LayoutError::Config(_))
        ));
    }

    #[test]
    fn undo_restores_then_is_a_no_op() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 100.0, 100.0, 200.0, 150.0);
        ws.start_drag(id, Modifiers::none(), epoch).expect("start");
        ws.drag_move(Delta::new(100.0, 0.0), Modifiers::none(), epoch)
            .expect("move");
        ws.end_drag(epoch + Duration::from_millis(40)).expect("end");
        assert_eq!(ws.store().get(id).expect("panel").position, Position::new(200.0, 100.0));

        let entry = ws.undo().expect("undo").expect("entry");
        assert_eq!(entry.kind, OperationKind::Drag);
        assert_eq!(entry.timestamp_ms, 40);
        assert_eq!(ws.store().get(id).expect("panel").position, Position::new(100.0, 100.0));

        let revision = ws.store().revision();
        assert_eq!(ws.undo().expect("second undo"), None);
        assert_eq!(ws.store().revision(), revision);
    }

    #[test]
    fn failed_undo_keeps_entry() {
        let (mut ws, epoch) = workspace();
        let a = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.nudge(a, NudgeDirection::Right, 10, epoch).expect("nudge");
        let b = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        let err = ws.undo().expect_err("old spot taken");
        assert_eq!(
            err,
            LayoutError::CommitRejected {
                id: a,
                reason: CommitRejection::Overlap { other: b },
            }
        );
        assert_eq!(ws.history().len(), 1);
    }

    #[test]
    fn undo_reverts_resize() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 0.0, 0.0, 200.0, 200.0);
        ws.start_resize(id, ResizeHandle::SouthEast, Position::new(200.0, 200.0), epoch)
            .expect("start");
        ws.resize_move(Delta::new(100.0, 40.0), Modifiers::none(), epoch)
            .expect("move");
        let outcome = ws.end_resize(epoch).expect("end");
        assert!(outcome.committed());
        ws.undo().expect("undo");
        assert_eq!(
            ws.store().get(id).expect("panel").bounds(),
            Bounds::new(0.0, 0.0, 200.0, 200.0)
        );
    }

    #[test]
    fn resize_of_dragged_panel_is_rejected() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.start_drag(id, Modifiers::none(), epoch).expect("drag");
        let err = ws
            .start_resize(id, ResizeHandle::East, Position::new(100.0, 50.0), epoch)
            .expect_err("busy");
        assert_eq!(
            err,
            LayoutError::SessionActive {
                id,
                kind: InteractionKind::Drag
            }
        );
    }

    #[test]
    fn remove_panel_cancels_its_drag_and_history() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.nudge(id, NudgeDirection::Down, 1, epoch).expect("nudge");
        ws.start_drag(id, Modifiers::none(), epoch).expect("drag");
        ws.remove_panel(id).expect("remove");
        assert!(!ws.drag().is_active());
        assert!(ws.history().is_empty());
    }

    #[test]
    fn align_all_snaps_positions() {
        let (mut ws, _) = workspace();
        let a = ws
            .add_panel(PanelSpec::new("a", Size::new(100.0, 100.0)).at(Position::new(127.0, 143.0)))
            .expect("a");
        let b = add(&mut ws, 400.0, 0.0, 100.0, 100.0);
        let moved = ws.align_all().expect("align");
        assert_eq!(moved, vec![a]);
        assert_eq!(ws.store().get(a).expect("a").position, Position::new(120.0, 140.0));
        assert_eq!(ws.store().get(b).expect("b").position, Position::new(400.0, 0.0));
    }

    #[test]
    fn optimize_is_refused_during_a_session() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.start_drag(id, Modifiers::none(), epoch).expect("drag");
        assert!(matches!(
            ws.optimize(&OptimizeOptions::default()),
            Err(LayoutError::SessionActive { .. })
        ));
    }

    #[test]
    fn optimize_compacts_committed_layout() {
        let (mut ws, _) = workspace();
        let id = add(&mut ws, 400.0, 300.0, 100.0, 100.0);
        let options = OptimizeOptions::from_config(ws.config()).compact(true);
        let report = ws.optimize(&options).expect("optimize");
        assert_eq!(report.moved, vec![id]);
        assert_eq!(ws.store().get(id).expect("panel").position, Position::ORIGIN);
        assert!(ws.validate().valid);
    }

    #[test]
    fn import_replaces_layout_and_clears_history() {
        let (mut ws, epoch) = workspace();
        let id = add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.nudge(id, NudgeDirection::Right, 1, epoch).expect("nudge");
        ws.set_name("saved");
        let json = ws.export_json().expect("export");

        let (mut other, _) = workspace();
        add(&mut other, 500.0, 500.0, 50.0, 50.0);
        other.import_json(&json).expect("import");
        assert_eq!(other.name(), "saved");
        assert_eq!(other.store().len(), 1);
        assert_eq!(
            other.store().get(id).expect("panel").position,
            Position::new(20.0, 0.0)
        );
        assert!(other.history().is_empty());
    }

    #[test]
    fn import_keeps_extensions_for_export() {
        let (mut ws, _) = workspace();
        add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        ws.extensions_mut().insert("theme".into(), "dark".into());
        let json = ws.export_json().expect("export");

        let (mut other, _) = workspace();
        let warnings = other.import_json(&json).expect("import");
        assert!(warnings.is_empty());
        assert_eq!(other.extensions().get("theme").map(String::as_str), Some("dark"));
        assert_eq!(
            other.export().extensions.get("theme").map(String::as_str),
            Some("dark")
        );
    }

    #[test]
    fn import_never_rewinds_revision() {
        let (mut ws, _) = workspace();
        add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        add(&mut ws, 200.0, 0.0, 100.0, 100.0);
        let json = ws.export_json().expect("export");
        let before = ws.store().revision();
        assert!(before >= 2);

        ws.import_json(&json).expect("import");
        assert!(ws.store().revision() > before);
    }

    #[test]
    fn bad_import_leaves_workspace_untouched() {
        let (mut ws, _) = workspace();
        add(&mut ws, 0.0, 0.0, 100.0, 100.0);
        let revision = ws.store().revision();
        assert!(ws.import_json("not json").is_err());
        assert_eq!(ws.store().len(), 1);
        assert_eq!(ws.store().revision(), revision);
    }

    #[test]
    fn available_space_shrinks_with_panels() {
        let (mut ws, _) = workspace();
        assert_eq!(ws.available_space().total_area, 1200.0 * 800.0);
        add(&mut ws, 0.0, 0.0, 600.0, 800.0);
        assert_eq!(ws.available_space().total_area, 600.0 * 800.0);
    }
}
