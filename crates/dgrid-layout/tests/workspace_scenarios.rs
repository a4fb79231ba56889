//! End-to-end scenarios through the public workspace API.

use std::time::{Duration, Instant};

use dgrid_core::geometry::{Bounds, Delta, Position, Size};
use dgrid_core::input::{Modifiers, NudgeDirection};
use dgrid_layout::resolver::Adjustment;
use dgrid_layout::{
    Axis, CommitRejection, LayoutConfig, LayoutError, OperationKind, PanelConstraints, PanelId,
    PanelSpec, ResizeHandle, SnapshotError, Workspace, check_collision, find_collisions,
    snap_to_grid,
};

fn workspace() -> (Workspace, Instant) {
    let epoch = Instant::now();
    let config = LayoutConfig::default().with_commit_throttle(Duration::ZERO);
    let ws = Workspace::with_epoch(Size::new(1200.0, 800.0), config, epoch).expect("workspace");
    (ws, epoch)
}

fn add(ws: &mut Workspace, bounds: Bounds) -> PanelId {
    ws.add_panel(PanelSpec::new("widget", bounds.size()).at(bounds.position()))
        .expect("add panel")
}

#[test]
fn snap_example() {
    assert_eq!(
        snap_to_grid(Position::new(127.0, 143.0), 20.0),
        Position::new(120.0, 140.0)
    );
}

#[test]
fn collision_pair_example() {
    let existing = PanelId::new(1).expect("id");
    let subject = Bounds::new(150.0, 125.0, 200.0, 150.0);
    let hit = find_collisions([(existing, Bounds::new(100.0, 100.0, 200.0, 150.0))], &subject, 0.0);
    assert!(hit.colliding);
    assert_eq!(hit.panels, vec![existing]);

    let miss = find_collisions([(existing, Bounds::new(400.0, 400.0, 200.0, 150.0))], &subject, 0.0);
    assert!(!miss.colliding);
}

#[test]
fn undo_last_drag_restores_exact_position_once() {
    let (mut ws, epoch) = workspace();
    let id = add(&mut ws, Bounds::new(100.0, 100.0, 200.0, 150.0));

    ws.start_drag(id, Modifiers::none(), epoch).expect("start");
    ws.drag_move(Delta::new(37.0, 0.0), Modifiers::none(), epoch)
        .expect("move");
    ws.drag_move(Delta::new(26.0, 61.0), Modifiers::none(), epoch)
        .expect("move");
    let outcome = ws.end_drag(epoch).expect("end");
    assert!(outcome.committed());
    assert_eq!(
        ws.store().get(id).expect("panel").position,
        Position::new(160.0, 160.0)
    );
    assert_eq!(ws.history().len(), 1);

    let entry = ws.undo().expect("undo").expect("entry");
    assert_eq!(entry.kind, OperationKind::Drag);
    assert_eq!(
        ws.store().get(id).expect("panel").position,
        Position::new(100.0, 100.0)
    );
    assert!(ws.history().is_empty());
    assert_eq!(ws.undo().expect("no-op"), None);
    assert_eq!(
        ws.store().get(id).expect("panel").position,
        Position::new(100.0, 100.0)
    );
}

#[test]
fn resize_below_minimum_clamps_and_clears_violations() {
    let (mut ws, epoch) = workspace();
    let id = ws
        .add_panel(
            PanelSpec::new("a", Size::new(300.0, 200.0))
                .at(Position::ORIGIN)
                .constraints(PanelConstraints::with_min(Size::new(100.0, 100.0))),
        )
        .expect("add");

    ws.start_resize(id, ResizeHandle::East, Position::new(300.0, 100.0), epoch)
        .expect("start");
    let preview = ws
        .resize_move(Delta::new(-250.0, 0.0), Modifiers::none(), epoch)
        .expect("move");
    assert_eq!(preview.bounds, Bounds::new(0.0, 0.0, 100.0, 200.0));
    assert!(preview.violations.is_empty());
    assert_eq!(
        preview.warnings,
        vec![Adjustment::ClampedToMin {
            axis: Axis::Width,
            from: 50.0,
            to: 100.0,
        }]
    );

    let outcome = ws.end_resize(epoch).expect("end");
    assert!(outcome.committed());
    assert_eq!(
        ws.store().get(id).expect("panel").size,
        Size::new(100.0, 200.0)
    );
}

#[test]
fn group_drag_skips_blocked_companion() {
    let (mut ws, epoch) = workspace();
    let a = add(&mut ws, Bounds::new(0.0, 0.0, 100.0, 100.0));
    let b = add(&mut ws, Bounds::new(300.0, 0.0, 100.0, 100.0));
    add(&mut ws, Bounds::new(300.0, 200.0, 100.0, 100.0));
    ws.select(a, false).expect("select a");
    ws.select(b, true).expect("select b");

    ws.start_drag(a, Modifiers::none(), epoch).expect("start");
    let preview = ws
        .drag_move(Delta::new(0.0, 140.0), Modifiers::none(), epoch)
        .expect("move");
    assert!(preview.valid);
    assert_eq!(preview.skipped, vec![b]);
    assert_eq!(preview.position_of(a), Some(Position::new(0.0, 140.0)));
    assert_eq!(preview.position_of(b), Some(Position::new(300.0, 0.0)));

    let outcome = ws.end_drag(epoch).expect("end");
    assert_eq!(outcome.moved, vec![a]);
    assert_eq!(
        ws.store().get(b).expect("b").position,
        Position::new(300.0, 0.0)
    );
    assert_eq!(ws.history().len(), 1);
}

#[test]
fn held_companion_in_the_way_invalidates_the_frame() {
    let (mut ws, epoch) = workspace();
    let a = add(&mut ws, Bounds::new(0.0, 0.0, 100.0, 100.0));
    let b = add(&mut ws, Bounds::new(0.0, 200.0, 100.0, 100.0));
    add(&mut ws, Bounds::new(0.0, 350.0, 100.0, 100.0));
    ws.select(a, false).expect("select a");
    ws.select(b, true).expect("select b");

    ws.start_drag(a, Modifiers::alt(), epoch).expect("start");
    let preview = ws
        .drag_move(Delta::new(0.0, 150.0), Modifiers::alt(), epoch)
        .expect("move");
    let a_box = Bounds::from_parts(preview.position_of(a).expect("a"), Size::new(100.0, 100.0));
    let b_box = Bounds::from_parts(preview.position_of(b).expect("b"), Size::new(100.0, 100.0));
    assert!(!check_collision(&a_box, &b_box, 0.0), "preview members overlap");
    assert!(!preview.valid);

    let outcome = ws.end_drag(epoch).expect("end");
    assert!(outcome.committed());
    assert!(ws.validate().valid);
}

#[test]
fn negative_and_empty_sizes_never_import() {
    let (mut source, _) = workspace();
    add(&mut source, Bounds::new(100.0, 100.0, 100.0, 100.0));
    let valid = source.export();

    let (mut ws, _) = workspace();
    let mut negative = valid.clone();
    negative.panels[0].size = Size::new(-50.0, -50.0);
    negative.panels[0].constraints = PanelConstraints::with_min(Size::new(-100.0, -100.0));
    assert!(matches!(
        ws.import(negative),
        Err(SnapshotError::InvalidLayout(LayoutError::InvalidMinSize { .. }))
    ));

    let mut empty = valid;
    empty.panels[0].size = Size::new(0.0, 100.0);
    empty.panels[0].constraints = PanelConstraints::with_min(Size::new(0.0, 0.0));
    assert!(matches!(
        ws.import(empty),
        Err(SnapshotError::InvalidLayout(LayoutError::CommitRejected {
            reason: CommitRejection::EmptySize,
            ..
        }))
    ));
    assert!(ws.store().is_empty());

    let zero = ws.add_panel(
        PanelSpec::new("widget", Size::new(0.0, 0.0))
            .at(Position::ORIGIN)
            .constraints(PanelConstraints::with_min(Size::new(0.0, 0.0))),
    );
    assert!(zero.is_err());
}

#[test]
fn extensions_survive_import_then_export() {
    let (mut source, _) = workspace();
    add(&mut source, Bounds::new(0.0, 0.0, 100.0, 100.0));
    let mut snapshot = source.export();
    snapshot.extensions.insert("theme".into(), "dark".into());
    snapshot.extensions.insert("layout.owner".into(), "ops".into());
    let json = snapshot.to_json().expect("json");

    let (mut ws, _) = workspace();
    ws.import_json(&json).expect("import");
    let exported = ws.export();
    assert_eq!(exported.extensions, snapshot.extensions);
}

#[test]
fn revision_keeps_rising_across_import() {
    let (mut ws, epoch) = workspace();
    let id = add(&mut ws, Bounds::new(0.0, 0.0, 100.0, 100.0));
    ws.nudge(id, NudgeDirection::Down, 1, epoch)
        .expect("nudge");
    let json = ws.export_json().expect("export");
    let before = ws.store().revision();

    ws.import_json(&json).expect("import");
    let after_import = ws.store().revision();
    assert!(after_import > before);

    ws.nudge(id, NudgeDirection::Up, 1, epoch)
        .expect("nudge");
    assert!(ws.store().revision() > after_import);
}

#[test]
fn cancel_writes_no_history() {
    let (mut ws, epoch) = workspace();
    let id = add(&mut ws, Bounds::new(0.0, 0.0, 100.0, 100.0));
    ws.start_drag(id, Modifiers::none(), epoch).expect("start");
    ws.drag_move(Delta::new(200.0, 200.0), Modifiers::none(), epoch)
        .expect("move");
    assert!(ws.cancel_drag());
    assert_eq!(ws.store().get(id).expect("panel").position, Position::ORIGIN);
    assert!(ws.history().is_empty());
    assert!(!ws.store().get(id).expect("panel").dragging);
}

#[test]
fn two_workspaces_are_independent() {
    let (mut first, epoch) = workspace();
    let (mut second, _) = workspace();
    let a = add(&mut first, Bounds::new(0.0, 0.0, 100.0, 100.0));
    let b = add(&mut second, Bounds::new(0.0, 0.0, 100.0, 100.0));
    first.start_drag(a, Modifiers::none(), epoch).expect("drag first");
    second.start_drag(b, Modifiers::none(), epoch).expect("drag second");
    first.end_drag(epoch).expect("end first");
    assert!(!first.drag().is_active());
    assert!(second.drag().is_active());
}
