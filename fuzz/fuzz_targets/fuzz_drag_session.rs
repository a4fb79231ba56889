#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use dgrid_core::geometry::{Delta, Position, Size};
use dgrid_core::input::{Modifiers, NudgeDirection};
use dgrid_layout::{LayoutConfig, Panel, PanelSpec, ResizeHandle, Workspace, validate_layout};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Add { w: u8, h: u8, x: u16, y: u16 },
    StartDrag { pick: u8, shift: bool },
    Move { dx: i16, dy: i16, alt: bool },
    EndDrag,
    CancelDrag,
    StartResize { pick: u8, handle: u8 },
    ResizeMove { dx: i16, dy: i16, shift: bool },
    EndResize,
    Nudge { pick: u8, dir: u8 },
    Select { pick: u8, additive: bool },
    Undo,
    Tick { ms: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let epoch = Instant::now();
    let mut now = epoch;
    let config = LayoutConfig::default();
    let Ok(mut ws) = Workspace::with_epoch(Size::new(1200.0, 800.0), config, epoch) else {
        return;
    };

    for op in ops.into_iter().take(256) {
        let ids: Vec<_> = ws.store().panels().map(|p| p.id).collect();
        let pick = |n: u8| (!ids.is_empty()).then(|| ids[usize::from(n) % ids.len()]);
        match op {
            Op::Add { w, h, x, y } => {
                let size = Size::new(f64::from(w) * 4.0 + 1.0, f64::from(h) * 4.0 + 1.0);
                let spec = PanelSpec::new("fuzz", size)
                    .at(Position::new(f64::from(x % 1400), f64::from(y % 1000)));
                let _ = ws.add_panel(spec);
            }
            Op::StartDrag { pick: n, shift } => {
                if let Some(id) = pick(n) {
                    let mods = Modifiers { shift, ..Modifiers::none() };
                    let _ = ws.start_drag(id, mods, now);
                }
            }
            Op::Move { dx, dy, alt } => {
                let mods = Modifiers { alt, ..Modifiers::none() };
                let _ = ws.drag_move(Delta::new(f64::from(dx), f64::from(dy)), mods, now);
            }
            Op::EndDrag => {
                let _ = ws.end_drag(now);
            }
            Op::CancelDrag => {
                let _ = ws.cancel_drag();
            }
            Op::StartResize { pick: n, handle } => {
                if let Some(id) = pick(n) {
                    let handle = ResizeHandle::ALL[usize::from(handle) % ResizeHandle::ALL.len()];
                    let _ = ws.start_resize(id, handle, Position::ORIGIN, now);
                }
            }
            Op::ResizeMove { dx, dy, shift } => {
                let mods = Modifiers { shift, ..Modifiers::none() };
                let _ = ws.resize_move(Delta::new(f64::from(dx), f64::from(dy)), mods, now);
            }
            Op::EndResize => {
                let _ = ws.end_resize(now);
            }
            Op::Nudge { pick: n, dir } => {
                if let Some(id) = pick(n) {
                    let direction = match dir % 4 {
                        0 => NudgeDirection::Up,
                        1 => NudgeDirection::Down,
                        2 => NudgeDirection::Left,
                        _ => NudgeDirection::Right,
                    };
                    let _ = ws.nudge(id, direction, 1, now);
                }
            }
            Op::Select { pick: n, additive } => {
                if let Some(id) = pick(n) {
                    let _ = ws.select(id, additive);
                }
            }
            Op::Undo => {
                let _ = ws.undo();
            }
            Op::Tick { ms } => {
                now += Duration::from_millis(u64::from(ms));
                let _ = ws.poll(now);
            }
        }

        let panels: Vec<Panel> = ws.store().panels().cloned().collect();
        let report = validate_layout(&panels, &ws.store().container(), ws.config().min_gap);
        assert!(report.valid, "committed layout invalid: {:?}", report.errors);
    }
});
