#![no_main]

use dgrid_core::geometry::Size;
use dgrid_layout::{LayoutConfig, Panel, import_layout, validate_layout};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let container = Size::new(1200.0, 800.0);
    let Ok(imported) = import_layout(json, container, LayoutConfig::default()) else {
        return;
    };

    // Anything the importer accepts is a committed, valid layout.
    let store = &imported.store;
    let panels: Vec<Panel> = store.panels().cloned().collect();
    let report = validate_layout(&panels, &store.container(), store.config().min_gap);
    assert!(report.valid, "imported layout invalid: {:?}", report.errors);

    // Re-export must import again.
    let snapshot = dgrid_layout::export_layout(store, imported.name.clone(), "");
    let json = snapshot.to_json().expect("serialize");
    let again = import_layout(&json, container, LayoutConfig::default()).expect("round trip");
    assert_eq!(again.store.panels().count(), panels.len());
});
