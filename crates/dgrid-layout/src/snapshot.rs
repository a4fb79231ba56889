//! Versioned JSON snapshots of a layout.
//!
//! A [`LayoutSnapshot`] carries the committed panels of a store plus a name,
//! a description and a forward-compatible `extensions` bag. Transient state
//! (selection, session flags, undo history) is not persisted.
//!
//! # Schema Versioning Policy
//!
//! - **Additive fields** may be carried in `extensions` without a version bump.
//! - **Breaking changes** require incrementing [`SNAPSHOT_VERSION`] and adding a
//!   migration path to [`migrate_snapshot`].
//! - Loaders reject unknown versions with a [`SnapshotError`]; malformed input
//!   never panics.
//!
//! # Usage
//!
//! ```
//! use dgrid_core::geometry::{Position, Size};
//! use dgrid_layout::config::LayoutConfig;
//! use dgrid_layout::panel::PanelSpec;
//! use dgrid_layout::snapshot::{export_layout, import_layout};
//! use dgrid_layout::store::LayoutStore;
//!
//! let mut store = LayoutStore::new(Size::new(1200.0, 800.0), LayoutConfig::default());
//! store
//!     .add_panel(PanelSpec::new("chat", Size::new(300.0, 200.0)).at(Position::ORIGIN))
//!     .unwrap();
//!
//! let json = export_layout(&store, "main", "").to_json().unwrap();
//! let imported = import_layout(&json, Size::new(1200.0, 800.0), LayoutConfig::default()).unwrap();
//! assert_eq!(imported.store.len(), 1);
//! ```

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use dgrid_core::geometry::{Bounds, Position, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::panel::{Panel, PanelConstraints, PanelId};
use crate::store::LayoutStore;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u16 = 1;

fn default_snapshot_version() -> u16 {
    SNAPSHOT_VERSION
}

fn default_true() -> bool {
    true
}

/// One persisted panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRecord {
    pub id: PanelId,
    pub component: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub constraints: PanelConstraints,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl From<&Panel> for PanelRecord {
    fn from(panel: &Panel) -> Self {
        Self {
            id: panel.id,
            component: panel.component.clone(),
            position: panel.position,
            size: panel.size,
            z_index: panel.z_index,
            visible: panel.visible,
            constraints: panel.constraints.clone(),
            metadata: panel.metadata.clone(),
        }
    }
}

impl PanelRecord {
    /// Rebuild an unselected, idle panel.
    #[must_use]
    pub fn into_panel(self) -> Panel {
        let mut panel = Panel::new(
            self.id,
            self.component,
            Bounds::from_parts(self.position, self.size),
        )
        .with_constraints(self.constraints)
        .with_z_index(self.z_index);
        panel.visible = self.visible;
        panel.metadata = self.metadata;
        panel
    }
}

/// Persisted layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub panels: Vec<PanelRecord>,
    /// Forward-compatible extension bag.
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl LayoutSnapshot {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            name: name.into(),
            description: description.into(),
            panels: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Parse snapshot JSON without validating its contents.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(SnapshotError::from)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|err| SnapshotError::Serialize(err.to_string()))
    }

    /// Check version and metadata. Panel geometry is checked on import.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if self.name.trim().is_empty() {
            return Err(SnapshotError::EmptyName);
        }
        Ok(())
    }

    /// Sort panels by id for deterministic output.
    pub fn canonicalize(&mut self) {
        self.panels.sort_by_key(|record| record.id);
    }

    /// Deterministic hash for diagnostics.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.version.hash(&mut hasher);
        self.name.hash(&mut hasher);
        for record in &self.panels {
            record.id.hash(&mut hasher);
            record.component.hash(&mut hasher);
            for value in [
                record.position.x,
                record.position.y,
                record.size.width,
                record.size.height,
            ] {
                value.to_bits().hash(&mut hasher);
            }
            record.z_index.hash(&mut hasher);
            record.visible.hash(&mut hasher);
        }
        for (k, v) in &self.extensions {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Errors from snapshot parsing, migration and import.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("no migration path from v{from} to v{to}")]
    NoMigrationPath { from: u16, to: u16 },

    #[error("snapshot name must not be empty")]
    EmptyName,

    #[error("invalid layout: {0}")]
    InvalidLayout(#[from] LayoutError),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Snapshot of every panel in `store`, in creation order.
#[must_use]
pub fn export_layout(
    store: &LayoutStore,
    name: impl Into<String>,
    description: impl Into<String>,
) -> LayoutSnapshot {
    let mut snapshot = LayoutSnapshot::new(name, description);
    snapshot.panels = store.panels().map(PanelRecord::from).collect();
    debug!(panels = snapshot.panels.len(), "layout exported");
    snapshot
}

/// A store rebuilt from a snapshot, plus the snapshot's metadata.
#[derive(Debug, Clone)]
pub struct ImportedLayout {
    pub name: String,
    pub description: String,
    pub extensions: BTreeMap<String, String>,
    pub store: LayoutStore,
    /// Notes produced by migration.
    pub warnings: Vec<String>,
}

/// Parse, migrate and validate snapshot JSON into a fresh store.
///
/// Every panel is checked (ids, constraints, size limits, container, overlap)
/// before the store exists, so a bad snapshot never yields a partial layout.
pub fn import_layout(
    json: &str,
    container: Size,
    config: LayoutConfig,
) -> Result<ImportedLayout, SnapshotError> {
    let snapshot = LayoutSnapshot::from_json(json).inspect_err(|err| {
        warn!(error = %err, "snapshot parse failed");
    })?;
    import_snapshot(snapshot, container, config)
}

/// [`import_layout`] for an already parsed snapshot.
pub fn import_snapshot(
    snapshot: LayoutSnapshot,
    container: Size,
    config: LayoutConfig,
) -> Result<ImportedLayout, SnapshotError> {
    let migrated = migrate_snapshot(snapshot)?;
    let snapshot = migrated.snapshot;
    snapshot.validate()?;
    let store = LayoutStore::from_panels(
        container,
        config,
        snapshot.panels.into_iter().map(PanelRecord::into_panel),
    )
    .inspect_err(|err| warn!(error = %err, "snapshot rejected"))?;
    debug!(panels = store.len(), name = %snapshot.name, "layout imported");
    Ok(ImportedLayout {
        name: snapshot.name,
        description: snapshot.description,
        extensions: snapshot.extensions,
        store,
        warnings: migrated.warnings,
    })
}

// =========================================================================
// Migration scaffolding
// =========================================================================

/// Result of migrating a snapshot to [`SNAPSHOT_VERSION`].
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub snapshot: LayoutSnapshot,
    pub from_version: u16,
    pub to_version: u16,
    pub warnings: Vec<String>,
}

/// Bring a snapshot to the current schema version.
///
/// v1 is current, so this is the identity for v1 and an error otherwise.
pub fn migrate_snapshot(snapshot: LayoutSnapshot) -> Result<MigrationResult, SnapshotError> {
    match snapshot.version {
        SNAPSHOT_VERSION => Ok(MigrationResult {
            from_version: SNAPSHOT_VERSION,
            to_version: SNAPSHOT_VERSION,
            warnings: Vec::new(),
            snapshot,
        }),
        v if v > SNAPSHOT_VERSION => Err(SnapshotError::UnsupportedVersion {
            found: v,
            expected: SNAPSHOT_VERSION,
        }),
        v => Err(SnapshotError::NoMigrationPath {
            from: v,
            to: SNAPSHOT_VERSION,
        }),
    }
}

#[must_use]
pub fn needs_migration(snapshot: &LayoutSnapshot) -> bool {
    snapshot.version != SNAPSHOT_VERSION
}
