//! Panel model: identifiers, constraints, and the committed panel record.
//!
//! Panels are owned by the [`LayoutStore`](crate::store::LayoutStore). Session
//! controllers read them and submit new geometry through store commits; they
//! never hold a mutable panel.

use std::collections::BTreeMap;
use std::fmt;

use dgrid_core::geometry::{Bounds, Position, Size};
use serde::{Deserialize, Serialize};

use crate::error::{Axis, LayoutError};

/// Stable identifier for panels.
///
/// `0` is reserved/invalid so IDs are always non-zero. IDs are allocated
/// monotonically, so ascending ID order is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PanelId(u64);

impl PanelId {
    /// Lowest valid panel ID.
    pub const MIN: Self = Self(1);

    /// Create a new panel ID, rejecting 0.
    pub fn new(raw: u64) -> Result<Self, LayoutError> {
        if raw == 0 {
            return Err(LayoutError::ZeroPanelId);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the next ID, or an error on overflow.
    pub fn checked_next(self) -> Result<Self, LayoutError> {
        let Some(next) = self.0.checked_add(1) else {
            return Err(LayoutError::PanelIdOverflow { current: self });
        };
        Self::new(next)
    }
}

impl Default for PanelId {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for PanelId {
    type Error = LayoutError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PanelId> for u64 {
    fn from(id: PanelId) -> Self {
        id.0
    }
}

/// Deterministic allocator for panel IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelIdAllocator {
    next: PanelId,
}

impl PanelIdAllocator {
    /// Start allocating from a known ID.
    #[must_use]
    pub const fn with_next(next: PanelId) -> Self {
        Self { next }
    }

    /// Peek at the next ID without consuming.
    #[must_use]
    pub const fn peek(&self) -> PanelId {
        self.next
    }

    /// Allocate the next ID and advance.
    pub fn allocate(&mut self) -> Result<PanelId, LayoutError> {
        let current = self.next;
        self.next = self.next.checked_next()?;
        Ok(current)
    }

    /// Make sure future allocations never reuse `id`.
    pub fn observe(&mut self, id: PanelId) -> Result<(), LayoutError> {
        if id >= self.next {
            self.next = id.checked_next()?;
        }
        Ok(())
    }
}

impl Default for PanelIdAllocator {
    fn default() -> Self {
        Self {
            next: PanelId::MIN,
        }
    }
}

/// Aspect-ratio lock for a panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioConstraint {
    /// Width divided by height.
    pub ratio: f64,
    /// Relative deviation from `ratio` accepted without correction.
    #[serde(default)]
    pub tolerance: f64,
    /// Lock the ratio on every resize, not only while shift is held.
    #[serde(default)]
    pub enforce_on_resize: bool,
}

impl AspectRatioConstraint {
    #[must_use]
    pub const fn new(ratio: f64) -> Self {
        Self {
            ratio,
            tolerance: 0.0,
            enforce_on_resize: false,
        }
    }

    /// Whether `size` already matches the ratio within tolerance.
    #[must_use]
    pub fn is_satisfied_by(&self, size: Size) -> bool {
        match size.aspect_ratio() {
            Some(actual) => ((actual - self.ratio) / self.ratio).abs() <= self.tolerance,
            None => false,
        }
    }
}

/// Per-panel size snapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapConstraints {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub grid_size: f64,
    #[serde(default)]
    pub snap_distance: f64,
    /// Preferred sizes the panel snaps to when within `snap_distance`.
    #[serde(default)]
    pub common_sizes: Vec<Size>,
}

fn default_true() -> bool {
    true
}

impl SnapConstraints {
    #[must_use]
    pub fn grid(grid_size: f64) -> Self {
        Self {
            enabled: true,
            grid_size,
            snap_distance: 0.0,
            common_sizes: Vec::new(),
        }
    }
}

/// Per-panel size bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConstraints {
    pub min_size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatioConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap: Option<SnapConstraints>,
}

impl PanelConstraints {
    /// Constraints with only a minimum size.
    #[must_use]
    pub fn with_min(min_size: Size) -> Self {
        Self {
            min_size,
            max_size: None,
            aspect_ratio: None,
            snap: None,
        }
    }

    #[must_use]
    pub fn max(mut self, max_size: Size) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn aspect(mut self, aspect: AspectRatioConstraint) -> Self {
        self.aspect_ratio = Some(aspect);
        self
    }

    #[must_use]
    pub fn snapping(mut self, snap: SnapConstraints) -> Self {
        self.snap = Some(snap);
        self
    }

    /// Validate constraints for a given panel.
    pub fn validate(&self, id: PanelId) -> Result<(), LayoutError> {
        let min = self.min_size;
        if !(min.is_finite() && min.width >= 0.0 && min.height >= 0.0) {
            return Err(LayoutError::InvalidMinSize {
                id,
                width: min.width,
                height: min.height,
            });
        }
        if let Some(max) = self.max_size {
            if max.width.is_nan() || max.width < self.min_size.width {
                return Err(LayoutError::InvalidConstraint {
                    id,
                    axis: Axis::Width,
                    min: self.min_size.width,
                    max: max.width,
                });
            }
            if max.height.is_nan() || max.height < self.min_size.height {
                return Err(LayoutError::InvalidConstraint {
                    id,
                    axis: Axis::Height,
                    min: self.min_size.height,
                    max: max.height,
                });
            }
        }
        if let Some(aspect) = self.aspect_ratio
            && !(aspect.ratio.is_finite() && aspect.ratio > 0.0)
        {
            return Err(LayoutError::InvalidAspectRatio {
                id,
                ratio: aspect.ratio,
            });
        }
        Ok(())
    }

    /// Bounds for one axis: `(min, max)`.
    #[must_use]
    pub fn axis_bounds(&self, axis: Axis) -> (f64, Option<f64>) {
        match axis {
            Axis::Width => (self.min_size.width, self.max_size.map(|s| s.width)),
            Axis::Height => (self.min_size.height, self.max_size.map(|s| s.height)),
        }
    }

    /// Grid used for size snapping, if enabled.
    #[must_use]
    pub fn snap_grid(&self) -> Option<f64> {
        self.snap
            .as_ref()
            .filter(|snap| snap.enabled && snap.grid_size > 0.0)
            .map(|snap| snap.grid_size)
    }
}

impl Default for PanelConstraints {
    fn default() -> Self {
        Self::with_min(Size::new(1.0, 1.0))
    }
}

/// A committed panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub id: PanelId,
    /// Host widget key (opaque to the layout engine).
    pub component: String,
    pub position: Position,
    pub size: Size,
    pub z_index: i32,
    pub visible: bool,
    pub constraints: PanelConstraints,
    pub selected: bool,
    #[serde(skip)]
    pub dragging: bool,
    #[serde(skip)]
    pub resizing: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Panel {
    /// A visible, unselected panel at `bounds`.
    #[must_use]
    pub fn new(id: PanelId, component: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id,
            component: component.into(),
            position: bounds.position(),
            size: bounds.size(),
            z_index: 0,
            visible: true,
            constraints: PanelConstraints::default(),
            selected: false,
            dragging: false,
            resizing: false,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: PanelConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::from_parts(self.position, self.size)
    }

    /// Whether the panel is part of any interactive session.
    #[must_use]
    pub const fn is_interacting(&self) -> bool {
        self.dragging || self.resizing
    }
}

/// Descriptor for adding a panel to a store.
///
/// `position: None` asks the store to place the panel in the first free
/// slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSpec {
    pub component: String,
    pub position: Option<Position>,
    pub size: Size,
    pub constraints: PanelConstraints,
    pub visible: bool,
    pub metadata: BTreeMap<String, String>,
}

impl PanelSpec {
    #[must_use]
    pub fn new(component: impl Into<String>, size: Size) -> Self {
        Self {
            component: component.into(),
            position: None,
            size,
            constraints: PanelConstraints::default(),
            visible: true,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn constraints(mut self, constraints: PanelConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
