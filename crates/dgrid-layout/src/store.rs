//! Authoritative panel state.
//!
//! The store is the only writer of committed geometry. Every commit is
//! validated against the panel's size limits, the container and every other
//! visible panel (inflated by the minimum gap) before anything changes, so a
//! rejected commit leaves the store untouched. The spatial index is updated
//! in the same step and therefore always reflects committed bounds.
//!
//! Hidden panels are kept out of the spatial index and do not take part in
//! overlap checks.

use std::collections::BTreeMap;

use dgrid_core::geometry::{Bounds, Position, Size};
use tracing::{debug, warn};

use crate::collision::{CollisionResult, check_collision, find_collisions_indexed};
use crate::config::LayoutConfig;
use crate::error::{Axis, CommitRejection, InteractionKind, LayoutError, Result};
use crate::panel::{Panel, PanelConstraints, PanelId, PanelIdAllocator, PanelSpec};
use crate::resolver::find_optimal_position;
use crate::spatial::SpatialIndex;

/// Committed panels of one workspace.
#[derive(Debug, Clone)]
pub struct LayoutStore {
    panels: BTreeMap<PanelId, Panel>,
    index: SpatialIndex,
    container: Bounds,
    config: LayoutConfig,
    ids: PanelIdAllocator,
    next_z: i32,
    revision: u64,
}

impl LayoutStore {
    /// An empty store for a container of `container` size anchored at the
    /// origin.
    #[must_use]
    pub fn new(container: Size, config: LayoutConfig) -> Self {
        Self {
            panels: BTreeMap::new(),
            index: SpatialIndex::new(config.bucket_size()),
            container: Bounds::from_size(container),
            config,
            ids: PanelIdAllocator::default(),
            next_z: 1,
            revision: 0,
        }
    }

    /// Build a store from existing panels, validating all of them first.
    ///
    /// Used by snapshot import; nothing is kept if any panel is invalid.
    pub fn from_panels(
        container: Size,
        config: LayoutConfig,
        panels: impl IntoIterator<Item = Panel>,
    ) -> Result<Self> {
        let mut store = Self::new(container, config);
        for mut panel in panels {
            if store.panels.contains_key(&panel.id) {
                return Err(LayoutError::DuplicatePanel { id: panel.id });
            }
            panel.constraints.validate(panel.id)?;
            panel.dragging = false;
            panel.resizing = false;
            store.check_shape(panel.id, &panel, &panel.bounds())?;
            if panel.visible {
                store.check_overlap(panel.id, &panel.bounds(), &[])?;
                store.index.add(panel.id, panel.bounds());
            }
            store.ids.observe(panel.id)?;
            store.next_z = store.next_z.max(panel.z_index.saturating_add(1));
            store.panels.insert(panel.id, panel);
        }
        Ok(store)
    }

    #[must_use]
    pub fn container(&self) -> Bounds {
        self.container
    }

    #[must_use]
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Monotonic change counter; bumps on every successful mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Continue the counter of a store this one replaces, so observers never
    /// see it go backwards.
    pub fn continue_revision_from(&mut self, previous: u64) {
        self.revision = self.revision.max(previous.saturating_add(1));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Panels in creation order.
    pub fn panels(&self) -> impl Iterator<Item = &Panel> {
        self.panels.values()
    }

    /// Visible panels in creation order.
    pub fn visible_panels(&self) -> impl Iterator<Item = &Panel> {
        self.panels.values().filter(|panel| panel.visible)
    }

    #[must_use]
    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.panels.get(&id)
    }

    /// Like [`panel`](Self::panel), but unknown ids are an error.
    pub fn get(&self, id: PanelId) -> Result<&Panel> {
        self.panels.get(&id).ok_or(LayoutError::UnknownPanel { id })
    }

    #[must_use]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Add a panel from a descriptor.
    ///
    /// Without an explicit position the panel takes the first free slot of a
    /// row-major scan. The new panel is placed on top of the stack.
    pub fn add_panel(&mut self, spec: PanelSpec) -> Result<PanelId> {
        let id = self.ids.peek();
        spec.constraints.validate(id)?;

        let position = match spec.position {
            Some(position) => position,
            None => {
                let obstacles: Vec<Bounds> =
                    self.visible_panels().map(Panel::bounds).collect();
                find_optimal_position(
                    spec.size,
                    &obstacles,
                    &self.container,
                    self.config.min_gap,
                    &self.config.search(),
                )
                .position
            }
        };

        let mut panel = Panel::new(id, spec.component, Bounds::from_parts(position, spec.size))
            .with_constraints(spec.constraints)
            .with_z_index(self.next_z);
        panel.visible = spec.visible;
        panel.metadata = spec.metadata;

        let bounds = panel.bounds();
        self.check_shape(id, &panel, &bounds)?;
        if panel.visible {
            self.check_overlap(id, &bounds, &[])?;
            self.index.add(id, bounds);
        }
        self.ids.allocate()?;
        self.next_z = self.next_z.saturating_add(1);
        self.panels.insert(id, panel);
        self.revision += 1;
        debug!(panel = %id, x = bounds.x, y = bounds.y, "panel added");
        Ok(id)
    }

    /// Remove a panel and return it.
    pub fn remove_panel(&mut self, id: PanelId) -> Result<Panel> {
        let panel = self
            .panels
            .remove(&id)
            .ok_or(LayoutError::UnknownPanel { id })?;
        self.index.remove(id);
        self.revision += 1;
        debug!(panel = %id, "panel removed");
        Ok(panel)
    }

    /// Commit new bounds for one panel.
    pub fn commit_geometry(&mut self, id: PanelId, bounds: Bounds) -> Result<()> {
        self.commit_batch(&[(id, bounds)])
    }

    /// Commit new bounds for several panels at once.
    ///
    /// Members are validated against each other's new bounds and against the
    /// current bounds of every other visible panel. Either all members are
    /// written or none are.
    pub fn commit_batch(&mut self, updates: &[(PanelId, Bounds)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let members: Vec<PanelId> = updates.iter().map(|(id, _)| *id).collect();
        for (i, (id, bounds)) in updates.iter().enumerate() {
            if members[..i].contains(id) {
                return Err(LayoutError::DuplicatePanel { id: *id });
            }
            let panel = self.get(*id)?;
            if let Err(err) = self
                .check_shape(*id, panel, bounds)
                .and_then(|()| {
                    if panel.visible {
                        self.check_overlap(*id, bounds, &members)
                    } else {
                        Ok(())
                    }
                })
            {
                warn!(panel = %id, error = %err, "commit rejected");
                return Err(err);
            }
        }
        for (i, (a_id, a)) in updates.iter().enumerate() {
            for (b_id, b) in &updates[i + 1..] {
                let both_visible = self.panels.get(a_id).is_some_and(|p| p.visible)
                    && self.panels.get(b_id).is_some_and(|p| p.visible);
                if both_visible && check_collision(a, b, self.config.min_gap) {
                    let err = LayoutError::CommitRejected {
                        id: *a_id,
                        reason: CommitRejection::Overlap { other: *b_id },
                    };
                    warn!(panel = %a_id, error = %err, "commit rejected");
                    return Err(err);
                }
            }
        }

        for (id, bounds) in updates {
            if let Some(panel) = self.panels.get_mut(id) {
                panel.position = bounds.position();
                panel.size = bounds.size();
                if panel.visible {
                    self.index.update(*id, *bounds);
                }
            }
        }
        self.revision += 1;
        debug!(panels = updates.len(), revision = self.revision, "geometry committed");
        Ok(())
    }

    /// Validate bounds for a panel without committing them.
    pub fn validate_geometry(&self, id: PanelId, bounds: &Bounds) -> Result<()> {
        let panel = self.get(id)?;
        self.check_shape(id, panel, bounds)?;
        if panel.visible {
            self.check_overlap(id, bounds, &[id])?;
        }
        Ok(())
    }

    /// Visible panels other than `exclude` colliding with `bounds`.
    #[must_use]
    pub fn find_collisions(&self, bounds: &Bounds, exclude: &[PanelId]) -> CollisionResult {
        find_collisions_indexed(&self.index, bounds, self.config.min_gap, |id| {
            exclude.contains(&id)
        })
    }

    /// Topmost visible panel under `point`.
    #[must_use]
    pub fn hit_test(&self, point: Position) -> Option<PanelId> {
        self.index
            .query_point(point)
            .into_iter()
            .filter_map(|id| self.panels.get(&id))
            .max_by_key(|panel| (panel.z_index, panel.id))
            .map(|panel| panel.id)
    }

    /// Raise a panel above every other panel. Returns its new z-index.
    pub fn bring_to_front(&mut self, id: PanelId) -> Result<i32> {
        let z = self.get(id)?.z_index;
        let on_top = self
            .panels
            .values()
            .all(|other| other.id == id || other.z_index < z);
        if on_top {
            return Ok(z);
        }
        let top = self.next_z;
        self.next_z = self.next_z.saturating_add(1);
        if let Some(panel) = self.panels.get_mut(&id) {
            panel.z_index = top;
        }
        self.revision += 1;
        Ok(top)
    }

    /// Select a panel. Non-additive selection clears every other panel.
    pub fn select(&mut self, id: PanelId, additive: bool) -> Result<()> {
        self.get(id)?;
        for panel in self.panels.values_mut() {
            if panel.id == id {
                panel.selected = true;
            } else if !additive {
                panel.selected = false;
            }
        }
        self.revision += 1;
        Ok(())
    }

    pub fn deselect(&mut self, id: PanelId) -> Result<()> {
        let panel = self
            .panels
            .get_mut(&id)
            .ok_or(LayoutError::UnknownPanel { id })?;
        if panel.selected {
            panel.selected = false;
            self.revision += 1;
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        let mut changed = false;
        for panel in self.panels.values_mut() {
            changed |= std::mem::take(&mut panel.selected);
        }
        if changed {
            self.revision += 1;
        }
    }

    /// Selected panels in creation order.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<PanelId> {
        self.panels
            .values()
            .filter(|panel| panel.selected)
            .map(|panel| panel.id)
            .collect()
    }

    /// Show or hide a panel. Showing a panel is rejected if it would overlap.
    pub fn set_visible(&mut self, id: PanelId, visible: bool) -> Result<()> {
        let panel = self.get(id)?;
        if panel.visible == visible {
            return Ok(());
        }
        let bounds = panel.bounds();
        if visible {
            self.check_overlap(id, &bounds, &[id])?;
            self.index.add(id, bounds);
        } else {
            self.index.remove(id);
        }
        if let Some(panel) = self.panels.get_mut(&id) {
            panel.visible = visible;
        }
        self.revision += 1;
        Ok(())
    }

    /// Replace a panel's constraints. Its current size must satisfy them.
    pub fn set_constraints(
        &mut self,
        id: PanelId,
        constraints: PanelConstraints,
    ) -> Result<()> {
        constraints.validate(id)?;
        let panel = self.get(id)?;
        let mut candidate = panel.clone();
        candidate.constraints = constraints;
        self.check_shape(id, &candidate, &candidate.bounds())?;
        self.panels.insert(id, candidate);
        self.revision += 1;
        Ok(())
    }

    /// Mark a panel as taking part in a session.
    pub(crate) fn begin_interaction(&mut self, id: PanelId, kind: InteractionKind) -> Result<()> {
        let panel = self
            .panels
            .get_mut(&id)
            .ok_or(LayoutError::UnknownPanel { id })?;
        if panel.dragging {
            return Err(LayoutError::SessionActive {
                id,
                kind: InteractionKind::Drag,
            });
        }
        if panel.resizing {
            return Err(LayoutError::SessionActive {
                id,
                kind: InteractionKind::Resize,
            });
        }
        if !panel.visible {
            return Err(LayoutError::PanelHidden { id });
        }
        match kind {
            InteractionKind::Drag => panel.dragging = true,
            InteractionKind::Resize => panel.resizing = true,
        }
        Ok(())
    }

    /// Clear a panel's session flag. Unknown ids are ignored.
    pub(crate) fn end_interaction(&mut self, id: PanelId, kind: InteractionKind) {
        if let Some(panel) = self.panels.get_mut(&id) {
            match kind {
                InteractionKind::Drag => panel.dragging = false,
                InteractionKind::Resize => panel.resizing = false,
            }
        }
    }

    fn check_shape(&self, id: PanelId, panel: &Panel, bounds: &Bounds) -> Result<()> {
        let reject = |reason| -> Result<()> { Err(LayoutError::CommitRejected { id, reason }) };
        if !bounds.is_finite() {
            return reject(CommitRejection::NonFinite);
        }
        if bounds.size().is_empty() {
            return reject(CommitRejection::EmptySize);
        }
        for (axis, actual) in [(Axis::Width, bounds.width), (Axis::Height, bounds.height)] {
            let (min, max) = panel.constraints.axis_bounds(axis);
            if actual < min {
                return reject(CommitRejection::BelowMinimum { axis, actual, min });
            }
            if let Some(max) = max
                && actual > max
            {
                return reject(CommitRejection::AboveMaximum { axis, actual, max });
            }
        }
        if !self.container.contains(bounds) {
            return reject(CommitRejection::OutOfBounds);
        }
        Ok(())
    }

    fn check_overlap(&self, id: PanelId, bounds: &Bounds, skip: &[PanelId]) -> Result<()> {
        let hits = find_collisions_indexed(&self.index, bounds, self.config.min_gap, |other| {
            other == id || skip.contains(&other)
        });
        match hits.panels.first() {
            Some(&other) => Err(LayoutError::CommitRejected {
                id,
                reason: CommitRejection::Overlap { other },
            }),
            None => Ok(()),
        }
    }
}
