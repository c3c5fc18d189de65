//! Workspaces: layered view collections
//!
//! A workspace stacks its views in five fixed layers (background to
//! overlay), keeps a background rectangle under everything, and reserves a
//! slot above the overlay layer for the single fullscreen view. At most one
//! view is active at a time; exactly one workspace is enabled server-wide.

use log::{debug, warn};

use crate::geometry::Rect;
use crate::scene::Color;
use crate::toolkit::{
    Anchors, ElementId, ElementTree, ToolkitError, WindowId, WindowManager,
};

/// Unique identifier for workspaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkspaceId(pub u64);

impl WorkspaceId {
    fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        WorkspaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The fixed z-stacking bands of a workspace, lowest to highest
///
/// The fullscreen slot above [`Layer::Overlay`] is not an addressable
/// layer; promotion is the only way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Background,
    Bottom,
    Shell,
    Top,
    Overlay,
}

impl Layer {
    /// All layers, stacking order
    pub const ALL: [Layer; 5] = [
        Layer::Background,
        Layer::Bottom,
        Layer::Shell,
        Layer::Top,
        Layer::Overlay,
    ];

    fn index(self) -> usize {
        match self {
            Layer::Background => 0,
            Layer::Bottom => 1,
            Layer::Shell => 2,
            Layer::Top => 3,
            Layer::Overlay => 4,
        }
    }
}

/// One workspace
#[derive(Debug)]
pub struct Workspace {
    /// Unique identifier
    pub id: WorkspaceId,
    /// Display name
    pub name: String,
    enabled: bool,
    root: ElementId,
    background: ElementId,
    layer_containers: [ElementId; 5],
    layer_views: [Vec<WindowId>; 5],
    fullscreen_container: ElementId,
    fullscreen: Option<(WindowId, Layer)>,
    active: Option<WindowId>,
    extents: Rect,
    edge_reserve: i32,
}

impl Workspace {
    /// Build a workspace with its background and layer containers
    pub fn new(
        tree: &mut ElementTree,
        name: String,
        edge_reserve: i32,
        background_color: Color,
    ) -> Result<Self, ToolkitError> {
        let root = tree.create_container();
        let background = tree.create_rect(0, 0, background_color);
        tree.add_element(root, background)?;

        let mut layer_containers = [background; 5];
        for layer in Layer::ALL {
            let container = tree.create_container();
            tree.add_element(root, container)?;
            layer_containers[layer.index()] = container;
        }
        let fullscreen_container = tree.create_container();
        tree.add_element(root, fullscreen_container)?;

        // Workspaces start disabled; the server enables exactly one
        tree.set_visible(root, false)?;

        let id = WorkspaceId::new();
        debug!("Created workspace {:?} ({})", id, name);
        Ok(Self {
            id,
            name,
            enabled: false,
            root,
            background,
            layer_containers,
            layer_views: Default::default(),
            fullscreen_container,
            fullscreen: None,
            active: None,
            extents: Rect::default(),
            edge_reserve,
        })
    }

    /// The workspace's root container element
    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The currently active view
    pub fn active_view(&self) -> Option<WindowId> {
        self.active
    }

    /// The fullscreen occupant, if any
    pub fn fullscreen_view(&self) -> Option<WindowId> {
        self.fullscreen.map(|(view, _)| view)
    }

    /// Views in a layer, topmost first
    pub fn views_in_layer(&self, layer: Layer) -> &[WindowId] {
        &self.layer_views[layer.index()]
    }

    /// The layer a view lives in (its origin layer while fullscreen)
    pub fn layer_of(&self, view: WindowId) -> Option<Layer> {
        if let Some((fs, origin)) = self.fullscreen {
            if fs == view {
                return Some(origin);
            }
        }
        Layer::ALL
            .into_iter()
            .find(|layer| self.layer_views[layer.index()].contains(&view))
    }

    /// Whether the view belongs to this workspace
    pub fn contains(&self, view: WindowId) -> bool {
        self.layer_of(view).is_some()
    }

    /// Show the workspace and restore its previously active view
    pub fn enable(&mut self, tree: &mut ElementTree, windows: &mut WindowManager) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        let _ = tree.set_visible(self.root, true);
        if let Some(active) = self.active {
            // Re-run the activation side effects for the preserved pointer
            self.active = None;
            let _ = self.activate_view(tree, windows, active);
        }
    }

    /// Hide the workspace; the activation pointer is preserved for the next
    /// enable
    pub fn disable(&mut self, tree: &mut ElementTree, windows: &mut WindowManager) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        if let Some(active) = self.active {
            let _ = windows.set_activated(tree, active, false);
        }
        tree.clear_keyboard_focus();
        let _ = tree.set_visible(self.root, false);
    }

    /// Add a view to a layer, at the top of that layer's stack
    pub fn add_view_to_layer(
        &mut self,
        tree: &mut ElementTree,
        windows: &WindowManager,
        view: WindowId,
        layer: Layer,
    ) -> Result<(), ToolkitError> {
        let container = windows
            .get(view)
            .ok_or(ToolkitError::UnknownElement)?
            .container;
        tree.add_element(self.layer_containers[layer.index()], container)?;
        self.layer_views[layer.index()].insert(0, view);
        debug!(
            "Workspace {:?}: added view {:?} to layer {:?}",
            self.id, view, layer
        );
        Ok(())
    }

    /// Remove a view from the workspace
    ///
    /// Removing the active view clears the activation and falls back to the
    /// first view of the shell layer, if any.
    pub fn remove_view(
        &mut self,
        tree: &mut ElementTree,
        windows: &mut WindowManager,
        view: WindowId,
    ) -> Result<(), ToolkitError> {
        let container = windows
            .get(view)
            .ok_or(ToolkitError::UnknownElement)?
            .container;

        if self.fullscreen_view() == Some(view) {
            tree.remove_element(self.fullscreen_container, container)?;
            self.fullscreen = None;
        } else {
            let layer = self.layer_of(view).ok_or(ToolkitError::NotAChild)?;
            tree.remove_element(self.layer_containers[layer.index()], container)?;
            self.layer_views[layer.index()].retain(|&v| v != view);
        }

        if self.active == Some(view) {
            self.active = None;
            // First-available fallback, not most-recently-used
            if let Some(&next) = self.layer_views[Layer::Shell.index()].first() {
                let _ = self.activate_view(tree, windows, next);
            }
        }
        Ok(())
    }

    /// Make a view the active one
    ///
    /// Activating the already-active view of an enabled workspace is a
    /// no-op. A fullscreen view other than the target is demoted first.
    pub fn activate_view(
        &mut self,
        tree: &mut ElementTree,
        windows: &mut WindowManager,
        view: WindowId,
    ) -> Result<(), ToolkitError> {
        if !self.contains(view) {
            return Err(ToolkitError::NotAChild);
        }
        if self.active == Some(view) && self.enabled {
            return Ok(());
        }

        if let Some((fullscreen, _)) = self.fullscreen {
            if fullscreen != view {
                self.demote_from_fullscreen(tree, windows, fullscreen)?;
            }
        }

        if let Some(old) = self.active {
            if old != view {
                let _ = windows.set_activated(tree, old, false);
            }
        }
        self.active = Some(view);

        if self.enabled {
            windows.set_activated(tree, view, true)?;
            let window = windows.get(view).ok_or(ToolkitError::UnknownElement)?;
            let (container, content) = (window.container, window.content);
            let _ = tree.set_keyboard_focus_path(content);
            // Raise in the scene only; the view list keeps insertion order
            // so removal fallback stays first-available, not MRU
            if let Some(layer) = self.layer_of(view) {
                if self.fullscreen_view() != Some(view) {
                    let _ = tree.raise_to_top(self.layer_containers[layer.index()], container);
                }
            }
        }
        Ok(())
    }

    /// Activate the next view in the shell layer, wrapping around
    pub fn activate_next_view(
        &mut self,
        tree: &mut ElementTree,
        windows: &mut WindowManager,
    ) -> Result<(), ToolkitError> {
        if let Some(next) = self.neighbor_view(1) {
            self.activate_view(tree, windows, next)?;
        }
        Ok(())
    }

    /// Activate the previous view in the shell layer, wrapping around
    pub fn activate_previous_view(
        &mut self,
        tree: &mut ElementTree,
        windows: &mut WindowManager,
    ) -> Result<(), ToolkitError> {
        if let Some(prev) = self.neighbor_view(-1) {
            self.activate_view(tree, windows, prev)?;
        }
        Ok(())
    }

    fn neighbor_view(&self, step: isize) -> Option<WindowId> {
        let shell = &self.layer_views[Layer::Shell.index()];
        if shell.is_empty() {
            return None;
        }
        let current = self
            .active
            .and_then(|active| shell.iter().position(|&v| v == active));
        let index = match current {
            Some(index) => {
                (index as isize + step).rem_euclid(shell.len() as isize) as usize
            }
            None => 0,
        };
        shell.get(index).copied()
    }

    /// Move a view into the dedicated above-overlay fullscreen slot
    ///
    /// Any other fullscreen occupant is demoted first; there is never more
    /// than one.
    pub fn promote_to_fullscreen(
        &mut self,
        tree: &mut ElementTree,
        windows: &WindowManager,
        view: WindowId,
    ) -> Result<(), ToolkitError> {
        if self.fullscreen_view() == Some(view) {
            return Ok(());
        }
        if let Some((other, _)) = self.fullscreen {
            self.demote_from_fullscreen_inner(tree, windows, other)?;
        }
        let layer = self.layer_of(view).ok_or(ToolkitError::NotAChild)?;
        let container = windows
            .get(view)
            .ok_or(ToolkitError::UnknownElement)?
            .container;
        tree.remove_element(self.layer_containers[layer.index()], container)?;
        self.layer_views[layer.index()].retain(|&v| v != view);
        tree.add_element(self.fullscreen_container, container)?;
        self.fullscreen = Some((view, layer));
        debug!(
            "Workspace {:?}: promoted {:?} to fullscreen (origin {:?})",
            self.id, view, layer
        );
        Ok(())
    }

    /// Restore a fullscreen view to its origin layer
    pub fn demote_from_fullscreen(
        &mut self,
        tree: &mut ElementTree,
        windows: &WindowManager,
        view: WindowId,
    ) -> Result<(), ToolkitError> {
        if self.fullscreen_view() != Some(view) {
            warn!(
                "Workspace {:?}: demote of {:?} which is not fullscreen",
                self.id, view
            );
            return Ok(());
        }
        self.demote_from_fullscreen_inner(tree, windows, view)
    }

    fn demote_from_fullscreen_inner(
        &mut self,
        tree: &mut ElementTree,
        windows: &WindowManager,
        view: WindowId,
    ) -> Result<(), ToolkitError> {
        let Some((_, origin)) = self.fullscreen.take() else {
            return Ok(());
        };
        let container = windows
            .get(view)
            .ok_or(ToolkitError::UnknownElement)?
            .container;
        tree.remove_element(self.fullscreen_container, container)?;
        tree.add_element(self.layer_containers[origin.index()], container)?;
        self.layer_views[origin.index()].insert(0, view);
        debug!(
            "Workspace {:?}: demoted {:?} back to layer {:?}",
            self.id, view, origin
        );
        Ok(())
    }

    /// Update the workspace extents after an output-layout change
    pub fn set_extents(&mut self, extents: Rect) {
        self.extents = extents;
    }

    pub fn extents(&self) -> Rect {
        self.extents
    }

    /// The area a maximized window may cover: extents minus the reserved
    /// strips along edges occupied by anchored auxiliary views
    ///
    /// The strip width is a policy constant from the configuration, not the
    /// measured size of whatever is docked there.
    pub fn usable_area(&self, windows: &WindowManager) -> Rect {
        let mut edges = Anchors::empty();
        for layer in Layer::ALL {
            if layer == Layer::Shell {
                continue;
            }
            for &view in &self.layer_views[layer.index()] {
                if let Some(window) = windows.get(view) {
                    edges |= window.anchors;
                }
            }
        }
        let reserve = |edge: Anchors| -> i32 {
            if edges.contains(edge) {
                self.edge_reserve
            } else {
                0
            }
        };
        self.extents.inset(
            reserve(Anchors::LEFT),
            reserve(Anchors::TOP),
            reserve(Anchors::RIGHT),
            reserve(Anchors::BOTTOM),
        )
    }

    /// Recompute the derived geometry after an extents or membership change
    ///
    /// Resizes the background to the extents and pins anchored non-shell
    /// views flush against their workspace edges; an anchor overrides the
    /// stored position on its axis.
    pub fn arrange(&mut self, tree: &mut ElementTree, windows: &WindowManager) {
        let extents = self.extents;
        let _ = tree.set_position(self.background, extents.x, extents.y);
        let _ = tree.set_rect_size(self.background, extents.width, extents.height);

        for layer in Layer::ALL {
            if layer == Layer::Shell {
                continue;
            }
            for &view in &self.layer_views[layer.index()] {
                let Some(window) = windows.get(view) else {
                    continue;
                };
                let anchors = window.anchors;
                if anchors.is_empty() {
                    continue;
                }
                let container = window.container;
                let (w, h) = windows.window_size(tree, view);
                let (mut x, mut y) = tree.position(container).unwrap_or((0, 0));
                if anchors.contains(Anchors::LEFT) {
                    x = extents.x;
                } else if anchors.contains(Anchors::RIGHT) {
                    x = extents.right() - w;
                }
                if anchors.contains(Anchors::TOP) {
                    y = extents.y;
                } else if anchors.contains(Anchors::BOTTOM) {
                    y = extents.bottom() - h;
                }
                let _ = tree.set_position(container, x, y);
            }
        }
        tree.update_layout(self.root);
    }
}
