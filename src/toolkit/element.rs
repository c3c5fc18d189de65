//! Elements and the element arena
//!
//! An [`Element`] is the smallest composable unit: a position, a visibility
//! flag, an optional scene node, and a weak back-reference to its owning
//! container. Elements live in an [`ElementTree`] arena and are addressed by
//! stable [`ElementId`]s; the arena owns the scene nodes that mirror the
//! element hierarchy.
//!
//! Scene nodes are created lazily: an element only gets one once its
//! ownership chain reaches the attached root, so unmapped elements never
//! hold graphics-layer resources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::scene::{Color, NodeId, Scene};
use crate::surface::SurfaceId;

use super::container::Container;
use super::content::{Content, Serial};
use super::ToolkitEvent;

/// Unique identifier for elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

impl ElementId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ElementId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A solid rectangle leaf (backgrounds, title bars, borders)
#[derive(Debug)]
pub struct RectElement {
    pub width: i32,
    pub height: i32,
    pub color: Color,
}

/// Element payload; the closed set of element variants
#[derive(Debug)]
pub enum ElementKind {
    Container(Container),
    Content(Content),
    Rect(RectElement),
}

/// One element in the arena
#[derive(Debug)]
pub struct Element {
    /// Unique identifier
    pub id: ElementId,
    /// Owning container; valid only while a member of that container's
    /// child list, cleared on removal
    pub parent: Option<ElementId>,
    /// Position relative to the owning container
    pub x: i32,
    pub y: i32,
    /// Whether the element participates in hit-testing and rendering
    pub visible: bool,
    /// Scene node, present only while attached under the root
    pub node: Option<NodeId>,
    /// Variant payload
    pub kind: ElementKind,
}

/// Errors from toolkit mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ToolkitError {
    #[error("Unknown element")]
    UnknownElement,
    #[error("Element is not a container")]
    NotAContainer,
    #[error("Element is not a content")]
    NotAContent,
    #[error("Element is not a rectangle")]
    NotARect,
    #[error("Element already has a parent container")]
    AlreadyParented,
    #[error("Element is not a child of this container")]
    NotAChild,
    #[error("No root container is attached")]
    NoRoot,
}

/// The element arena plus the scene it projects into
#[derive(Debug)]
pub struct ElementTree {
    elements: HashMap<ElementId, Element>,
    scene: Scene,
    root: Option<ElementId>,
    /// Last-known pointer position in root coordinates
    pub(super) pointer_pos: Option<(f64, f64)>,
    serial: u32,
    events: Vec<ToolkitEvent>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            scene: Scene::new(),
            root: None,
            pointer_pos: None,
            serial: 0,
            events: Vec::new(),
        }
    }

    /// The scene this tree projects into (read-only; the renderer walks it)
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The attached root container, if any
    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    /// Issue the next negotiation serial
    pub fn next_serial(&mut self) -> Serial {
        self.serial = self.serial.wrapping_add(1);
        Serial(self.serial)
    }

    pub(super) fn push_event(&mut self, event: ToolkitEvent) {
        self.events.push(event);
    }

    /// Drain the queued protocol-bound effects; called once per loop turn
    pub fn take_events(&mut self) -> Vec<ToolkitEvent> {
        std::mem::take(&mut self.events)
    }

    fn insert(&mut self, kind: ElementKind) -> ElementId {
        let id = ElementId::new();
        self.elements.insert(
            id,
            Element {
                id,
                parent: None,
                x: 0,
                y: 0,
                visible: true,
                node: None,
                kind,
            },
        );
        id
    }

    /// Create a detached container element
    pub fn create_container(&mut self) -> ElementId {
        self.insert(ElementKind::Container(Container::default()))
    }

    /// Create a detached rectangle element
    pub fn create_rect(&mut self, width: i32, height: i32, color: Color) -> ElementId {
        self.insert(ElementKind::Rect(RectElement {
            width,
            height,
            color,
        }))
    }

    /// Create a detached content element wrapping a client surface
    pub fn create_content(&mut self, surface: SurfaceId) -> ElementId {
        self.insert(ElementKind::Content(Content::new(surface)))
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    pub(super) fn container(&self, id: ElementId) -> Result<&Container, ToolkitError> {
        match self.elements.get(&id) {
            Some(Element {
                kind: ElementKind::Container(c),
                ..
            }) => Ok(c),
            Some(_) => Err(ToolkitError::NotAContainer),
            None => Err(ToolkitError::UnknownElement),
        }
    }

    pub(super) fn container_mut(&mut self, id: ElementId) -> Result<&mut Container, ToolkitError> {
        match self.elements.get_mut(&id) {
            Some(Element {
                kind: ElementKind::Container(c),
                ..
            }) => Ok(c),
            Some(_) => Err(ToolkitError::NotAContainer),
            None => Err(ToolkitError::UnknownElement),
        }
    }

    pub(super) fn content(&self, id: ElementId) -> Result<&Content, ToolkitError> {
        match self.elements.get(&id) {
            Some(Element {
                kind: ElementKind::Content(c),
                ..
            }) => Ok(c),
            Some(_) => Err(ToolkitError::NotAContent),
            None => Err(ToolkitError::UnknownElement),
        }
    }

    pub(super) fn content_mut(&mut self, id: ElementId) -> Result<&mut Content, ToolkitError> {
        match self.elements.get_mut(&id) {
            Some(Element {
                kind: ElementKind::Content(c),
                ..
            }) => Ok(c),
            Some(_) => Err(ToolkitError::NotAContent),
            None => Err(ToolkitError::UnknownElement),
        }
    }

    /// Attach a container as the tree root, realizing scene nodes for its
    /// whole subtree
    pub fn attach_root(&mut self, id: ElementId) -> Result<(), ToolkitError> {
        self.container(id)?;
        if self.elements.get(&id).and_then(|e| e.parent).is_some() {
            return Err(ToolkitError::AlreadyParented);
        }
        self.root = Some(id);
        let scene_root = self.scene.root();
        self.realize_nodes(id, scene_root);
        debug!("Attached root container {:?}", id);
        Ok(())
    }

    /// Add an element to a container, at the top of its z-order
    ///
    /// The element must not currently belong to any container.
    pub fn add_element(
        &mut self,
        container_id: ElementId,
        child_id: ElementId,
    ) -> Result<(), ToolkitError> {
        self.container(container_id)?;
        match self.elements.get(&child_id) {
            None => return Err(ToolkitError::UnknownElement),
            Some(child) if child.parent.is_some() => return Err(ToolkitError::AlreadyParented),
            Some(_) => {}
        }

        self.container_mut(container_id)?.children.insert(0, child_id);
        if let Some(child) = self.elements.get_mut(&child_id) {
            child.parent = Some(container_id);
        }

        if let Some(parent_node) = self.elements.get(&container_id).and_then(|e| e.node) {
            self.realize_nodes(child_id, parent_node);
        }
        self.update_layout(container_id);
        Ok(())
    }

    /// Remove an element from its container
    ///
    /// Any focus role the container holds for this element is cleared before
    /// the element is detached, so no dangling focus reference survives.
    pub fn remove_element(
        &mut self,
        container_id: ElementId,
        child_id: ElementId,
    ) -> Result<(), ToolkitError> {
        let container = self.container(container_id)?;
        if !container.children.contains(&child_id) {
            return Err(ToolkitError::NotAChild);
        }

        if container.pointer_focus == Some(child_id) {
            self.element_pointer_leave(child_id);
            self.container_mut(container_id)?.pointer_focus = None;
        }
        let container = self.container_mut(container_id)?;
        if container.button_focus == Some(child_id) {
            container.button_focus = None;
        }
        if container.keyboard_focus == Some(child_id) {
            container.keyboard_focus = None;
        }

        self.container_mut(container_id)?
            .children
            .retain(|&c| c != child_id);
        if let Some(child) = self.elements.get_mut(&child_id) {
            child.parent = None;
        }
        self.drop_nodes(child_id);
        self.update_layout(container_id);
        Ok(())
    }

    /// Destroy an element and, recursively, everything it contains
    pub fn destroy_element(&mut self, id: ElementId) {
        if let Some(parent) = self.elements.get(&id).and_then(|e| e.parent) {
            // remove_element clears focus roles and scene nodes
            let _ = self.remove_element(parent, id);
        } else {
            self.drop_nodes(id);
        }
        if self.root == Some(id) {
            self.root = None;
        }
        self.free_elements(id);
    }

    fn free_elements(&mut self, id: ElementId) {
        if let Some(element) = self.elements.remove(&id) {
            if let ElementKind::Container(container) = element.kind {
                for child in container.children {
                    self.free_elements(child);
                }
            }
        }
    }

    /// Show or hide an element
    pub fn set_visible(&mut self, id: ElementId, visible: bool) -> Result<(), ToolkitError> {
        let element = self.elements.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        if element.visible == visible {
            return Ok(());
        }
        element.visible = visible;
        let node = element.node;
        if let Some(node) = node {
            let _ = self.scene.set_enabled(node, visible);
        }
        // Visibility changes can move what sits under the cursor
        self.update_layout(id);
        Ok(())
    }

    /// Move an element relative to its container
    ///
    /// Position changes are driven by layout passes, which refresh pointer
    /// focus themselves afterwards; this does not re-enter the layout path.
    pub fn set_position(&mut self, id: ElementId, x: i32, y: i32) -> Result<(), ToolkitError> {
        let element = self.elements.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        element.x = x;
        element.y = y;
        if let Some(node) = element.node {
            let _ = self.scene.set_position(node, x, y);
        }
        Ok(())
    }

    /// An element's position relative to its container
    pub fn position(&self, id: ElementId) -> Option<(i32, i32)> {
        self.elements.get(&id).map(|e| (e.x, e.y))
    }

    /// An element's position in root coordinates
    pub fn absolute_position(&self, id: ElementId) -> Option<(i32, i32)> {
        let mut element = self.elements.get(&id)?;
        let (mut x, mut y) = (element.x, element.y);
        while let Some(parent) = element.parent {
            element = self.elements.get(&parent)?;
            x += element.x;
            y += element.y;
        }
        Some((x, y))
    }

    /// Move a child to the top of its container's z-order
    pub fn raise_to_top(
        &mut self,
        container_id: ElementId,
        child_id: ElementId,
    ) -> Result<(), ToolkitError> {
        let container = self.container_mut(container_id)?;
        let Some(pos) = container.children.iter().position(|&c| c == child_id) else {
            return Err(ToolkitError::NotAChild);
        };
        container.children.remove(pos);
        container.children.insert(0, child_id);
        if let Some(node) = self.elements.get(&child_id).and_then(|e| e.node) {
            let _ = self.scene.raise_to_top(node);
        }
        self.update_layout(container_id);
        Ok(())
    }

    /// Propagate a layout update from an element toward the root
    ///
    /// The default step is a no-op per container; once the chain reaches the
    /// attached root, pointer focus is re-derived, since layout changes can
    /// move content under the cursor.
    pub fn update_layout(&mut self, from: ElementId) {
        let mut current = Some(from);
        let mut last = from;
        while let Some(id) = current {
            last = id;
            current = self.elements.get(&id).and_then(|e| e.parent);
        }
        if self.root == Some(last) {
            self.refresh_pointer_focus();
        }
    }

    /// Resize a rectangle element
    pub fn set_rect_size(&mut self, id: ElementId, width: i32, height: i32) -> Result<(), ToolkitError> {
        let element = self.elements.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        let node = element.node;
        match &mut element.kind {
            ElementKind::Rect(rect) => {
                rect.width = width;
                rect.height = height;
            }
            _ => return Err(ToolkitError::NotARect),
        }
        if let Some(node) = node {
            let _ = self.scene.set_rect_size(node, width, height);
        }
        Ok(())
    }

    /// Recolor a rectangle element
    pub fn set_rect_color(&mut self, id: ElementId, color: Color) -> Result<(), ToolkitError> {
        let element = self.elements.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        let node = element.node;
        match &mut element.kind {
            ElementKind::Rect(rect) => rect.color = color,
            _ => return Err(ToolkitError::NotARect),
        }
        if let Some(node) = node {
            let _ = self.scene.set_rect_color(node, color);
        }
        Ok(())
    }

    /// Create scene nodes for an element subtree under the given parent node
    fn realize_nodes(&mut self, id: ElementId, parent_node: NodeId) {
        let Some(element) = self.elements.get(&id) else {
            return;
        };
        if element.node.is_some() {
            warn!("Element {:?} already has a scene node", id);
            return;
        }
        let (x, y, visible) = (element.x, element.y, element.visible);
        let created = match &element.kind {
            ElementKind::Container(_) => self.scene.create_tree(parent_node),
            ElementKind::Content(content) => {
                let surface = content.surface;
                self.scene.create_buffer(parent_node, surface)
            }
            ElementKind::Rect(rect) => {
                let (w, h, color) = (rect.width, rect.height, rect.color);
                self.scene.create_rect(parent_node, w, h, color)
            }
        };
        let node = match created {
            Ok(node) => node,
            Err(err) => {
                warn!("Scene node creation for {:?} failed: {}", id, err);
                return;
            }
        };
        let _ = self.scene.set_position(node, x, y);
        let _ = self.scene.set_enabled(node, visible);
        if let Some(element) = self.elements.get_mut(&id) {
            element.node = Some(node);
        }
        // Children realize back-to-front so the scene stacking matches
        if let Ok(container) = self.container(id) {
            let children: Vec<ElementId> = container.children.iter().rev().copied().collect();
            for child in children {
                self.realize_nodes(child, node);
            }
        }
    }

    /// Destroy the scene nodes of an element subtree
    fn drop_nodes(&mut self, id: ElementId) {
        let Some(node) = self.elements.get(&id).and_then(|e| e.node) else {
            return;
        };
        let _ = self.scene.destroy(node);
        self.clear_node_ids(id);
    }

    fn clear_node_ids(&mut self, id: ElementId) {
        let children = match self.elements.get_mut(&id) {
            Some(element) => {
                element.node = None;
                match &element.kind {
                    ElementKind::Container(c) => c.children.clone(),
                    _ => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        for child in children {
            self.clear_node_ids(child);
        }
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}
