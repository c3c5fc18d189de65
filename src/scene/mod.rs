//! Scene-node primitives
//!
//! The structural half of the rendering pipeline: an arena of nodes the
//! toolkit composes into a tree, which the rendering collaborator walks to
//! produce frames. This crate never touches pixels; it only maintains node
//! positions, z-order, and enabled state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::surface::SurfaceId;

/// Unique identifier for scene nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A solid color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// What a scene node represents
#[derive(Debug)]
pub enum NodeKind {
    /// Group node with ordered children (front of the list is topmost)
    Tree { children: Vec<NodeId> },
    /// Solid color rectangle
    Rect {
        width: i32,
        height: i32,
        color: Color,
    },
    /// A client surface's pixel buffer
    Buffer { surface: SurfaceId },
}

/// One node in the scene
#[derive(Debug)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Parent tree node; `None` only for the scene root
    pub parent: Option<NodeId>,
    /// Position relative to the parent
    pub x: i32,
    pub y: i32,
    /// Disabled nodes (and their subtrees) are skipped by the renderer
    pub enabled: bool,
    /// Node payload
    pub kind: NodeKind,
}

/// Errors from scene mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("Unknown scene node")]
    UnknownNode,
    #[error("Node is not a tree")]
    NotATree,
    #[error("Node is not a rectangle")]
    NotARect,
    #[error("The scene root cannot be moved or destroyed")]
    IsRoot,
}

/// The scene arena
///
/// Owns every node; the root tree node is created with the scene and lives
/// as long as it.
#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
}

impl Scene {
    /// Create an empty scene with a root tree node
    pub fn new() -> Self {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                parent: None,
                x: 0,
                y: 0,
                enabled: true,
                kind: NodeKind::Tree {
                    children: Vec::new(),
                },
            },
        );
        Self { nodes, root }
    }

    /// The root tree node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Number of live nodes, the root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, SceneError> {
        let id = NodeId::new();
        match self.nodes.get_mut(&parent) {
            Some(Node {
                kind: NodeKind::Tree { children },
                ..
            }) => children.insert(0, id),
            Some(_) => return Err(SceneError::NotATree),
            None => return Err(SceneError::UnknownNode),
        }
        self.nodes.insert(
            id,
            Node {
                id,
                parent: Some(parent),
                x: 0,
                y: 0,
                enabled: true,
                kind,
            },
        );
        trace!("Created scene node {:?} under {:?}", id, parent);
        Ok(id)
    }

    /// Create a tree (group) node at the top of the parent's stack
    pub fn create_tree(&mut self, parent: NodeId) -> Result<NodeId, SceneError> {
        self.insert(
            parent,
            NodeKind::Tree {
                children: Vec::new(),
            },
        )
    }

    /// Create a solid-color rectangle node
    pub fn create_rect(
        &mut self,
        parent: NodeId,
        width: i32,
        height: i32,
        color: Color,
    ) -> Result<NodeId, SceneError> {
        self.insert(
            parent,
            NodeKind::Rect {
                width,
                height,
                color,
            },
        )
    }

    /// Create a buffer node backed by a client surface
    pub fn create_buffer(&mut self, parent: NodeId, surface: SurfaceId) -> Result<NodeId, SceneError> {
        self.insert(parent, NodeKind::Buffer { surface })
    }

    /// Set a node's position relative to its parent
    pub fn set_position(&mut self, id: NodeId, x: i32, y: i32) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode)?;
        node.x = x;
        node.y = y;
        Ok(())
    }

    /// Enable or disable a node (and with it, its subtree)
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode)?;
        node.enabled = enabled;
        Ok(())
    }

    /// Resize a rectangle node
    pub fn set_rect_size(&mut self, id: NodeId, width: i32, height: i32) -> Result<(), SceneError> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Rect {
                    width: w,
                    height: h,
                    ..
                },
                ..
            }) => {
                *w = width;
                *h = height;
                Ok(())
            }
            Some(_) => Err(SceneError::NotARect),
            None => Err(SceneError::UnknownNode),
        }
    }

    /// Recolor a rectangle node
    pub fn set_rect_color(&mut self, id: NodeId, new: Color) -> Result<(), SceneError> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Rect { color, .. },
                ..
            }) => {
                *color = new;
                Ok(())
            }
            Some(_) => Err(SceneError::NotARect),
            None => Err(SceneError::UnknownNode),
        }
    }

    /// Children of a tree node, front (topmost) first
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], SceneError> {
        match self.nodes.get(&id) {
            Some(Node {
                kind: NodeKind::Tree { children },
                ..
            }) => Ok(children),
            Some(_) => Err(SceneError::NotATree),
            None => Err(SceneError::UnknownNode),
        }
    }

    /// Move a node to the front of its parent's stack
    pub fn raise_to_top(&mut self, id: NodeId) -> Result<(), SceneError> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or(SceneError::UnknownNode)?
            .parent
            .ok_or(SceneError::IsRoot)?;
        if let Some(Node {
            kind: NodeKind::Tree { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            if let Some(pos) = children.iter().position(|&c| c == id) {
                children.remove(pos);
                children.insert(0, id);
            }
        }
        Ok(())
    }

    /// Move a node under a different tree node, at the top of its stack
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        if !matches!(
            self.nodes.get(&new_parent).map(|n| &n.kind),
            Some(NodeKind::Tree { .. })
        ) {
            return match self.nodes.get(&new_parent) {
                Some(_) => Err(SceneError::NotATree),
                None => Err(SceneError::UnknownNode),
            };
        }
        let old_parent = self
            .nodes
            .get(&id)
            .ok_or(SceneError::UnknownNode)?
            .parent
            .ok_or(SceneError::IsRoot)?;
        self.unlink_child(old_parent, id);
        if let Some(Node {
            kind: NodeKind::Tree { children },
            ..
        }) = self.nodes.get_mut(&new_parent)
        {
            children.insert(0, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Destroy a node and its entire subtree
    ///
    /// The node is unlinked from its parent before any child is freed, so no
    /// caller can observe a dangling child id.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), SceneError> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or(SceneError::UnknownNode)?
            .parent
            .ok_or(SceneError::IsRoot)?;
        self.unlink_child(parent, id);
        self.free_subtree(id);
        Ok(())
    }

    fn unlink_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(Node {
            kind: NodeKind::Tree { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.retain(|&c| c != child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            trace!("Destroyed scene node {:?}", id);
            if let NodeKind::Tree { children } = node.kind {
                for child in children {
                    self.free_subtree(child);
                }
            }
        }
    }

    /// Position of a node in scene (root) coordinates
    pub fn absolute_position(&self, id: NodeId) -> Option<(i32, i32)> {
        let mut node = self.nodes.get(&id)?;
        let (mut x, mut y) = (node.x, node.y);
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
            x += node.x;
            y += node.y;
        }
        Some((x, y))
    }

    /// Whether every ancestor up to the root (and the node itself) is enabled
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            if !node.enabled {
                return false;
            }
            match node.parent {
                Some(parent) => current = self.nodes.get(&parent),
                None => return node.id == self.root,
            }
        }
        false
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_new_has_root() {
        let scene = Scene::new();
        assert_eq!(scene.len(), 1);
        assert!(scene.get(scene.root()).is_some());
    }

    #[test]
    fn test_create_orders_front() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_tree(root).unwrap();
        let b = scene.create_tree(root).unwrap();
        // Most recently created is topmost
        assert_eq!(scene.children(root).unwrap(), &[b, a]);
    }

    #[test]
    fn test_create_under_leaf_fails() {
        let mut scene = Scene::new();
        let root = scene.root();
        let rect = scene.create_rect(root, 10, 10, Color::default()).unwrap();
        assert_eq!(scene.create_tree(rect), Err(SceneError::NotATree));
    }

    #[test]
    fn test_destroy_subtree() {
        let mut scene = Scene::new();
        let root = scene.root();
        let tree = scene.create_tree(root).unwrap();
        let rect = scene.create_rect(tree, 1, 1, Color::default()).unwrap();
        scene.destroy(tree).unwrap();
        assert!(scene.get(tree).is_none());
        assert!(scene.get(rect).is_none());
        assert!(scene.children(root).unwrap().is_empty());
    }

    #[test]
    fn test_destroy_root_rejected() {
        let mut scene = Scene::new();
        let root = scene.root();
        assert_eq!(scene.destroy(root), Err(SceneError::IsRoot));
    }

    #[test]
    fn test_raise_to_top() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_tree(root).unwrap();
        let b = scene.create_tree(root).unwrap();
        scene.raise_to_top(a).unwrap();
        assert_eq!(scene.children(root).unwrap(), &[a, b]);
    }

    #[test]
    fn test_absolute_position() {
        let mut scene = Scene::new();
        let root = scene.root();
        let tree = scene.create_tree(root).unwrap();
        scene.set_position(tree, 10, 20).unwrap();
        let rect = scene.create_rect(tree, 5, 5, Color::default()).unwrap();
        scene.set_position(rect, 3, 4).unwrap();
        assert_eq!(scene.absolute_position(rect), Some((13, 24)));
    }

    #[test]
    fn test_visibility_follows_ancestors() {
        let mut scene = Scene::new();
        let root = scene.root();
        let tree = scene.create_tree(root).unwrap();
        let rect = scene.create_rect(tree, 5, 5, Color::default()).unwrap();
        assert!(scene.is_visible(rect));
        scene.set_enabled(tree, false).unwrap();
        assert!(!scene.is_visible(rect));
    }

    #[test]
    fn test_reparent() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_tree(root).unwrap();
        let b = scene.create_tree(root).unwrap();
        let rect = scene.create_rect(a, 1, 1, Color::default()).unwrap();
        scene.reparent(rect, b).unwrap();
        assert!(scene.children(a).unwrap().is_empty());
        assert_eq!(scene.children(b).unwrap(), &[rect]);
        assert_eq!(scene.get(rect).unwrap().parent, Some(b));
    }
}
