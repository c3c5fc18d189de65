//! Containers: ordered element collections with focus routing
//!
//! A container stacks child elements (front of the list is topmost for both
//! hit-testing and rendering) and tracks at most one child each for pointer
//! focus, left-button focus, and keyboard focus. Pointer focus follows the
//! hit test; button focus pins the pointer-focused child between button-down
//! and the matching button-up; keyboard focus only moves on explicit calls.

use super::element::{ElementId, ElementKind, ElementTree, ToolkitError};
use super::ToolkitEvent;

/// Container payload: child stacking plus the three focus roles
///
/// Every focus role, when set, refers to a member of `children`; removal of
/// a child clears any role pointing at it before the child detaches.
#[derive(Debug, Default)]
pub struct Container {
    pub(super) children: Vec<ElementId>,
    pub(super) pointer_focus: Option<ElementId>,
    pub(super) button_focus: Option<ElementId>,
    pub(super) keyboard_focus: Option<ElementId>,
}

impl Container {
    /// Children, front (topmost) first
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn pointer_focus(&self) -> Option<ElementId> {
        self.pointer_focus
    }

    pub fn button_focus(&self) -> Option<ElementId> {
        self.button_focus
    }

    pub fn keyboard_focus(&self) -> Option<ElementId> {
        self.keyboard_focus
    }
}

impl ElementTree {
    /// Feed a pointer position (root coordinates) into the tree
    ///
    /// Re-derives the pointer-focus chain from the root down and emits
    /// enter/leave/motion events for the contents crossed. Returns whether
    /// any element lies under the pointer.
    pub fn pointer_motion(&mut self, x: f64, y: f64) -> bool {
        self.pointer_pos = Some((x, y));
        let Some(root) = self.root() else {
            return false;
        };
        let Some((rx, ry)) = self.position(root) else {
            return false;
        };
        self.update_container_pointer(root, x - rx as f64, y - ry as f64)
    }

    /// Re-run the hit test at the last-known pointer position
    pub fn refresh_pointer_focus(&mut self) {
        if let Some((x, y)) = self.pointer_pos {
            let _ = self.pointer_motion(x, y);
        }
    }

    /// Re-derive one container's pointer focus at the last-known pointer
    /// coordinate
    pub fn update_pointer_focus(&mut self, container_id: ElementId) -> Result<(), ToolkitError> {
        self.container(container_id)?;
        let Some((px, py)) = self.pointer_pos else {
            return Ok(());
        };
        let Some((ax, ay)) = self.absolute_position(container_id) else {
            return Ok(());
        };
        self.update_container_pointer(container_id, px - ax as f64, py - ay as f64);
        Ok(())
    }

    /// Deliver a button event along the focus chain
    ///
    /// Press pins button focus to the current pointer-focus chain; release
    /// is delivered to the pinned chain and unpins it, even if the pointer
    /// has moved away in between.
    pub fn pointer_button(&mut self, button: u32, pressed: bool) -> bool {
        let Some(root) = self.root() else {
            return false;
        };
        let mut current = root;
        loop {
            let (next, is_press_chain) = {
                let Ok(container) = self.container(current) else {
                    break;
                };
                if pressed {
                    (container.pointer_focus, true)
                } else {
                    (container.button_focus, false)
                }
            };
            if is_press_chain {
                if let Ok(container) = self.container_mut(current) {
                    container.button_focus = next;
                }
            } else if let Ok(container) = self.container_mut(current) {
                container.button_focus = None;
            }
            let Some(next) = next else {
                return false;
            };
            match self.get(next).map(|e| &e.kind) {
                Some(ElementKind::Container(_)) => current = next,
                Some(ElementKind::Content(content)) => {
                    let surface = content.surface;
                    self.push_event(ToolkitEvent::PointerButton {
                        surface,
                        button,
                        pressed,
                    });
                    return true;
                }
                Some(ElementKind::Rect(_)) => {
                    self.push_event(ToolkitEvent::ElementClicked {
                        element: next,
                        button,
                        pressed,
                    });
                    return true;
                }
                None => return false,
            }
        }
        false
    }

    /// Set a container's keyboard focus to one of its children (or clear it)
    pub fn update_keyboard_focus(
        &mut self,
        container_id: ElementId,
        child: Option<ElementId>,
    ) -> Result<(), ToolkitError> {
        if let Some(child) = child {
            if !self.container(container_id)?.children.contains(&child) {
                return Err(ToolkitError::NotAChild);
            }
        }
        self.container_mut(container_id)?.keyboard_focus = child;
        Ok(())
    }

    /// Point the keyboard-focus chain from the root at a leaf element
    ///
    /// Every container along the leaf's ownership chain gets its keyboard
    /// focus set to the next link; fails if the leaf is not attached under
    /// the root.
    pub fn set_keyboard_focus_path(&mut self, leaf: ElementId) -> Result<(), ToolkitError> {
        let root = self.root().ok_or(ToolkitError::NoRoot)?;
        let mut path = vec![leaf];
        let mut current = leaf;
        while let Some(parent) = self.get(current).and_then(|e| e.parent) {
            path.push(parent);
            current = parent;
        }
        if current != root {
            return Err(ToolkitError::NotAChild);
        }
        for pair in path.windows(2).rev() {
            let (child, parent) = (pair[0], pair[1]);
            self.container_mut(parent)?.keyboard_focus = Some(child);
        }
        Ok(())
    }

    /// Clear the keyboard-focus chain from the root down
    pub fn clear_keyboard_focus(&mut self) {
        let Some(root) = self.root() else {
            return;
        };
        let mut current = Some(root);
        while let Some(id) = current {
            let next = match self.container_mut(id) {
                Ok(container) => container.keyboard_focus.take(),
                Err(_) => None,
            };
            current = next;
        }
    }

    /// Follow the keyboard-focus chain to its leaf element
    pub fn keyboard_focus_leaf(&self) -> Option<ElementId> {
        let mut current = self.root()?;
        loop {
            match self.container(current) {
                Ok(container) => match container.keyboard_focus {
                    Some(next) => current = next,
                    None => return None,
                },
                // Reached a non-container: that is the leaf
                Err(_) => return Some(current),
            }
        }
    }

    pub(super) fn update_container_pointer(
        &mut self,
        container_id: ElementId,
        x: f64,
        y: f64,
    ) -> bool {
        let hit = self.hit_child(container_id, x, y);
        let prev = match self.container(container_id) {
            Ok(container) => container.pointer_focus,
            Err(_) => return false,
        };
        if prev != hit {
            if let Some(old) = prev {
                self.element_pointer_leave(old);
            }
            if let Ok(container) = self.container_mut(container_id) {
                container.pointer_focus = hit;
            }
        }
        let Some(hit_id) = hit else {
            return false;
        };
        let Some((cx, cy)) = self.position(hit_id) else {
            return false;
        };
        let (rx, ry) = (x - cx as f64, y - cy as f64);
        if prev != hit {
            self.element_pointer_enter(hit_id, rx, ry);
        } else {
            self.element_pointer_motion(hit_id, rx, ry);
        }
        true
    }

    /// Topmost visible child containing the point, if any
    fn hit_child(&self, container_id: ElementId, x: f64, y: f64) -> Option<ElementId> {
        let container = self.container(container_id).ok()?;
        for &child in &container.children {
            let Some(element) = self.get(child) else {
                continue;
            };
            if !element.visible {
                continue;
            }
            let (cx, cy) = (x - element.x as f64, y - element.y as f64);
            if self.hits(child, cx, cy) {
                return Some(child);
            }
        }
        None
    }

    /// Whether a point (element-relative) lands on the element
    fn hits(&self, id: ElementId, x: f64, y: f64) -> bool {
        let Some(element) = self.get(id) else {
            return false;
        };
        match &element.kind {
            ElementKind::Container(_) => self.hit_child(id, x, y).is_some(),
            ElementKind::Content(content) => {
                let (w, h) = content.committed_size();
                x >= 0.0 && y >= 0.0 && x < w as f64 && y < h as f64
            }
            ElementKind::Rect(rect) => {
                x >= 0.0 && y >= 0.0 && x < rect.width as f64 && y < rect.height as f64
            }
        }
    }

    fn element_pointer_enter(&mut self, id: ElementId, x: f64, y: f64) {
        match self.get(id).map(|e| &e.kind) {
            Some(ElementKind::Container(_)) => {
                self.update_container_pointer(id, x, y);
            }
            Some(ElementKind::Content(content)) => {
                let surface = content.surface;
                self.push_event(ToolkitEvent::PointerEnter { surface, x, y });
            }
            _ => {}
        }
    }

    fn element_pointer_motion(&mut self, id: ElementId, x: f64, y: f64) {
        match self.get(id).map(|e| &e.kind) {
            Some(ElementKind::Container(_)) => {
                self.update_container_pointer(id, x, y);
            }
            Some(ElementKind::Content(content)) => {
                let surface = content.surface;
                self.push_event(ToolkitEvent::PointerMotion { surface, x, y });
            }
            _ => {}
        }
    }

    pub(super) fn element_pointer_leave(&mut self, id: ElementId) {
        match self.get(id).map(|e| &e.kind) {
            Some(ElementKind::Container(_)) => {
                let inner = match self.container_mut(id) {
                    Ok(container) => container.pointer_focus.take(),
                    Err(_) => None,
                };
                if let Some(inner) = inner {
                    self.element_pointer_leave(inner);
                }
            }
            Some(ElementKind::Content(content)) => {
                let surface = content.surface;
                self.push_event(ToolkitEvent::PointerLeave { surface });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::surface::SurfaceId;

    use super::super::element::ElementTree;
    use super::super::ToolkitEvent;

    fn tree_with_root() -> (ElementTree, crate::toolkit::ElementId) {
        let mut tree = ElementTree::new();
        let root = tree.create_container();
        tree.attach_root(root).unwrap();
        (tree, root)
    }

    #[test]
    fn test_pointer_enter_and_leave() {
        let (mut tree, root) = tree_with_root();
        let surface = SurfaceId(1);
        let content = tree.create_content(surface);
        tree.add_element(root, content).unwrap();
        tree.content_commit(content, None, Some((100, 100))).unwrap();

        assert!(tree.pointer_motion(50.0, 50.0));
        assert!(!tree.pointer_motion(150.0, 150.0));

        let events = tree.take_events();
        assert!(events.contains(&ToolkitEvent::PointerEnter {
            surface,
            x: 50.0,
            y: 50.0
        }));
        assert!(events.contains(&ToolkitEvent::PointerLeave { surface }));
    }

    #[test]
    fn test_topmost_child_wins_hit_test() {
        let (mut tree, root) = tree_with_root();
        let below = tree.create_content(SurfaceId(1));
        let above = tree.create_content(SurfaceId(2));
        tree.add_element(root, below).unwrap();
        tree.add_element(root, above).unwrap();
        tree.content_commit(below, None, Some((100, 100))).unwrap();
        tree.content_commit(above, None, Some((100, 100))).unwrap();

        tree.pointer_motion(10.0, 10.0);
        assert_eq!(tree.container(root).unwrap().pointer_focus(), Some(above));
    }

    #[test]
    fn test_invisible_elements_do_not_hit() {
        let (mut tree, root) = tree_with_root();
        let content = tree.create_content(SurfaceId(1));
        tree.add_element(root, content).unwrap();
        tree.content_commit(content, None, Some((100, 100))).unwrap();
        tree.set_visible(content, false).unwrap();

        assert!(!tree.pointer_motion(10.0, 10.0));
        assert_eq!(tree.container(root).unwrap().pointer_focus(), None);
    }

    #[test]
    fn test_button_focus_pins_until_release() {
        let (mut tree, root) = tree_with_root();
        let a = tree.create_content(SurfaceId(1));
        let b = tree.create_content(SurfaceId(2));
        tree.add_element(root, a).unwrap();
        tree.content_commit(a, None, Some((100, 100))).unwrap();
        tree.add_element(root, b).unwrap();
        tree.content_commit(b, None, Some((100, 100))).unwrap();
        tree.set_position(a, 0, 0).unwrap();
        tree.set_position(b, 200, 0).unwrap();

        tree.pointer_motion(10.0, 10.0);
        assert!(tree.pointer_button(0x110, true));
        assert_eq!(tree.container(root).unwrap().button_focus(), Some(a));

        // Pointer wanders off to the other content before releasing
        tree.pointer_motion(210.0, 10.0);
        assert!(tree.pointer_button(0x110, false));
        assert_eq!(tree.container(root).unwrap().button_focus(), None);

        let events = tree.take_events();
        let releases: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ToolkitEvent::PointerButton {
                        surface: SurfaceId(1),
                        pressed: false,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(releases.len(), 1);
    }

    #[test]
    fn test_nested_container_focus_chain() {
        let (mut tree, root) = tree_with_root();
        let inner = tree.create_container();
        let content = tree.create_content(SurfaceId(1));
        tree.add_element(root, inner).unwrap();
        tree.add_element(inner, content).unwrap();
        tree.content_commit(content, None, Some((50, 50))).unwrap();
        tree.set_position(inner, 100, 100).unwrap();

        tree.pointer_motion(120.0, 120.0);
        assert_eq!(tree.container(root).unwrap().pointer_focus(), Some(inner));
        assert_eq!(tree.container(inner).unwrap().pointer_focus(), Some(content));

        let events = tree.take_events();
        assert!(events.contains(&ToolkitEvent::PointerEnter {
            surface: SurfaceId(1),
            x: 20.0,
            y: 20.0
        }));
    }

    #[test]
    fn test_removal_clears_focus_roles() {
        let (mut tree, root) = tree_with_root();
        let content = tree.create_content(SurfaceId(1));
        tree.add_element(root, content).unwrap();
        tree.content_commit(content, None, Some((100, 100))).unwrap();

        tree.pointer_motion(10.0, 10.0);
        tree.pointer_button(0x110, true);
        tree.update_keyboard_focus(root, Some(content)).unwrap();

        tree.remove_element(root, content).unwrap();
        let container = tree.container(root).unwrap();
        assert_eq!(container.pointer_focus(), None);
        assert_eq!(container.button_focus(), None);
        assert_eq!(container.keyboard_focus(), None);
        // The leave was delivered before detachment
        assert!(tree
            .take_events()
            .contains(&ToolkitEvent::PointerLeave {
                surface: SurfaceId(1)
            }));
    }

    #[test]
    fn test_keyboard_focus_requires_membership() {
        let (mut tree, root) = tree_with_root();
        let stranger = tree.create_content(SurfaceId(1));
        assert!(tree.update_keyboard_focus(root, Some(stranger)).is_err());
    }

    #[test]
    fn test_keyboard_focus_path_and_leaf() {
        let (mut tree, root) = tree_with_root();
        let inner = tree.create_container();
        let content = tree.create_content(SurfaceId(1));
        tree.add_element(root, inner).unwrap();
        tree.add_element(inner, content).unwrap();

        tree.set_keyboard_focus_path(content).unwrap();
        assert_eq!(tree.keyboard_focus_leaf(), Some(content));

        tree.clear_keyboard_focus();
        assert_eq!(tree.keyboard_focus_leaf(), None);
    }

    #[test]
    fn test_layout_update_refreshes_pointer_focus() {
        let (mut tree, root) = tree_with_root();
        let content = tree.create_content(SurfaceId(1));
        tree.add_element(root, content).unwrap();
        tree.content_commit(content, None, Some((50, 50))).unwrap();

        tree.pointer_motion(25.0, 25.0);
        tree.take_events();

        // Content slides out from under the cursor; a layout pass notices
        tree.set_position(content, 500, 500).unwrap();
        tree.update_layout(content);
        assert_eq!(tree.container(root).unwrap().pointer_focus(), None);
        assert!(tree
            .take_events()
            .contains(&ToolkitEvent::PointerLeave {
                surface: SurfaceId(1)
            }));
    }
}
