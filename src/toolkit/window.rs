//! Windows: decoration + content composed into one interactive unit
//!
//! A window owns a container element holding its content and, when
//! decorated, a title bar rectangle. Maximize and fullscreen are
//! negotiated: the request issues a sized configure and remembers the
//! intended mode under that serial; only when the client acknowledges it
//! does the window swap its geometry. The two modes are mutually
//! exclusive — entering either clears the other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use log::debug;

use crate::geometry::Rect;
use crate::scene::Color;
use crate::surface::SurfaceId;

use super::content::Serial;
use super::element::{ElementId, ElementTree, ToolkitError};
use super::ToolkitEvent;

/// Unique identifier for windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl WindowId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        WindowId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

bitflags! {
    /// Edges involved in an interactive resize
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResizeEdges: u32 {
        const TOP = 0b0001;
        const BOTTOM = 0b0010;
        const LEFT = 0b0100;
        const RIGHT = 0b1000;
    }
}

bitflags! {
    /// Workspace edges a view is pinned against during arrangement
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Anchors: u32 {
        const TOP = 0b0001;
        const BOTTOM = 0b0010;
        const LEFT = 0b0100;
        const RIGHT = 0b1000;
    }
}

/// Decoration styling, populated from the style section of the config
#[derive(Debug, Clone, Copy)]
pub struct WindowStyle {
    /// Title bar height in pixels; zero disables decorations entirely
    pub titlebar_height: i32,
    pub titlebar_active: Color,
    pub titlebar_inactive: Color,
}

impl Default for WindowStyle {
    fn default() -> Self {
        Self {
            titlebar_height: 24,
            titlebar_active: Color::rgba(0x36, 0x36, 0x36, 0xff),
            titlebar_inactive: Color::rgba(0x60, 0x60, 0x60, 0xff),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingMode {
    serial: Serial,
    maximized: bool,
    fullscreen: bool,
    geometry: Rect,
}

/// How a committed mode change altered the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub maximized: bool,
    pub fullscreen: bool,
    pub entered_fullscreen: bool,
    pub left_fullscreen: bool,
}

/// One window
#[derive(Debug)]
pub struct Window {
    /// Unique identifier
    pub id: WindowId,
    /// The client surface shown as the window's content
    pub surface: SurfaceId,
    /// The window's own container element
    pub container: ElementId,
    /// The content element inside the container
    pub content: ElementId,
    /// Title bar rectangle, absent for undecorated windows
    pub titlebar: Option<ElementId>,
    /// Window title
    pub title: String,
    /// Application id, as reported by the client
    pub app_id: Option<String>,
    /// Edges this view is pinned to during workspace arrangement
    pub anchors: Anchors,
    maximized: bool,
    fullscreen: bool,
    activated: bool,
    saved_geometry: Option<Rect>,
    pending_mode: Option<PendingMode>,
}

impl Window {
    pub fn maximized(&self) -> bool {
        self.maximized
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn activated(&self) -> bool {
        self.activated
    }
}

/// Manager for all windows
#[derive(Debug)]
pub struct WindowManager {
    windows: HashMap<WindowId, Window>,
    surface_to_window: HashMap<SurfaceId, WindowId>,
    decorations: HashMap<ElementId, WindowId>,
    style: WindowStyle,
}

impl WindowManager {
    pub fn new(style: WindowStyle) -> Self {
        Self {
            windows: HashMap::new(),
            surface_to_window: HashMap::new(),
            decorations: HashMap::new(),
            style,
        }
    }

    pub fn style(&self) -> WindowStyle {
        self.style
    }

    /// Create a window around a client surface
    ///
    /// Builds container, content, and (when decorated) title bar; any
    /// mid-construction failure releases what was built, in reverse order —
    /// a window never exists without its content.
    pub fn create_window(
        &mut self,
        tree: &mut ElementTree,
        surface: SurfaceId,
        decorated: bool,
    ) -> Result<WindowId, ToolkitError> {
        let container = tree.create_container();
        let content = tree.create_content(surface);
        if let Err(err) = tree.add_element(container, content) {
            tree.destroy_element(content);
            tree.destroy_element(container);
            return Err(err);
        }

        let titlebar = if decorated && self.style.titlebar_height > 0 {
            let bar = tree.create_rect(0, self.style.titlebar_height, self.style.titlebar_inactive);
            if let Err(err) = tree.add_element(container, bar) {
                tree.destroy_element(bar);
                tree.destroy_element(container);
                return Err(err);
            }
            if let Err(err) = tree.set_position(content, 0, self.style.titlebar_height) {
                tree.destroy_element(container);
                return Err(err);
            }
            Some(bar)
        } else {
            None
        };

        let id = WindowId::new();
        if let Ok(c) = tree.content_mut(content) {
            c.window = Some(id);
        }
        if let Some(bar) = titlebar {
            self.decorations.insert(bar, id);
        }
        self.surface_to_window.insert(surface, id);
        self.windows.insert(
            id,
            Window {
                id,
                surface,
                container,
                content,
                titlebar,
                title: String::new(),
                app_id: None,
                anchors: Anchors::empty(),
                maximized: false,
                fullscreen: false,
                activated: false,
                saved_geometry: None,
                pending_mode: None,
            },
        );
        debug!("Created window {:?} for surface {:?}", id, surface);
        Ok(id)
    }

    /// Destroy a window and its elements
    ///
    /// The caller is responsible for removing the window from its workspace
    /// first.
    pub fn destroy_window(&mut self, tree: &mut ElementTree, id: WindowId) -> Option<Window> {
        let window = self.windows.remove(&id)?;
        self.surface_to_window.remove(&window.surface);
        if let Some(bar) = window.titlebar {
            self.decorations.remove(&bar);
        }
        tree.destroy_element(window.container);
        debug!("Destroyed window {:?}", id);
        Some(window)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    /// The window owning a surface, if any
    pub fn window_for_surface(&self, surface: SurfaceId) -> Option<WindowId> {
        self.surface_to_window.get(&surface).copied()
    }

    /// The window owning a decoration element, if any
    pub fn window_for_decoration(&self, element: ElementId) -> Option<WindowId> {
        self.decorations.get(&element).copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Outer size: content plus visible decoration
    pub fn window_size(&self, tree: &ElementTree, id: WindowId) -> (i32, i32) {
        let Some(window) = self.windows.get(&id) else {
            return (0, 0);
        };
        let (w, h) = tree
            .content_size_of(window.content)
            .unwrap_or((0, 0));
        let bar = match window.titlebar {
            Some(bar) if tree.get(bar).map(|e| e.visible).unwrap_or(false) => {
                self.style.titlebar_height
            }
            _ => 0,
        };
        (w, h + bar)
    }

    /// Outer geometry: position plus size
    pub fn geometry(&self, tree: &ElementTree, id: WindowId) -> Rect {
        let (w, h) = self.window_size(tree, id);
        let (x, y) = self
            .windows
            .get(&id)
            .and_then(|win| tree.position(win.container))
            .unwrap_or((0, 0));
        Rect::new(x, y, w, h)
    }

    /// Move a window within its workspace layer
    pub fn set_position(
        &self,
        tree: &mut ElementTree,
        id: WindowId,
        x: i32,
        y: i32,
    ) -> Result<(), ToolkitError> {
        let window = self.windows.get(&id).ok_or(ToolkitError::UnknownElement)?;
        tree.set_position(window.container, x, y)
    }

    /// Re-derive decoration layout from the content's committed size
    pub fn relayout(&self, tree: &mut ElementTree, id: WindowId) {
        let Some(window) = self.windows.get(&id) else {
            return;
        };
        let (w, _) = tree.content_size_of(window.content).unwrap_or((0, 0));
        if let Some(bar) = window.titlebar {
            let _ = tree.set_rect_size(bar, w, self.style.titlebar_height);
        }
        tree.update_layout(window.container);
    }

    pub fn set_title(&mut self, id: WindowId, title: String) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.title = title;
        }
    }

    pub fn set_app_id(&mut self, id: WindowId, app_id: String) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.app_id = Some(app_id);
        }
    }

    /// Activate or deactivate a window: client notification plus decoration
    /// feedback
    pub fn set_activated(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        activated: bool,
    ) -> Result<(), ToolkitError> {
        let window = self.windows.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        window.activated = activated;
        let (content, titlebar) = (window.content, window.titlebar);
        tree.content_set_activated(content, activated)?;
        if let Some(bar) = titlebar {
            let color = if activated {
                self.style.titlebar_active
            } else {
                self.style.titlebar_inactive
            };
            let _ = tree.set_rect_color(bar, color);
        }
        Ok(())
    }

    /// Begin an interactive move grab
    pub fn request_move(&self, tree: &mut ElementTree, id: WindowId) {
        if self.windows.contains_key(&id) {
            tree.push_event(ToolkitEvent::InteractiveMove { window: id });
        }
    }

    /// Begin an interactive resize grab along the given edges
    pub fn request_resize(&self, tree: &mut ElementTree, id: WindowId, edges: ResizeEdges) {
        if self.windows.contains_key(&id) {
            tree.push_event(ToolkitEvent::InteractiveResize { window: id, edges });
        }
    }

    /// Ask the client to close the window
    pub fn request_close(&self, tree: &mut ElementTree, id: WindowId) -> Result<(), ToolkitError> {
        let window = self.windows.get(&id).ok_or(ToolkitError::UnknownElement)?;
        tree.content_request_close(window.content)
    }

    /// Request the maximized state; `usable` is the workspace area a
    /// maximized window may cover
    ///
    /// No-op when the window is already in the requested state. The change
    /// only takes effect once the client acknowledges the matching
    /// configure — see [`WindowManager::commit_mode`].
    pub fn request_maximized(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        maximized: bool,
        usable: Rect,
    ) -> Result<(), ToolkitError> {
        let current = self.geometry(tree, id);
        let window = self.windows.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        if window.maximized == maximized {
            return Ok(());
        }
        let target = if maximized {
            usable
        } else {
            window.saved_geometry.unwrap_or(current)
        };
        let bar = if window.titlebar.is_some() {
            self.style.titlebar_height
        } else {
            0
        };
        let content = window.content;
        let serial =
            tree.content_request_size(content, target.width, (target.height - bar).max(1))?;
        let window = self.windows.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        window.pending_mode = Some(PendingMode {
            serial,
            maximized,
            fullscreen: false,
            geometry: target,
        });
        Ok(())
    }

    /// Request the fullscreen state; `extents` is the full output area
    pub fn request_fullscreen(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        fullscreen: bool,
        extents: Rect,
    ) -> Result<(), ToolkitError> {
        let current = self.geometry(tree, id);
        let window = self.windows.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        if window.fullscreen == fullscreen {
            return Ok(());
        }
        let target = if fullscreen {
            extents
        } else {
            window.saved_geometry.unwrap_or(current)
        };
        let content = window.content;
        let serial = tree.content_request_size(content, target.width, target.height)?;
        let window = self.windows.get_mut(&id).ok_or(ToolkitError::UnknownElement)?;
        window.pending_mode = Some(PendingMode {
            serial,
            maximized: false,
            fullscreen,
            geometry: target,
        });
        Ok(())
    }

    /// Commit callback for an acknowledged maximize change
    ///
    /// Called once the client acknowledged the maximize (or restore)
    /// configure; swaps geometry and the saved-geometry snapshot.
    pub fn commit_maximized(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        serial: Serial,
    ) -> Option<ModeChange> {
        self.commit_mode(tree, id, serial)
    }

    /// Commit callback for an acknowledged fullscreen change
    pub fn commit_fullscreen(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        serial: Serial,
    ) -> Option<ModeChange> {
        self.commit_mode(tree, id, serial)
    }

    /// Apply a mode change whose configure the client acknowledged
    ///
    /// Returns the resulting change when `serial` matches the pending mode;
    /// stale serials leave everything untouched.
    pub fn commit_mode(
        &mut self,
        tree: &mut ElementTree,
        id: WindowId,
        serial: Serial,
    ) -> Option<ModeChange> {
        let current_geometry = {
            let window = self.windows.get(&id)?;
            self.geometry_of(tree, window)
        };
        let window = self.windows.get_mut(&id)?;
        let pending = window.pending_mode?;
        if pending.serial != serial {
            return None;
        }
        window.pending_mode = None;

        let was_fullscreen = window.fullscreen;
        let was_normal = !window.maximized && !window.fullscreen;
        if was_normal && (pending.maximized || pending.fullscreen) {
            window.saved_geometry = Some(current_geometry);
        }
        window.maximized = pending.maximized;
        window.fullscreen = pending.fullscreen;
        if !window.maximized && !window.fullscreen {
            window.saved_geometry = None;
        }

        let (container, titlebar, content, fullscreen) = (
            window.container,
            window.titlebar,
            window.content,
            window.fullscreen,
        );
        let _ = tree.set_position(container, pending.geometry.x, pending.geometry.y);
        if let Some(bar) = titlebar {
            let _ = tree.set_visible(bar, !fullscreen);
            let offset = if fullscreen { 0 } else { self.style.titlebar_height };
            let _ = tree.set_position(content, 0, offset);
        }
        self.relayout(tree, id);

        let window = self.windows.get(&id)?;
        debug!(
            "Window {:?} committed mode: maximized={} fullscreen={}",
            id, window.maximized, window.fullscreen
        );
        Some(ModeChange {
            maximized: window.maximized,
            fullscreen: window.fullscreen,
            entered_fullscreen: window.fullscreen && !was_fullscreen,
            left_fullscreen: was_fullscreen && !window.fullscreen,
        })
    }

    fn geometry_of(&self, tree: &ElementTree, window: &Window) -> Rect {
        let (w, h) = {
            let (cw, ch) = tree.content_size_of(window.content).unwrap_or((0, 0));
            let bar = match window.titlebar {
                Some(bar) if tree.get(bar).map(|e| e.visible).unwrap_or(false) => {
                    self.style.titlebar_height
                }
                _ => 0,
            };
            (cw, ch + bar)
        };
        let (x, y) = tree.position(window.container).unwrap_or((0, 0));
        Rect::new(x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::Rect;
    use crate::surface::SurfaceId;
    use crate::toolkit::{ElementTree, ToolkitEvent, WindowStyle};

    use super::WindowManager;

    fn setup() -> (ElementTree, WindowManager, crate::toolkit::ElementId) {
        let mut tree = ElementTree::new();
        let root = tree.create_container();
        tree.attach_root(root).unwrap();
        (tree, WindowManager::new(WindowStyle::default()), root)
    }

    #[test]
    fn test_create_decorated_window() {
        let (mut tree, mut windows, root) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        let window = windows.get(id).unwrap();
        assert!(window.titlebar.is_some());
        tree.add_element(root, window.container).unwrap();
        // Content sits below the title bar
        assert_eq!(tree.position(window.content), Some((0, 24)));
        assert_eq!(windows.window_for_surface(SurfaceId(1)), Some(id));
    }

    #[test]
    fn test_undecorated_window_has_no_titlebar() {
        let (mut tree, mut windows, _) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), false)
            .unwrap();
        assert!(windows.get(id).unwrap().titlebar.is_none());
        assert_eq!(tree.position(windows.get(id).unwrap().content), Some((0, 0)));
    }

    #[test]
    fn test_window_size_includes_decoration() {
        let (mut tree, mut windows, _) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        let content = windows.get(id).unwrap().content;
        tree.content_commit(content, None, Some((400, 300))).unwrap();
        assert_eq!(windows.window_size(&tree, id), (400, 324));
    }

    #[test]
    fn test_maximize_roundtrip_restores_geometry() {
        let (mut tree, mut windows, root) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        let container = windows.get(id).unwrap().container;
        let content = windows.get(id).unwrap().content;
        tree.add_element(root, container).unwrap();
        tree.content_commit(content, None, Some((400, 300))).unwrap();
        windows.set_position(&mut tree, id, 50, 60).unwrap();

        let usable = Rect::new(0, 0, 1920, 1080);
        windows
            .request_maximized(&mut tree, id, true, usable)
            .unwrap();
        // Not yet applied — awaiting the client's acknowledgement
        assert!(!windows.get(id).unwrap().maximized());

        let serial = match tree.take_events().as_slice() {
            [ToolkitEvent::Configure { serial, width, height, .. }] => {
                assert_eq!((*width, *height), (1920, 1056));
                *serial
            }
            other => panic!("expected a configure event, got {:?}", other),
        };
        tree.content_commit(content, Some(serial), Some((1920, 1056)))
            .unwrap();
        let change = windows.commit_mode(&mut tree, id, serial).unwrap();
        assert!(change.maximized);
        assert!(windows.get(id).unwrap().maximized());
        assert_eq!(tree.position(container), Some((0, 0)));

        // And back
        windows
            .request_maximized(&mut tree, id, false, usable)
            .unwrap();
        let serial = match tree.take_events().as_slice() {
            [ToolkitEvent::Configure { serial, width, height, .. }] => {
                assert_eq!((*width, *height), (400, 300));
                *serial
            }
            other => panic!("expected a configure event, got {:?}", other),
        };
        tree.content_commit(content, Some(serial), Some((400, 300)))
            .unwrap();
        let change = windows.commit_mode(&mut tree, id, serial).unwrap();
        assert!(!change.maximized);
        assert_eq!(tree.position(container), Some((50, 60)));
    }

    #[test]
    fn test_fullscreen_clears_maximized() {
        let (mut tree, mut windows, root) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        let container = windows.get(id).unwrap().container;
        let content = windows.get(id).unwrap().content;
        tree.add_element(root, container).unwrap();
        tree.content_commit(content, None, Some((400, 300))).unwrap();

        let usable = Rect::new(0, 0, 1920, 1056);
        windows
            .request_maximized(&mut tree, id, true, usable)
            .unwrap();
        let serial = windows.get(id).unwrap().pending_mode.unwrap().serial;
        tree.content_commit(content, Some(serial), None).unwrap();
        windows.commit_mode(&mut tree, id, serial).unwrap();
        assert!(windows.get(id).unwrap().maximized());

        let extents = Rect::new(0, 0, 1920, 1080);
        windows
            .request_fullscreen(&mut tree, id, true, extents)
            .unwrap();
        let serial = windows.get(id).unwrap().pending_mode.unwrap().serial;
        tree.content_commit(content, Some(serial), None).unwrap();
        let change = windows.commit_mode(&mut tree, id, serial).unwrap();
        assert!(change.fullscreen);
        assert!(change.entered_fullscreen);
        assert!(!windows.get(id).unwrap().maximized());
        // Title bar is hidden while fullscreen
        let bar = windows.get(id).unwrap().titlebar.unwrap();
        assert!(!tree.get(bar).unwrap().visible);
    }

    #[test]
    fn test_stale_mode_commit_ignored() {
        let (mut tree, mut windows, _) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        windows
            .request_maximized(&mut tree, id, true, Rect::new(0, 0, 800, 600))
            .unwrap();
        let stale = crate::toolkit::Serial(0xdead);
        assert!(windows.commit_mode(&mut tree, id, stale).is_none());
        assert!(!windows.get(id).unwrap().maximized());
    }

    #[test]
    fn test_destroy_window_releases_elements() {
        let (mut tree, mut windows, root) = setup();
        let id = windows
            .create_window(&mut tree, SurfaceId(1), true)
            .unwrap();
        let container = windows.get(id).unwrap().container;
        tree.add_element(root, container).unwrap();
        tree.remove_element(root, container).unwrap();
        windows.destroy_window(&mut tree, id);
        assert!(tree.get(container).is_none());
        assert!(windows.window_for_surface(SurfaceId(1)).is_none());
        assert!(windows.is_empty());
    }
}
