//! Toolkit element hierarchy
//!
//! The composable unit system every visible thing is built from: leaf
//! elements (rectangles, client contents) stacked inside containers, which
//! route pointer, button, and keyboard focus and propagate layout updates
//! toward the attached root. Windows compose decoration and content into a
//! single interactive unit.
//!
//! The toolkit never talks to clients directly; protocol-bound effects
//! (configure, close, pointer deliveries) are queued as [`ToolkitEvent`]s
//! the server drains once per event-loop turn.

mod container;
mod content;
mod element;
mod window;

pub use container::Container;
pub use content::{Content, Serial};
pub use element::{Element, ElementId, ElementKind, ElementTree, RectElement, ToolkitError};
pub use window::{
    Anchors, ModeChange, ResizeEdges, Window, WindowId, WindowManager, WindowStyle,
};

use crate::surface::SurfaceId;

/// Effects queued by toolkit operations, drained by the server once per
/// event-loop turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolkitEvent {
    /// Pointer moved onto a content's surface
    PointerEnter { surface: SurfaceId, x: f64, y: f64 },
    /// Pointer left a content's surface
    PointerLeave { surface: SurfaceId },
    /// Pointer moved within a content's surface
    PointerMotion { surface: SurfaceId, x: f64, y: f64 },
    /// Button event delivered to a content's surface
    PointerButton {
        surface: SurfaceId,
        button: u32,
        pressed: bool,
    },
    /// Button event landed on a non-content element (e.g. a decoration)
    ElementClicked {
        element: ElementId,
        button: u32,
        pressed: bool,
    },
    /// A size was requested from the client; carries the negotiation serial
    Configure {
        surface: SurfaceId,
        serial: Serial,
        width: i32,
        height: i32,
    },
    /// The client was asked to close
    CloseRequested { surface: SurfaceId },
    /// Activation state changed and the client must be told
    ActivationChanged { surface: SurfaceId, activated: bool },
    /// An interactive move grab was requested for a window
    InteractiveMove { window: WindowId },
    /// An interactive resize grab was requested for a window
    InteractiveResize {
        window: WindowId,
        edges: ResizeEdges,
    },
}
