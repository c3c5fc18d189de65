//! xdg_shell negotiation state
//!
//! Tracks the per-surface configure handshake: every configure carries a
//! serial; the client must acknowledge one before committing a buffer. The
//! acknowledged serial is what the toolkit's content negotiation consumes.

use std::collections::HashMap;

use log::debug;

use crate::geometry::Rect;
use crate::surface::SurfaceId;
use crate::toolkit::Serial;

/// Errors from xdg_shell bookkeeping; most are client protocol violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum XdgShellError {
    #[error("Unknown xdg surface")]
    InvalidSurface,
    #[error("Surface already has a role")]
    RoleAlreadySet,
    #[error("Buffer committed before the initial configure was acknowledged")]
    CommitBeforeConfigure,
}

/// Per-surface xdg state
#[derive(Debug)]
pub struct XdgSurfaceState {
    /// The backing wl_surface
    pub surface: SurfaceId,
    /// Serial of the last configure the client acknowledged
    pub acked_serial: Option<Serial>,
    /// Whether the initial configure has been acknowledged
    pub configured: bool,
    /// Client-declared window geometry, if any
    pub window_geometry: Option<Rect>,
}

/// Popup placement rules accumulated from an xdg_positioner
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionerState {
    pub size: (i32, i32),
    pub anchor_rect: Rect,
    pub offset: (i32, i32),
}

impl PositionerState {
    /// Resolve the popup rectangle relative to the parent surface
    ///
    /// Anchor/gravity refinement is left to the rendering side; the
    /// center-of-anchor-rect placement below is the protocol's default.
    pub fn placement(&self) -> Rect {
        Rect::new(
            self.anchor_rect.x + self.anchor_rect.width / 2 + self.offset.0,
            self.anchor_rect.y + self.anchor_rect.height / 2 + self.offset.1,
            self.size.0,
            self.size.1,
        )
    }
}

/// Bookkeeping for all xdg surfaces
#[derive(Debug, Default)]
pub struct XdgShellHandler {
    surfaces: HashMap<SurfaceId, XdgSurfaceState>,
}

impl XdgShellHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an xdg_surface for a wl_surface
    pub fn create_xdg_surface(&mut self, surface: SurfaceId) {
        debug!("Created xdg surface state for {:?}", surface);
        self.surfaces.insert(
            surface,
            XdgSurfaceState {
                surface,
                acked_serial: None,
                configured: false,
                window_geometry: None,
            },
        );
    }

    pub fn get(&self, surface: SurfaceId) -> Option<&XdgSurfaceState> {
        self.surfaces.get(&surface)
    }

    /// Record an ack_configure from the client
    pub fn ack_configure(
        &mut self,
        surface: SurfaceId,
        serial: Serial,
    ) -> Result<(), XdgShellError> {
        let state = self
            .surfaces
            .get_mut(&surface)
            .ok_or(XdgShellError::InvalidSurface)?;
        state.acked_serial = Some(serial);
        state.configured = true;
        Ok(())
    }

    /// The serial most recently acknowledged, consumed by the commit path
    pub fn take_acked_serial(&mut self, surface: SurfaceId) -> Option<Serial> {
        self.surfaces
            .get_mut(&surface)
            .and_then(|state| state.acked_serial.take())
    }

    /// Record the client-declared window geometry
    pub fn set_window_geometry(&mut self, surface: SurfaceId, geometry: Rect) {
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.window_geometry = Some(geometry);
        }
    }

    /// Validate a commit: attaching a buffer before acknowledging the
    /// initial configure is a protocol violation
    pub fn check_commit(&self, surface: SurfaceId, has_buffer: bool) -> Result<(), XdgShellError> {
        let state = self
            .surfaces
            .get(&surface)
            .ok_or(XdgShellError::InvalidSurface)?;
        if has_buffer && !state.configured {
            return Err(XdgShellError::CommitBeforeConfigure);
        }
        Ok(())
    }

    /// Drop a surface's state when it is destroyed
    pub fn remove_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_before_configure_is_violation() {
        let mut shell = XdgShellHandler::new();
        shell.create_xdg_surface(SurfaceId(1));
        assert_eq!(
            shell.check_commit(SurfaceId(1), true),
            Err(XdgShellError::CommitBeforeConfigure)
        );
        // A bufferless commit is fine pre-configure
        assert!(shell.check_commit(SurfaceId(1), false).is_ok());

        shell.ack_configure(SurfaceId(1), Serial(1)).unwrap();
        assert!(shell.check_commit(SurfaceId(1), true).is_ok());
    }

    #[test]
    fn test_acked_serial_is_consumed_once() {
        let mut shell = XdgShellHandler::new();
        shell.create_xdg_surface(SurfaceId(1));
        shell.ack_configure(SurfaceId(1), Serial(9)).unwrap();
        assert_eq!(shell.take_acked_serial(SurfaceId(1)), Some(Serial(9)));
        assert_eq!(shell.take_acked_serial(SurfaceId(1)), None);
        // Consuming the serial does not un-configure the surface
        assert!(shell.check_commit(SurfaceId(1), true).is_ok());
    }

    #[test]
    fn test_unknown_surface() {
        let mut shell = XdgShellHandler::new();
        assert_eq!(
            shell.ack_configure(SurfaceId(7), Serial(1)),
            Err(XdgShellError::InvalidSurface)
        );
    }

    #[test]
    fn test_positioner_placement() {
        let positioner = PositionerState {
            size: (200, 100),
            anchor_rect: Rect::new(10, 10, 40, 20),
            offset: (5, 5),
        };
        assert_eq!(positioner.placement(), Rect::new(35, 25, 200, 100));
    }

    #[test]
    fn test_remove_surface() {
        let mut shell = XdgShellHandler::new();
        shell.create_xdg_surface(SurfaceId(1));
        shell.remove_surface(SurfaceId(1));
        assert!(shell.is_empty());
    }
}
