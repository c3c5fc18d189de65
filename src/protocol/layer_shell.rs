//! wlr-layer-shell surface state
//!
//! Layer surfaces (panels, bars, overlays) request a layer, edge anchors,
//! and a desired size; the server answers with a configure and maps the
//! surface into the matching workspace layer as an undecorated, anchored
//! view.

use std::collections::HashMap;

use log::debug;

use crate::surface::SurfaceId;
use crate::toolkit::{Anchors, Serial};
use crate::workspace;

/// The four addressable layers of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellLayer {
    Background,
    #[default]
    Bottom,
    Top,
    Overlay,
}

impl ShellLayer {
    /// Create from the protocol value
    pub fn from_protocol(value: u32) -> Option<Self> {
        match value {
            0 => Some(ShellLayer::Background),
            1 => Some(ShellLayer::Bottom),
            2 => Some(ShellLayer::Top),
            3 => Some(ShellLayer::Overlay),
            _ => None,
        }
    }

    /// The workspace layer this maps into
    pub fn workspace_layer(self) -> workspace::Layer {
        match self {
            ShellLayer::Background => workspace::Layer::Background,
            ShellLayer::Bottom => workspace::Layer::Bottom,
            ShellLayer::Top => workspace::Layer::Top,
            ShellLayer::Overlay => workspace::Layer::Overlay,
        }
    }
}

/// Keyboard interactivity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyboardInteractivity {
    /// Never receives keyboard focus
    #[default]
    None,
    /// Holds keyboard focus while mapped
    Exclusive,
    /// Focus follows normal activation
    OnDemand,
}

impl KeyboardInteractivity {
    /// Create from the protocol value
    pub fn from_protocol(value: u32) -> Option<Self> {
        match value {
            0 => Some(KeyboardInteractivity::None),
            1 => Some(KeyboardInteractivity::Exclusive),
            2 => Some(KeyboardInteractivity::OnDemand),
            _ => None,
        }
    }
}

/// One layer surface's pending and committed request state
#[derive(Debug)]
pub struct LayerSurface {
    /// The backing wl_surface
    pub surface: SurfaceId,
    /// Requested layer
    pub layer: ShellLayer,
    /// Namespace the client identified itself with
    pub namespace: String,
    /// Desired size; 0 on an axis means "derive from anchors"
    pub desired_size: (u32, u32),
    /// Anchored edges
    pub anchors: Anchors,
    /// Pixels the surface wants reserved along its anchored edge
    pub exclusive_zone: i32,
    /// Keyboard interactivity mode
    pub keyboard_interactivity: KeyboardInteractivity,
    /// Whether the initial configure has been acknowledged
    pub configured: bool,
    /// Serial the client last acknowledged, pending consumption by the
    /// commit path
    pub acked_serial: Option<Serial>,
}

impl LayerSurface {
    fn new(surface: SurfaceId, layer: ShellLayer, namespace: String) -> Self {
        Self {
            surface,
            layer,
            namespace,
            desired_size: (0, 0),
            anchors: Anchors::empty(),
            exclusive_zone: 0,
            keyboard_interactivity: KeyboardInteractivity::None,
            configured: false,
            acked_serial: None,
        }
    }
}

/// Bookkeeping for all layer surfaces
#[derive(Debug, Default)]
pub struct LayerShellHandler {
    surfaces: HashMap<SurfaceId, LayerSurface>,
}

impl LayerShellHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer surface
    pub fn create_layer_surface(
        &mut self,
        surface: SurfaceId,
        layer: ShellLayer,
        namespace: String,
    ) {
        debug!(
            "Created layer surface for {:?} in {:?} (namespace '{}')",
            surface, layer, namespace
        );
        self.surfaces
            .insert(surface, LayerSurface::new(surface, layer, namespace));
    }

    pub fn get(&self, surface: SurfaceId) -> Option<&LayerSurface> {
        self.surfaces.get(&surface)
    }

    pub fn get_mut(&mut self, surface: SurfaceId) -> Option<&mut LayerSurface> {
        self.surfaces.get_mut(&surface)
    }

    /// Whether a surface is a layer surface
    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    /// Record an ack_configure from the client
    pub fn ack_configure(&mut self, surface: SurfaceId, serial: Serial) {
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.configured = true;
            state.acked_serial = Some(serial);
        }
    }

    /// The serial most recently acknowledged, consumed by the commit path
    pub fn take_acked_serial(&mut self, surface: SurfaceId) -> Option<Serial> {
        self.surfaces
            .get_mut(&surface)
            .and_then(|state| state.acked_serial.take())
    }

    /// Drop a surface's state when it is destroyed
    pub fn remove_surface(&mut self, surface: SurfaceId) -> Option<LayerSurface> {
        self.surfaces.remove(&surface)
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
    fn test_layer_mapping() {
        assert_eq!(ShellLayer::from_protocol(0), Some(ShellLayer::Background));
        assert_eq!(ShellLayer::from_protocol(3), Some(ShellLayer::Overlay));
        assert_eq!(ShellLayer::from_protocol(4), None);
        assert_eq!(
            ShellLayer::Top.workspace_layer(),
            crate::workspace::Layer::Top
        );
    }

    #[test]
    fn test_surface_lifecycle() {
        let mut shell = LayerShellHandler::new();
        shell.create_layer_surface(SurfaceId(1), ShellLayer::Top, "panel".to_string());
        assert!(shell.contains(SurfaceId(1)));

        let surface = shell.get_mut(SurfaceId(1)).unwrap();
        surface.anchors = Anchors::TOP | Anchors::LEFT | Anchors::RIGHT;
        surface.desired_size = (0, 32);
        surface.exclusive_zone = 32;

        let removed = shell.remove_surface(SurfaceId(1)).unwrap();
        assert_eq!(removed.desired_size, (0, 32));
        assert!(shell.is_empty());
    }

    #[test]
    fn test_keyboard_interactivity_values() {
        assert_eq!(
            KeyboardInteractivity::from_protocol(1),
            Some(KeyboardInteractivity::Exclusive)
        );
        assert_eq!(KeyboardInteractivity::from_protocol(9), None);
    }
}
