//! Input seat coordination and the device registry

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};

use super::{Keyboard, Pointer};

/// Unique identifier for input devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputDeviceId(pub u64);

impl InputDeviceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        InputDeviceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What kind of events a device produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
    Touch,
}

/// One registered input device
#[derive(Debug)]
pub struct InputDevice {
    pub id: InputDeviceId,
    pub name: String,
    pub kind: DeviceKind,
}

/// Seat capabilities advertised to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeatCapabilities {
    pub keyboard: bool,
    pub pointer: bool,
    pub touch: bool,
}

impl SeatCapabilities {
    /// Convert to wl_seat capability flags
    pub fn to_wayland(self) -> u32 {
        let mut flags = 0u32;
        if self.pointer {
            flags |= 1;
        }
        if self.keyboard {
            flags |= 2;
        }
        if self.touch {
            flags |= 4;
        }
        flags
    }
}

/// The seat: keyboard and pointer state plus the devices backing them
///
/// The capability mask is recomputed by scanning the registry on every
/// device add and remove, never adjusted incrementally, so repeated
/// hotplugs cannot make it drift.
#[derive(Debug)]
pub struct Seat {
    name: String,
    pub keyboard: Keyboard,
    pub pointer: Pointer,
    devices: Vec<InputDevice>,
    capabilities: SeatCapabilities,
}

impl Seat {
    pub fn new() -> Self {
        Self {
            name: "seat0".to_string(),
            keyboard: Keyboard::new(),
            pointer: Pointer::new(),
            devices: Vec::new(),
            capabilities: SeatCapabilities::default(),
        }
    }

    pub fn with_name(name: String) -> Self {
        Self {
            name,
            ..Self::new()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> SeatCapabilities {
        self.capabilities
    }

    /// Register a device; returns its id and the new capability mask
    pub fn add_device(&mut self, name: String, kind: DeviceKind) -> InputDeviceId {
        let id = InputDeviceId::new();
        info!("Adding input device '{}' ({:?})", name, kind);
        self.devices.push(InputDevice { id, name, kind });
        self.recompute_capabilities();
        id
    }

    /// Unregister a device on its hardware-destroy notification
    pub fn remove_device(&mut self, id: InputDeviceId) -> Option<InputDevice> {
        let index = self.devices.iter().position(|d| d.id == id)?;
        let device = self.devices.remove(index);
        debug!("Removed input device '{}'", device.name);
        self.recompute_capabilities();
        Some(device)
    }

    pub fn devices(&self) -> &[InputDevice] {
        &self.devices
    }

    fn recompute_capabilities(&mut self) {
        let mut capabilities = SeatCapabilities::default();
        for device in &self.devices {
            match device.kind {
                DeviceKind::Keyboard => capabilities.keyboard = true,
                DeviceKind::Pointer => capabilities.pointer = true,
                DeviceKind::Touch => capabilities.touch = true,
            }
        }
        self.capabilities = capabilities;
    }
}

impl Default for Seat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_recomputed_on_add_remove() {
        let mut seat = Seat::new();
        assert_eq!(seat.capabilities().to_wayland(), 0);

        let kb1 = seat.add_device("kb1".to_string(), DeviceKind::Keyboard);
        let kb2 = seat.add_device("kb2".to_string(), DeviceKind::Keyboard);
        let ptr = seat.add_device("mouse".to_string(), DeviceKind::Pointer);
        assert!(seat.capabilities().keyboard);
        assert!(seat.capabilities().pointer);

        // One of two keyboards going away keeps the capability
        seat.remove_device(kb1);
        assert!(seat.capabilities().keyboard);
        seat.remove_device(kb2);
        assert!(!seat.capabilities().keyboard);
        assert!(seat.capabilities().pointer);

        seat.remove_device(ptr);
        assert_eq!(seat.capabilities(), SeatCapabilities::default());
    }

    #[test]
    fn test_remove_unknown_device() {
        let mut seat = Seat::new();
        assert!(seat.remove_device(InputDeviceId(999)).is_none());
    }

    #[test]
    fn test_seat_name() {
        let seat = Seat::with_name("seat1".to_string());
        assert_eq!(seat.name(), "seat1");
    }

    #[test]
    fn test_capability_flags() {
        let capabilities = SeatCapabilities {
            keyboard: true,
            pointer: true,
            touch: false,
        };
        assert_eq!(capabilities.to_wayland(), 3);
    }
}
