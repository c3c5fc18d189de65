//! Client surface tracking
//!
//! Bookkeeping for wl_surface state: double-buffered buffer attachment,
//! damage accumulation, and role assignment. The committed buffer geometry
//! is what the toolkit reads as a content's client-side size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

/// Unique identifier for surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A damage region on a surface
#[derive(Debug, Clone, Copy)]
pub struct DamageRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Geometry of the buffer attached to a surface
#[derive(Debug, Clone, Copy)]
pub struct BufferInfo {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

/// Surface role, assigned once and permanent afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceRole {
    /// No role assigned yet
    #[default]
    None,
    /// XDG toplevel window
    Toplevel,
    /// XDG popup
    Popup,
    /// wlr-layer-shell surface
    LayerSurface,
    /// Cursor image
    Cursor,
}

/// Error for conflicting role assignment — a protocol violation on the
/// client's part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("surface already has a different role")]
pub struct RoleConflict;

/// Pending (uncommitted) surface state
#[derive(Debug, Default)]
pub struct SurfacePending {
    /// Newly attached buffer; `Some(None)` means explicit null attach
    pub buffer: Option<Option<BufferInfo>>,
    /// Accumulated damage
    pub damage: Vec<DamageRect>,
    /// Frame callback ids waiting for the next repaint
    pub frame_callbacks: Vec<u32>,
}

/// One client surface
#[derive(Debug)]
pub struct Surface {
    /// Unique identifier
    pub id: SurfaceId,
    /// Committed buffer geometry; `None` while unmapped
    pub buffer: Option<BufferInfo>,
    /// Committed damage since the last repaint
    pub damage: Vec<DamageRect>,
    /// State awaiting the next commit
    pub pending: SurfacePending,
    /// Assigned role
    pub role: SurfaceRole,
}

impl Surface {
    fn new() -> Self {
        Self {
            id: SurfaceId::new(),
            buffer: None,
            damage: Vec::new(),
            pending: SurfacePending::default(),
            role: SurfaceRole::None,
        }
    }

    /// Attach a buffer (or null) to the pending state
    pub fn attach(&mut self, buffer: Option<BufferInfo>) {
        self.pending.buffer = Some(buffer);
    }

    /// Accumulate pending damage
    pub fn damage(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.pending.damage.push(DamageRect {
            x,
            y,
            width,
            height,
        });
    }

    /// Register a frame callback for the next repaint
    pub fn frame(&mut self, callback_id: u32) {
        self.pending.frame_callbacks.push(callback_id);
    }

    /// Apply pending state; returns the frame callbacks that became due
    pub fn commit(&mut self) -> Vec<u32> {
        if let Some(buffer) = self.pending.buffer.take() {
            self.buffer = buffer;
        }
        if !self.pending.damage.is_empty() {
            self.damage.append(&mut self.pending.damage);
        }
        std::mem::take(&mut self.pending.frame_callbacks)
    }

    /// Committed size in surface coordinates, if mapped
    pub fn size(&self) -> Option<(i32, i32)> {
        self.buffer.map(|b| (b.width, b.height))
    }

    /// Assign a role; assigning the same role again is allowed
    pub fn set_role(&mut self, role: SurfaceRole) -> Result<(), RoleConflict> {
        if self.role != SurfaceRole::None && self.role != role {
            return Err(RoleConflict);
        }
        self.role = role;
        Ok(())
    }
}

/// Manager for all surfaces
#[derive(Debug, Default)]
pub struct SurfaceManager {
    surfaces: HashMap<SurfaceId, Surface>,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new surface and return its id
    pub fn create_surface(&mut self) -> SurfaceId {
        let surface = Surface::new();
        let id = surface.id;
        self.surfaces.insert(id, surface);
        debug!("Created surface {:?}", id);
        id
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn remove(&mut self, id: SurfaceId) -> Option<Surface> {
        debug!("Removed surface {:?}", id);
        self.surfaces.remove(&id)
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
    fn test_surface_starts_unmapped() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get(id).unwrap();
        assert!(surface.buffer.is_none());
        assert_eq!(surface.role, SurfaceRole::None);
    }

    #[test]
    fn test_commit_applies_buffer() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get_mut(id).unwrap();
        surface.attach(Some(BufferInfo {
            width: 320,
            height: 240,
        }));
        assert!(surface.size().is_none());
        surface.commit();
        assert_eq!(surface.size(), Some((320, 240)));
    }

    #[test]
    fn test_null_attach_unmaps() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get_mut(id).unwrap();
        surface.attach(Some(BufferInfo {
            width: 1,
            height: 1,
        }));
        surface.commit();
        surface.attach(None);
        surface.commit();
        assert!(surface.size().is_none());
    }

    #[test]
    fn test_commit_without_attach_keeps_buffer() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get_mut(id).unwrap();
        surface.attach(Some(BufferInfo {
            width: 64,
            height: 64,
        }));
        surface.commit();
        surface.damage(0, 0, 8, 8);
        surface.commit();
        assert_eq!(surface.size(), Some((64, 64)));
        assert_eq!(surface.damage.len(), 1);
    }

    #[test]
    fn test_frame_callbacks_returned_on_commit() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get_mut(id).unwrap();
        surface.frame(7);
        surface.frame(8);
        assert_eq!(surface.commit(), vec![7, 8]);
        assert!(surface.commit().is_empty());
    }

    #[test]
    fn test_role_conflict() {
        let mut manager = SurfaceManager::new();
        let id = manager.create_surface();
        let surface = manager.get_mut(id).unwrap();
        assert!(surface.set_role(SurfaceRole::Toplevel).is_ok());
        assert!(surface.set_role(SurfaceRole::Toplevel).is_ok());
        assert_eq!(surface.set_role(SurfaceRole::Popup), Err(RoleConflict));
    }
}
