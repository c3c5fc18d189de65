//! Contents: elements wrapping one client surface
//!
//! A content's size is negotiated, not imposed: the compositor requests a
//! size and receives a serial; the client eventually commits a buffer along
//! with the serial it acknowledged. Only an acknowledgement of the most
//! recently issued serial is honored — anything older was superseded and is
//! dropped silently.

use log::debug;

use crate::surface::SurfaceId;

use super::element::{ElementId, ElementTree, ToolkitError};
use super::window::WindowId;
use super::ToolkitEvent;

/// Monotonically-issued negotiation token pairing a size request with its
/// acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serial(pub u32);

#[derive(Debug, Clone, Copy)]
struct PendingSize {
    serial: Serial,
    width: i32,
    height: i32,
}

/// Content payload: one client surface plus the size negotiation state
#[derive(Debug)]
pub struct Content {
    /// The wrapped client surface
    pub surface: SurfaceId,
    /// Owning window, if composed into one; valid while that window holds
    /// this element
    pub window: Option<WindowId>,
    committed: (i32, i32),
    pending: Option<PendingSize>,
    activated: bool,
}

impl Content {
    pub(super) fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            window: None,
            committed: (0, 0),
            pending: None,
            activated: false,
        }
    }

    /// The size last acknowledged by the client
    pub fn committed_size(&self) -> (i32, i32) {
        self.committed
    }

    /// Whether a size request is still awaiting acknowledgement
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn activated(&self) -> bool {
        self.activated
    }
}

/// Outcome of a content commit, for the caller to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Owning window, if any — the one to re-layout on size change
    pub window: Option<WindowId>,
    /// The serial this commit satisfied, if it matched the newest request
    pub acknowledged: Option<Serial>,
    /// Whether the committed size changed
    pub size_changed: bool,
}

impl ElementTree {
    /// Ask the client to take on a new size; returns the serial the
    /// acknowledgement must carry
    ///
    /// Issuing a new request implicitly invalidates any earlier pending one.
    pub fn content_request_size(
        &mut self,
        id: ElementId,
        width: i32,
        height: i32,
    ) -> Result<Serial, ToolkitError> {
        self.content(id)?;
        let serial = self.next_serial();
        let content = self.content_mut(id)?;
        content.pending = Some(PendingSize {
            serial,
            width,
            height,
        });
        let surface = content.surface;
        self.push_event(ToolkitEvent::Configure {
            surface,
            serial,
            width,
            height,
        });
        Ok(serial)
    }

    /// Feed a client commit into the negotiation
    ///
    /// `acked` is the serial the client acknowledged (if any); `size` is the
    /// committed buffer geometry. A stale serial — one superseded by a newer
    /// request — leaves the pending request in place and changes nothing.
    pub fn content_commit(
        &mut self,
        id: ElementId,
        acked: Option<Serial>,
        size: Option<(i32, i32)>,
    ) -> Result<CommitOutcome, ToolkitError> {
        let content = self.content_mut(id)?;
        let window = content.window;
        let mut acknowledged = None;

        if let Some(pending) = content.pending {
            match acked {
                Some(serial) if serial == pending.serial => {
                    content.pending = None;
                    acknowledged = Some(serial);
                    let new = size.unwrap_or((pending.width, pending.height));
                    let size_changed = new != content.committed;
                    content.committed = new;
                    return Ok(CommitOutcome {
                        window,
                        acknowledged,
                        size_changed,
                    });
                }
                Some(stale) => {
                    // Superseded by a newer request; not an error
                    debug!(
                        "Ignoring stale size acknowledgement {:?} (awaiting {:?})",
                        stale, pending.serial
                    );
                    return Ok(CommitOutcome {
                        window,
                        acknowledged: None,
                        size_changed: false,
                    });
                }
                None => {
                    // Commit without an ack while a request is pending:
                    // client-driven state only, negotiation stays open
                }
            }
        }

        let mut size_changed = false;
        if let Some(new) = size {
            let content = self.content_mut(id)?;
            size_changed = new != content.committed;
            content.committed = new;
        }
        Ok(CommitOutcome {
            window,
            acknowledged,
            size_changed,
        })
    }

    /// Ask the client to close the content's surface
    pub fn content_request_close(&mut self, id: ElementId) -> Result<(), ToolkitError> {
        let surface = self.content(id)?.surface;
        self.push_event(ToolkitEvent::CloseRequested { surface });
        Ok(())
    }

    /// Tell the client whether its surface is the active one
    pub fn content_set_activated(
        &mut self,
        id: ElementId,
        activated: bool,
    ) -> Result<(), ToolkitError> {
        let content = self.content_mut(id)?;
        if content.activated == activated {
            return Ok(());
        }
        content.activated = activated;
        let surface = content.surface;
        self.push_event(ToolkitEvent::ActivationChanged { surface, activated });
        Ok(())
    }

    /// The surface a content element wraps
    pub fn content_surface(&self, id: ElementId) -> Result<SurfaceId, ToolkitError> {
        Ok(self.content(id)?.surface)
    }

    /// Committed size of a content element, if the id names one
    pub fn content_size_of(&self, id: ElementId) -> Option<(i32, i32)> {
        self.content(id).ok().map(|c| c.committed_size())
    }
}

#[cfg(test)]
mod tests {
    use crate::surface::SurfaceId;

    use super::super::element::ElementTree;
    use super::super::ToolkitEvent;

    #[test]
    fn test_request_size_emits_configure() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        let serial = tree.content_request_size(content, 640, 480).unwrap();
        assert_eq!(
            tree.take_events(),
            vec![ToolkitEvent::Configure {
                surface: SurfaceId(1),
                serial,
                width: 640,
                height: 480,
            }]
        );
    }

    #[test]
    fn test_matching_ack_commits_size() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        let serial = tree.content_request_size(content, 640, 480).unwrap();
        let outcome = tree
            .content_commit(content, Some(serial), Some((640, 480)))
            .unwrap();
        assert_eq!(outcome.acknowledged, Some(serial));
        assert!(outcome.size_changed);
        assert_eq!(tree.content(content).unwrap().committed_size(), (640, 480));
        assert!(!tree.content(content).unwrap().has_pending());
    }

    #[test]
    fn test_stale_ack_is_dropped() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        let first = tree.content_request_size(content, 640, 480).unwrap();
        let second = tree.content_request_size(content, 800, 600).unwrap();
        assert_ne!(first, second);

        // The client answers the superseded request: ignored entirely
        let outcome = tree
            .content_commit(content, Some(first), Some((640, 480)))
            .unwrap();
        assert_eq!(outcome.acknowledged, None);
        assert!(!outcome.size_changed);
        assert_eq!(tree.content(content).unwrap().committed_size(), (0, 0));
        assert!(tree.content(content).unwrap().has_pending());

        // The newest one still completes
        let outcome = tree
            .content_commit(content, Some(second), Some((800, 600)))
            .unwrap();
        assert_eq!(outcome.acknowledged, Some(second));
        assert_eq!(tree.content(content).unwrap().committed_size(), (800, 600));
    }

    #[test]
    fn test_client_resize_without_negotiation() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        let outcome = tree.content_commit(content, None, Some((300, 200))).unwrap();
        assert!(outcome.size_changed);
        assert_eq!(tree.content(content).unwrap().committed_size(), (300, 200));
    }

    #[test]
    fn test_activation_is_edge_triggered() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        tree.content_set_activated(content, true).unwrap();
        tree.content_set_activated(content, true).unwrap();
        let events = tree.take_events();
        assert_eq!(
            events,
            vec![ToolkitEvent::ActivationChanged {
                surface: SurfaceId(1),
                activated: true,
            }]
        );
    }

    #[test]
    fn test_request_close() {
        let mut tree = ElementTree::new();
        let content = tree.create_content(SurfaceId(1));
        tree.content_request_close(content).unwrap();
        assert_eq!(
            tree.take_events(),
            vec![ToolkitEvent::CloseRequested {
                surface: SurfaceId(1)
            }]
        );
    }
}
