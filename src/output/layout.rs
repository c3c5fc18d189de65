//! The shared output layout
//!
//! One process-wide arrangement of all attached outputs in a common
//! coordinate space. Enumeration order is attach order; description lookups
//! scan it front to back and the first match wins. The bounding box over
//! all enabled outputs is what workspaces receive as their extents.

use log::{debug, info};

use crate::geometry::Rect;

use super::config::OutputDescription;
use super::{OutputId, OutputManager};

/// The attach-ordered output layout
#[derive(Debug, Default)]
pub struct OutputLayout {
    order: Vec<OutputId>,
}

impl OutputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an output at an explicit position, or to the right of the
    /// current bounding box when none is configured
    pub fn attach(
        &mut self,
        manager: &mut OutputManager,
        id: OutputId,
        position: Option<(i32, i32)>,
    ) {
        if self.order.contains(&id) {
            return;
        }
        let position = position.unwrap_or_else(|| {
            let bbox = self.bounding_box(manager);
            (bbox.right(), bbox.y)
        });
        if let Some(output) = manager.get_mut(id) {
            output.position = position;
            info!(
                "Attached output '{}' to layout at {},{}",
                output.name, position.0, position.1
            );
        }
        self.order.push(id);
    }

    /// Detach an output; the caller removes it from the manager in the same
    /// event-loop turn
    pub fn detach(&mut self, id: OutputId) {
        debug!("Detaching output {:?} from layout", id);
        self.order.retain(|&o| o != id);
    }

    /// Outputs in enumeration (attach) order
    pub fn outputs(&self) -> &[OutputId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Bounding box over all enabled outputs
    pub fn bounding_box(&self, manager: &OutputManager) -> Rect {
        self.order
            .iter()
            .filter_map(|&id| manager.get(id))
            .filter(|output| output.enabled)
            .map(|output| output.layout_rect())
            .fold(Rect::default(), |acc, rect| acc.union(&rect))
    }

    /// First output whose description the given one glob-matches, in
    /// enumeration order
    pub fn find_output(
        &self,
        manager: &OutputManager,
        description: &OutputDescription,
    ) -> Option<OutputId> {
        self.order
            .iter()
            .copied()
            .find(|&id| {
                manager
                    .get(id)
                    .is_some_and(|output| description.fnmatches(output.description()))
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::output::config::{OutputAttributes, OutputDescription};
    use crate::output::test_support::FakeHardware;
    use crate::output::{Output, OutputManager};

    use super::*;

    fn make_output(manager: &mut OutputManager, name: &str) -> OutputId {
        let output = Output::create(
            Box::new(FakeHardware::named(name)),
            &OutputAttributes::default(),
        )
        .unwrap();
        manager.add(output)
    }

    #[test]
    fn test_attach_auto_positions_rightward() {
        let mut manager = OutputManager::new();
        let mut layout = OutputLayout::new();
        let a = make_output(&mut manager, "DP-1");
        let b = make_output(&mut manager, "DP-2");
        layout.attach(&mut manager, a, None);
        layout.attach(&mut manager, b, None);
        assert_eq!(manager.get(a).unwrap().position, (0, 0));
        assert_eq!(manager.get(b).unwrap().position, (1920, 0));
        assert_eq!(
            layout.bounding_box(&manager),
            Rect::new(0, 0, 3840, 1080)
        );
    }

    #[test]
    fn test_attach_with_explicit_position() {
        let mut manager = OutputManager::new();
        let mut layout = OutputLayout::new();
        let a = make_output(&mut manager, "DP-1");
        layout.attach(&mut manager, a, Some((100, 200)));
        assert_eq!(manager.get(a).unwrap().position, (100, 200));
        assert_eq!(
            layout.bounding_box(&manager),
            Rect::new(100, 200, 1920, 1080)
        );
    }

    #[test]
    fn test_detach_shrinks_bounding_box() {
        let mut manager = OutputManager::new();
        let mut layout = OutputLayout::new();
        let a = make_output(&mut manager, "DP-1");
        let b = make_output(&mut manager, "DP-2");
        layout.attach(&mut manager, a, None);
        layout.attach(&mut manager, b, None);
        layout.detach(b);
        manager.remove(b);
        assert_eq!(layout.bounding_box(&manager), Rect::new(0, 0, 1920, 1080));
        assert_eq!(layout.outputs(), &[a]);
    }

    #[test]
    fn test_find_output_first_match_in_order() {
        let mut manager = OutputManager::new();
        let mut layout = OutputLayout::new();
        let a = make_output(&mut manager, "DP-1");
        let b = make_output(&mut manager, "DP-2");
        layout.attach(&mut manager, a, None);
        layout.attach(&mut manager, b, None);

        let any_dp = OutputDescription {
            name: Some("DP-*".to_string()),
            ..OutputDescription::default()
        };
        assert_eq!(layout.find_output(&manager, &any_dp), Some(a));

        let second = OutputDescription {
            name: Some("DP-2".to_string()),
            ..OutputDescription::default()
        };
        assert_eq!(layout.find_output(&manager, &second), Some(b));

        let missing = OutputDescription {
            name: Some("HDMI-*".to_string()),
            ..OutputDescription::default()
        };
        assert_eq!(layout.find_output(&manager, &missing), None);
    }
}
