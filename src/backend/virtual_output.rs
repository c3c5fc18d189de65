//! A virtual display for headless operation
//!
//! Stands in for real hardware when no session backend is present: it
//! accepts any state transaction and advertises a single preferred mode.

use crate::output::{HardwareOutput, Mode, OutputState};

/// A hardware output that exists only in memory
#[derive(Debug)]
pub struct VirtualOutput {
    name: String,
    mode: Mode,
    committed: Option<OutputState>,
}

impl VirtualOutput {
    pub fn new(name: &str, width: i32, height: i32) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode {
                width,
                height,
                refresh: 60000,
            },
            committed: None,
        }
    }

    /// The state last committed, if any
    pub fn committed(&self) -> Option<&OutputState> {
        self.committed.as_ref()
    }
}

impl HardwareOutput for VirtualOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn manufacturer(&self) -> Option<&str> {
        Some("trellis")
    }

    fn model(&self) -> Option<&str> {
        Some("virtual")
    }

    fn serial_number(&self) -> Option<&str> {
        None
    }

    fn preferred_mode(&self) -> Option<Mode> {
        Some(self.mode)
    }

    fn test_state(&mut self, _state: &OutputState) -> bool {
        true
    }

    fn commit_state(&mut self, state: &OutputState) -> bool {
        self.committed = Some(*state);
        true
    }
}
