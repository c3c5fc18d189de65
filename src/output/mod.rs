//! Output (display) management
//!
//! An [`Output`] wraps one physical display handle and the configuration
//! applied to it. Construction is transactional: the resolved settings are
//! built into a pending state, tested against the hardware, and only
//! committed when the test passes — a failing output is torn down and the
//! failure propagated, never left half-configured.

pub mod config;
pub mod layout;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};

use crate::geometry::Rect;

use config::{OutputAttributes, OutputDescription};

/// Unique identifier for outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u64);

impl OutputId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OutputId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Output transform (rotation/flip)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    /// Convert to the wl_output::transform wire value
    pub fn to_wayland(self) -> u32 {
        match self {
            Transform::Normal => 0,
            Transform::Rotate90 => 1,
            Transform::Rotate180 => 2,
            Transform::Rotate270 => 3,
            Transform::Flipped => 4,
            Transform::Flipped90 => 5,
            Transform::Flipped180 => 6,
            Transform::Flipped270 => 7,
        }
    }

    /// Parse a configuration name (`Normal`, `Rotate90`, `Flip`,
    /// `FlipAndRotate90`, ...)
    pub fn from_config_name(name: &str) -> Option<Transform> {
        Some(match name {
            "Normal" => Transform::Normal,
            "Rotate90" => Transform::Rotate90,
            "Rotate180" => Transform::Rotate180,
            "Rotate270" => Transform::Rotate270,
            "Flip" => Transform::Flipped,
            "FlipAndRotate90" => Transform::Flipped90,
            "FlipAndRotate180" => Transform::Flipped180,
            "FlipAndRotate270" => Transform::Flipped270,
            _ => return None,
        })
    }

    /// Whether the transform swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Transform::Rotate90
                | Transform::Rotate270
                | Transform::Flipped90
                | Transform::Flipped270
        )
    }
}

/// An output mode: resolution plus refresh rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
    /// Refresh rate in mHz (60000 = 60 Hz); 0 lets the hardware pick
    pub refresh: i32,
}

/// The pending state a configuration builds before it is tested and
/// committed against the hardware
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputState {
    pub enabled: bool,
    pub transform: Transform,
    pub scale: f64,
    pub mode: Option<Mode>,
}

/// The physical display handle, owned by the backend
///
/// Tests drive [`Output::create`] with programmable fakes; the production
/// implementation forwards to the hardware's atomic state API.
pub trait HardwareOutput: fmt::Debug {
    /// Connector name, e.g. "DP-1"
    fn name(&self) -> &str;
    fn manufacturer(&self) -> Option<&str>;
    fn model(&self) -> Option<&str>;
    fn serial_number(&self) -> Option<&str>;
    /// The mode the hardware prefers, if it advertises one
    fn preferred_mode(&self) -> Option<Mode>;
    /// Test whether a pending state would be accepted
    fn test_state(&mut self, state: &OutputState) -> bool;
    /// Commit a previously tested state
    fn commit_state(&mut self, state: &OutputState) -> bool;
}

/// Errors from output construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("output '{0}': hardware rejected the configured state")]
    TestFailed(String),
    #[error("output '{0}': committing the tested state failed")]
    CommitFailed(String),
}

/// One physical display and its applied configuration
#[derive(Debug)]
pub struct Output {
    /// Unique identifier
    pub id: OutputId,
    /// Connector name
    pub name: String,
    /// Identity fields for configuration matching
    description: OutputDescription,
    /// Applied transform
    pub transform: Transform,
    /// Applied scale factor
    pub scale: f64,
    /// Whether the output participates in the layout
    pub enabled: bool,
    /// Position in the shared layout; set when attached
    pub position: (i32, i32),
    /// The committed mode, if the hardware has one
    pub current_mode: Option<Mode>,
    hw: Box<dyn HardwareOutput>,
}

impl Output {
    /// Construct an output by applying a configuration through a
    /// test-then-commit transaction
    ///
    /// On test or commit failure the hardware handle is dropped and the
    /// error propagated; the caller must wait for the hardware to be
    /// re-announced rather than retry.
    pub fn create(
        mut hw: Box<dyn HardwareOutput>,
        attributes: &OutputAttributes,
    ) -> Result<Output, OutputError> {
        let state = OutputState {
            enabled: attributes.enabled,
            transform: attributes.transformation,
            scale: attributes.scale,
            mode: attributes.mode.or_else(|| hw.preferred_mode()),
        };
        if !hw.test_state(&state) {
            return Err(OutputError::TestFailed(hw.name().to_string()));
        }
        if !hw.commit_state(&state) {
            return Err(OutputError::CommitFailed(hw.name().to_string()));
        }

        let description = OutputDescription {
            name: Some(hw.name().to_string()),
            manufacturer: hw.manufacturer().map(String::from),
            model: hw.model().map(String::from),
            serial: hw.serial_number().map(String::from),
        };
        let output = Output {
            id: OutputId::new(),
            name: hw.name().to_string(),
            description,
            transform: state.transform,
            scale: state.scale,
            enabled: state.enabled,
            position: attributes.position.unwrap_or((0, 0)),
            current_mode: state.mode,
            hw,
        };
        info!(
            "Created output {:?} '{}' (transform {:?}, scale {})",
            output.id, output.name, output.transform, output.scale
        );
        Ok(output)
    }

    /// The identity record used for configuration matching
    pub fn description(&self) -> &OutputDescription {
        &self.description
    }

    /// Size in layout (logical) coordinates: the mode resolution, swapped
    /// by rotating transforms and divided by the scale factor
    pub fn layout_size(&self) -> (i32, i32) {
        let Some(mode) = self.current_mode else {
            return (0, 0);
        };
        let (w, h) = if self.transform.swaps_dimensions() {
            (mode.height, mode.width)
        } else {
            (mode.width, mode.height)
        };
        (
            (w as f64 / self.scale).round() as i32,
            (h as f64 / self.scale).round() as i32,
        )
    }

    /// The rectangle this output covers in the layout
    pub fn layout_rect(&self) -> Rect {
        let (w, h) = self.layout_size();
        Rect::new(self.position.0, self.position.1, w, h)
    }
}

/// Manager for all outputs
#[derive(Debug, Default)]
pub struct OutputManager {
    outputs: HashMap<OutputId, Output>,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output
    pub fn add(&mut self, output: Output) -> OutputId {
        let id = output.id;
        self.outputs.insert(id, output);
        id
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    pub fn remove(&mut self, id: OutputId) -> Option<Output> {
        debug!("Removing output {:?}", id);
        self.outputs.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Programmable fake hardware for output tests
    #[derive(Debug)]
    pub struct FakeHardware {
        pub name: String,
        pub manufacturer: Option<String>,
        pub model: Option<String>,
        pub serial: Option<String>,
        pub preferred: Option<Mode>,
        pub fail_test: bool,
        pub fail_commit: bool,
        pub committed: Option<OutputState>,
    }

    impl FakeHardware {
        pub fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                manufacturer: None,
                model: None,
                serial: None,
                preferred: Some(Mode {
                    width: 1920,
                    height: 1080,
                    refresh: 60000,
                }),
                fail_test: false,
                fail_commit: false,
                committed: None,
            }
        }
    }

    impl HardwareOutput for FakeHardware {
        fn name(&self) -> &str {
            &self.name
        }
        fn manufacturer(&self) -> Option<&str> {
            self.manufacturer.as_deref()
        }
        fn model(&self) -> Option<&str> {
            self.model.as_deref()
        }
        fn serial_number(&self) -> Option<&str> {
            self.serial.as_deref()
        }
        fn preferred_mode(&self) -> Option<Mode> {
            self.preferred
        }
        fn test_state(&mut self, _state: &OutputState) -> bool {
            !self.fail_test
        }
        fn commit_state(&mut self, state: &OutputState) -> bool {
            if self.fail_commit {
                return false;
            }
            self.committed = Some(*state);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::config::OutputAttributes;
    use super::test_support::FakeHardware;
    use super::*;

    #[test]
    fn test_create_applies_configuration() {
        let hw = Box::new(FakeHardware::named("DP-1"));
        let attributes = OutputAttributes {
            transformation: Transform::Flipped,
            scale: 1.0,
            ..OutputAttributes::default()
        };
        let output = Output::create(hw, &attributes).unwrap();
        assert_eq!(output.name, "DP-1");
        assert_eq!(output.transform, Transform::Flipped);
        assert_eq!(output.scale, 1.0);
        assert!(output.enabled);
        // The preferred mode fills in when the config names none
        assert_eq!(
            output.current_mode,
            Some(Mode {
                width: 1920,
                height: 1080,
                refresh: 60000
            })
        );
    }

    #[test]
    fn test_create_fails_when_test_rejected() {
        let mut hw = FakeHardware::named("DP-1");
        hw.fail_test = true;
        let err = Output::create(Box::new(hw), &OutputAttributes::default()).unwrap_err();
        assert_eq!(err, OutputError::TestFailed("DP-1".to_string()));
    }

    #[test]
    fn test_create_fails_when_commit_rejected() {
        let mut hw = FakeHardware::named("DP-1");
        hw.fail_commit = true;
        let err = Output::create(Box::new(hw), &OutputAttributes::default()).unwrap_err();
        assert_eq!(err, OutputError::CommitFailed("DP-1".to_string()));
    }

    #[test]
    fn test_layout_size_respects_transform_and_scale() {
        let hw = Box::new(FakeHardware::named("DP-1"));
        let attributes = OutputAttributes {
            transformation: Transform::Rotate90,
            scale: 2.0,
            ..OutputAttributes::default()
        };
        let output = Output::create(hw, &attributes).unwrap();
        assert_eq!(output.layout_size(), (540, 960));
    }

    #[test]
    fn test_configured_mode_overrides_preferred() {
        let hw = Box::new(FakeHardware::named("DP-1"));
        let attributes = OutputAttributes {
            mode: Some(Mode {
                width: 2560,
                height: 1440,
                refresh: 144000,
            }),
            ..OutputAttributes::default()
        };
        let output = Output::create(hw, &attributes).unwrap();
        assert_eq!(output.current_mode.unwrap().width, 2560);
    }

    #[test]
    fn test_manager_add_remove() {
        let mut manager = OutputManager::new();
        let output =
            Output::create(Box::new(FakeHardware::named("DP-1")), &OutputAttributes::default())
                .unwrap();
        let id = manager.add(output);
        assert!(manager.get(id).is_some());
        manager.remove(id);
        assert!(manager.get(id).is_none());
    }
}
