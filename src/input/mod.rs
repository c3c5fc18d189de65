//! Input handling
//!
//! Seat, keyboard, and pointer state, plus the input-device registry the
//! seat capability mask is derived from.

mod keyboard;
mod pointer;
mod seat;

pub use keyboard::{keysym_to_lower, keysym_to_upper, Keyboard, ModifierState, Modifiers};
pub use pointer::Pointer;
pub use seat::{DeviceKind, InputDevice, InputDeviceId, Seat, SeatCapabilities};
