//! Keyboard handling and XKB integration

use bitflags::bitflags;
use log::debug;
use xkbcommon::xkb;

use crate::surface::SurfaceId;

bitflags! {
    /// Keyboard modifier flags, in XKB mask order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const LOGO = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

/// Raw XKB modifier state as sent over the wire
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifierState {
    /// Currently held modifiers
    pub depressed: u32,
    /// Sticky modifiers, cleared on the next key
    pub latched: u32,
    /// Toggled modifiers (caps lock and friends)
    pub locked: u32,
    /// Active layout group
    pub group: u32,
}

/// Keyboard state
#[derive(Debug)]
pub struct Keyboard {
    /// Surface holding keyboard focus
    focus: Option<SurfaceId>,
    /// Currently pressed keycodes
    pressed_keys: Vec<u32>,
    /// Modifier state
    modifiers: ModifierState,
    /// Repeat rate (characters per second)
    pub repeat_rate: u32,
    /// Repeat delay (milliseconds)
    pub repeat_delay: u32,
    /// Keymap in XKB text format, compiled lazily
    keymap: Option<String>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            focus: None,
            pressed_keys: Vec::new(),
            modifiers: ModifierState::default(),
            repeat_rate: 25,
            repeat_delay: 600,
            keymap: None,
        }
    }

    /// Move keyboard focus; returns the previous holder
    pub fn set_focus(&mut self, surface: Option<SurfaceId>) -> Option<SurfaceId> {
        let old = self.focus;
        self.focus = surface;
        old
    }

    pub fn focus(&self) -> Option<SurfaceId> {
        self.focus
    }

    /// Record a key press; false when the key was already down (repeat)
    pub fn key_press(&mut self, keycode: u32) -> bool {
        if self.pressed_keys.contains(&keycode) {
            return false;
        }
        self.pressed_keys.push(keycode);
        true
    }

    /// Record a key release; false when the key was not down
    pub fn key_release(&mut self, keycode: u32) -> bool {
        match self.pressed_keys.iter().position(|&k| k == keycode) {
            Some(index) => {
                self.pressed_keys.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn pressed_keys(&self) -> &[u32] {
        &self.pressed_keys
    }

    pub fn set_modifiers(&mut self, modifiers: ModifierState) {
        self.modifiers = modifiers;
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    /// Modifier flags relevant for key-binding dispatch
    pub fn effective_modifiers(&self) -> Modifiers {
        Modifiers::from_bits_truncate(self.modifiers.depressed | self.modifiers.latched)
    }

    /// The keymap string advertised to clients, compiled on first use from
    /// the default XKB rules
    pub fn keymap_string(&mut self) -> Option<&str> {
        if self.keymap.is_none() {
            self.keymap = compile_default_keymap();
        }
        self.keymap.as_deref()
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_default_keymap() -> Option<String> {
    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    let keymap = xkb::Keymap::new_from_names(
        &context,
        "",
        "",
        "",
        "",
        None,
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )?;
    debug!("Compiled default XKB keymap");
    Some(keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1))
}

/// Uppercase variant of a keysym, for Latin-1 letter keysyms
///
/// Letter keysyms in the Latin-1 block equal their codepoints, so case
/// conversion is plain arithmetic; anything else is returned unchanged.
pub fn keysym_to_upper(keysym: u32) -> u32 {
    match keysym {
        0x61..=0x7a => keysym - 0x20,
        // à..þ excluding ÷
        0xe0..=0xfe if keysym != 0xf7 => keysym - 0x20,
        _ => keysym,
    }
}

/// Lowercase variant of a keysym, for Latin-1 letter keysyms
pub fn keysym_to_lower(keysym: u32) -> u32 {
    match keysym {
        0x41..=0x5a => keysym + 0x20,
        // À..Þ excluding ×
        0xc0..=0xde if keysym != 0xd7 => keysym + 0x20,
        _ => keysym,
    }
}
