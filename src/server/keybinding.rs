//! Key bindings and their dispatch table
//!
//! A binding matches when the masked event modifiers equal the required
//! set and the keysym matches exactly or, case-insensitively, one of the
//! bound keysym's case variants. Dispatch walks bindings in registration
//! order; the first whose action consumes the key stops the walk.

use log::debug;

use crate::input::{keysym_to_lower, keysym_to_upper, Modifiers};

/// The closed set of actions a binding can trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Stop the compositor
    Quit,
    /// Launch a command line via the subprocess monitor
    Spawn(String),
    /// Ask the active window to close
    CloseWindow,
    /// Toggle the active window's maximized state
    ToggleMaximize,
    /// Toggle the active window's fullscreen state
    ToggleFullscreen,
    /// Activate the next window in the current workspace
    NextWindow,
    /// Activate the previous window in the current workspace
    PreviousWindow,
    /// Switch to the next workspace
    NextWorkspace,
    /// Switch to the previous workspace
    PreviousWorkspace,
    /// Switch to a workspace by index
    SwitchWorkspace(usize),
}

impl Action {
    /// Parse a configuration action string
    pub fn parse(input: &str) -> Option<Action> {
        let input = input.trim();
        if let Some(command) = input.strip_prefix("spawn ") {
            let command = command.trim();
            if command.is_empty() {
                return None;
            }
            return Some(Action::Spawn(command.to_string()));
        }
        if let Some(index) = input.strip_prefix("workspace ") {
            return index.trim().parse().ok().map(Action::SwitchWorkspace);
        }
        Some(match input {
            "quit" => Action::Quit,
            "close-window" => Action::CloseWindow,
            "toggle-maximize" => Action::ToggleMaximize,
            "toggle-fullscreen" => Action::ToggleFullscreen,
            "next-window" => Action::NextWindow,
            "previous-window" => Action::PreviousWindow,
            "next-workspace" => Action::NextWorkspace,
            "previous-workspace" => Action::PreviousWorkspace,
            _ => return None,
        })
    }
}

/// One key binding record
#[derive(Debug, Clone)]
pub struct Keybinding {
    /// Modifiers that must be pressed
    pub modifiers: Modifiers,
    /// Modifiers considered in the comparison; empty means all of them
    pub mask: Modifiers,
    /// Bound keysym
    pub keysym: u32,
    /// Also match the upper/lowercase variants of the keysym
    pub ignore_case: bool,
    /// What the binding does
    pub action: Action,
}

impl Keybinding {
    /// Whether this binding matches the event
    pub fn matches(&self, modifiers: Modifiers, keysym: u32) -> bool {
        let mask = if self.mask.is_empty() {
            Modifiers::all()
        } else {
            self.mask
        };
        if (modifiers & mask) != self.modifiers {
            return false;
        }
        if keysym == self.keysym {
            return true;
        }
        self.ignore_case
            && (keysym == keysym_to_upper(self.keysym) || keysym == keysym_to_lower(self.keysym))
    }
}

/// The registration-ordered binding table
#[derive(Debug, Default)]
pub struct KeybindingSet {
    bindings: Vec<Keybinding>,
}

impl KeybindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding; later registrations lose ties
    pub fn add(&mut self, binding: Keybinding) {
        debug!(
            "Bound {:?}+{:#x} (ignore_case={}) to {:?}",
            binding.modifiers, binding.keysym, binding.ignore_case, binding.action
        );
        self.bindings.push(binding);
    }

    /// Matching bindings, in registration order
    ///
    /// The caller runs each candidate's action until one reports the key as
    /// consumed.
    pub fn candidates(
        &self,
        modifiers: Modifiers,
        keysym: u32,
    ) -> impl Iterator<Item = &Keybinding> {
        self.bindings
            .iter()
            .filter(move |binding| binding.matches(modifiers, keysym))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A_LOWER: u32 = 0x61;
    const KEY_A_UPPER: u32 = 0x41;

    fn ctrl_a_binding() -> Keybinding {
        Keybinding {
            modifiers: Modifiers::CTRL,
            mask: Modifiers::CTRL | Modifiers::SHIFT,
            keysym: KEY_A_UPPER,
            ignore_case: true,
            action: Action::Quit,
        }
    }

    #[test]
    fn test_masked_modifier_matching() {
        let binding = ctrl_a_binding();
        // Ctrl+a and Ctrl+A match through ignore_case
        assert!(binding.matches(Modifiers::CTRL, KEY_A_LOWER));
        assert!(binding.matches(Modifiers::CTRL, KEY_A_UPPER));
        // Alt is outside the mask, so it may be held
        assert!(binding.matches(Modifiers::CTRL | Modifiers::ALT, KEY_A_LOWER));
        // Shift is masked and must therefore be absent
        assert!(!binding.matches(Modifiers::CTRL | Modifiers::SHIFT, KEY_A_LOWER));
        // Missing ctrl never matches
        assert!(!binding.matches(Modifiers::empty(), KEY_A_UPPER));
    }

    #[test]
    fn test_empty_mask_means_all_modifiers() {
        let binding = Keybinding {
            modifiers: Modifiers::CTRL,
            mask: Modifiers::empty(),
            keysym: KEY_A_LOWER,
            ignore_case: false,
            action: Action::Quit,
        };
        assert!(binding.matches(Modifiers::CTRL, KEY_A_LOWER));
        // With the full mask every extra modifier disqualifies
        assert!(!binding.matches(Modifiers::CTRL | Modifiers::ALT, KEY_A_LOWER));
    }

    #[test]
    fn test_case_sensitive_binding() {
        let binding = Keybinding {
            ignore_case: false,
            ..ctrl_a_binding()
        };
        assert!(binding.matches(Modifiers::CTRL, KEY_A_UPPER));
        assert!(!binding.matches(Modifiers::CTRL, KEY_A_LOWER));
    }

    #[test]
    fn test_candidates_in_registration_order() {
        let mut set = KeybindingSet::new();
        set.add(Keybinding {
            action: Action::NextWindow,
            ..ctrl_a_binding()
        });
        set.add(Keybinding {
            action: Action::PreviousWindow,
            ..ctrl_a_binding()
        });
        let actions: Vec<_> = set
            .candidates(Modifiers::CTRL, KEY_A_LOWER)
            .map(|b| b.action.clone())
            .collect();
        assert_eq!(actions, vec![Action::NextWindow, Action::PreviousWindow]);
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(Action::parse("quit"), Some(Action::Quit));
        assert_eq!(
            Action::parse("spawn foot --maximized"),
            Some(Action::Spawn("foot --maximized".to_string()))
        );
        assert_eq!(Action::parse("workspace 3"), Some(Action::SwitchWorkspace(3)));
        assert_eq!(Action::parse("next-window"), Some(Action::NextWindow));
        assert_eq!(Action::parse("frobnicate"), None);
        assert_eq!(Action::parse("spawn "), None);
    }
}
