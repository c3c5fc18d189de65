//! Configuration loading
//!
//! Declarative TOML records with per-field defaults. String-encoded fields
//! (positions, modes, colors, key names) decode through dedicated parsers;
//! any malformed field fails the enclosing record as a whole, so a partially
//! decoded configuration is never applied.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use xkbcommon::xkb;

use crate::input::Modifiers;
use crate::output::config::{
    decode_mode, decode_position, validate_glob, DecodeError, OutputAttributes,
    OutputConfigRecord, OutputDescription,
};
use crate::output::Transform;
use crate::scene::Color;
use crate::server::keybinding::{Action, Keybinding};
use crate::toolkit::WindowStyle;

/// Errors from loading or resolving the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("malformed color '{0}', expected '#rrggbb' or '#rrggbbaa'")]
    MalformedColor(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server-wide settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Decoration styling
    #[serde(default)]
    pub style: StyleConfig,

    /// Per-output configuration records, resolution order
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,

    /// Key bindings, registration order
    #[serde(default)]
    pub keybindings: Vec<KeybindingEntry>,

    /// Command lines launched once at startup
    #[serde(default)]
    pub autostart: Vec<String>,
}

/// Server-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Workspace names, in switching order
    #[serde(default = "ServerConfig::default_workspaces")]
    pub workspaces: Vec<String>,

    /// Pixels reserved along workspace edges occupied by anchored docks
    #[serde(default = "ServerConfig::default_edge_reserve")]
    pub edge_reserve: i32,
}

impl ServerConfig {
    fn default_workspaces() -> Vec<String> {
        vec!["main".to_string()]
    }

    fn default_edge_reserve() -> i32 {
        64
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workspaces: Self::default_workspaces(),
            edge_reserve: Self::default_edge_reserve(),
        }
    }
}

/// Decoration styling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleConfig {
    /// Title bar height in pixels; 0 disables server-side decoration
    #[serde(default = "StyleConfig::default_titlebar_height")]
    pub titlebar_height: i32,

    /// Title bar color of the active window
    #[serde(default = "StyleConfig::default_titlebar_active")]
    pub titlebar_active: String,

    /// Title bar color of inactive windows
    #[serde(default = "StyleConfig::default_titlebar_inactive")]
    pub titlebar_inactive: String,

    /// Workspace background color
    #[serde(default = "StyleConfig::default_background")]
    pub background: String,
}

impl StyleConfig {
    fn default_titlebar_height() -> i32 {
        24
    }

    fn default_titlebar_active() -> String {
        "#363636".to_string()
    }

    fn default_titlebar_inactive() -> String {
        "#606060".to_string()
    }

    fn default_background() -> String {
        "#204a87".to_string()
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            titlebar_height: Self::default_titlebar_height(),
            titlebar_active: Self::default_titlebar_active(),
            titlebar_inactive: Self::default_titlebar_inactive(),
            background: Self::default_background(),
        }
    }
}

/// One persisted output record
///
/// The match keys (`Name`, `Manufacturer`, `Model`, `Serial`) are
/// string-or-wildcard; the remaining keys are the attributes to apply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct OutputEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl OutputEntry {
    /// Decode into a domain record; any malformed field fails the record
    pub fn resolve(&self) -> Result<OutputConfigRecord, ConfigError> {
        for pattern in [&self.name, &self.manufacturer, &self.model, &self.serial]
            .into_iter()
            .flatten()
        {
            validate_glob(pattern)?;
        }
        let transformation = match &self.transformation {
            None => Transform::Normal,
            Some(name) => Transform::from_config_name(name)
                .ok_or_else(|| DecodeError::UnknownTransform(name.clone()))?,
        };
        let position = self
            .position
            .as_deref()
            .map(decode_position)
            .transpose()?;
        let mode = self.mode.as_deref().map(decode_mode).transpose()?;
        Ok(OutputConfigRecord {
            description: OutputDescription {
                name: self.name.clone(),
                manufacturer: self.manufacturer.clone(),
                model: self.model.clone(),
                serial: self.serial.clone(),
            },
            attributes: OutputAttributes {
                transformation,
                scale: self.scale.unwrap_or(1.0),
                enabled: self.enabled.unwrap_or(true),
                position,
                mode,
            },
        })
    }
}

/// One key-binding record
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct KeybindingEntry {
    /// Modifiers that must be held
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Modifiers taken into account when matching; empty means all
    #[serde(default)]
    pub mask: Vec<String>,

    /// XKB keysym name, e.g. "Return", "F1", "a"
    pub key: String,

    /// Also match the other case of the bound key
    #[serde(default)]
    pub ignore_case: bool,

    /// Action string, e.g. "next-window" or "spawn foot"
    pub action: String,
}

impl KeybindingEntry {
    /// Decode into a binding record
    pub fn resolve(&self) -> Result<Keybinding, ConfigError> {
        let modifiers = parse_modifiers(&self.modifiers)?;
        let mask = parse_modifiers(&self.mask)?;
        let keysym = parse_keysym(&self.key)?;
        let action = Action::parse(&self.action)
            .ok_or_else(|| ConfigError::UnknownAction(self.action.clone()))?;
        Ok(Keybinding {
            modifiers,
            mask,
            keysym,
            ignore_case: self.ignore_case,
            action,
        })
    }
}

fn parse_modifiers(names: &[String]) -> Result<Modifiers, ConfigError> {
    let mut modifiers = Modifiers::empty();
    for name in names {
        modifiers |= match name.as_str() {
            "Shift" => Modifiers::SHIFT,
            "Ctrl" | "Control" => Modifiers::CTRL,
            "Alt" | "Mod1" => Modifiers::ALT,
            "Logo" | "Super" | "Mod4" => Modifiers::LOGO,
            "CapsLock" => Modifiers::CAPS,
            other => return Err(ConfigError::UnknownModifier(other.to_string())),
        };
    }
    Ok(modifiers)
}

fn parse_keysym(name: &str) -> Result<u32, ConfigError> {
    let keysym = xkb::keysym_from_name(name, xkb::KEYSYM_NO_FLAGS);
    if keysym.raw() != 0 {
        return Ok(keysym.raw());
    }
    let keysym = xkb::keysym_from_name(name, xkb::KEYSYM_CASE_INSENSITIVE);
    if keysym.raw() != 0 {
        warn!("Key name '{}' resolved only case-insensitively", name);
        return Ok(keysym.raw());
    }
    Err(ConfigError::UnknownKey(name.to_string()))
}

/// Parse a `#rrggbb` or `#rrggbbaa` color
pub fn parse_color(input: &str) -> Result<Color, ConfigError> {
    let malformed = || ConfigError::MalformedColor(input.to_string());
    let hex = input.strip_prefix('#').ok_or_else(malformed)?;
    if hex.len() != 6 && hex.len() != 8 {
        return Err(malformed());
    }
    let byte = |range: std::ops::Range<usize>| -> Result<u8, ConfigError> {
        u8::from_str_radix(hex.get(range).ok_or_else(malformed)?, 16).map_err(|_| malformed())
    };
    Ok(Color {
        r: byte(0..2)?,
        g: byte(2..4)?,
        b: byte(4..6)?,
        a: if hex.len() == 8 { byte(6..8)? } else { 0xff },
    })
}

impl Config {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse a configuration from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Decode all output records; the first malformed record fails the lot
    pub fn output_records(&self) -> Result<Vec<OutputConfigRecord>, ConfigError> {
        self.outputs.iter().map(OutputEntry::resolve).collect()
    }

    /// Decode all key bindings, in registration order
    pub fn bindings(&self) -> Result<Vec<Keybinding>, ConfigError> {
        self.keybindings
            .iter()
            .map(KeybindingEntry::resolve)
            .collect()
    }

    /// Decode the decoration style
    pub fn window_style(&self) -> Result<WindowStyle, ConfigError> {
        Ok(WindowStyle {
            titlebar_height: self.style.titlebar_height,
            titlebar_active: parse_color(&self.style.titlebar_active)?,
            titlebar_inactive: parse_color(&self.style.titlebar_inactive)?,
        })
    }

    /// Decode the workspace background color
    pub fn background_color(&self) -> Result<Color, ConfigError> {
        parse_color(&self.style.background)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::output::Mode;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.server.workspaces, vec!["main"]);
        assert_eq!(config.server.edge_reserve, 64);
        assert!(config.outputs.is_empty());
        assert!(config.keybindings.is_empty());
        let style = config.window_style().unwrap();
        assert_eq!(style.titlebar_height, 24);
    }

    #[test]
    fn test_full_output_record() {
        let config = Config::from_str(
            r#"
            [[outputs]]
            Name = "DP-[0-9]"
            Transformation = "FlipAndRotate90"
            Scale = 2.0
            Enabled = false
            Position = "1920,0"
            Mode = "2560x1440@59.97"
            "#,
        )
        .unwrap();
        let records = config.output_records().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.description.name.as_deref(), Some("DP-[0-9]"));
        assert_eq!(record.attributes.transformation, Transform::Flipped90);
        assert_eq!(record.attributes.scale, 2.0);
        assert!(!record.attributes.enabled);
        assert_eq!(record.attributes.position, Some((1920, 0)));
        assert_eq!(
            record.attributes.mode,
            Some(Mode {
                width: 2560,
                height: 1440,
                refresh: 59970,
            })
        );
    }

    #[test]
    fn test_malformed_position_fails_whole_resolution() {
        let config = Config::from_str(
            r#"
            [[outputs]]
            Name = "DP-1"

            [[outputs]]
            Name = "DP-2"
            Position = "12;34"
            "#,
        )
        .unwrap();
        assert!(config.output_records().is_err());
    }

    #[test]
    fn test_unknown_transformation_rejected() {
        let config = Config::from_str(
            r#"
            [[outputs]]
            Transformation = "Sideways"
            "#,
        )
        .unwrap();
        assert!(config.output_records().is_err());
    }

    #[test]
    fn test_unknown_output_key_rejected() {
        assert!(Config::from_str(
            r#"
            [[outputs]]
            Nmae = "DP-1"
            "#,
        )
        .is_err());
    }

    #[test]
    fn test_keybinding_resolution() {
        let config = Config::from_str(
            r#"
            [[keybindings]]
            modifiers = ["Ctrl", "Alt"]
            key = "Return"
            action = "spawn foot"

            [[keybindings]]
            modifiers = ["Logo"]
            mask = ["Logo", "Shift"]
            key = "a"
            ignore_case = true
            action = "next-window"
            "#,
        )
        .unwrap();
        let bindings = config.bindings().unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].modifiers, Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(bindings[0].action, Action::Spawn("foot".to_string()));
        assert!(bindings[0].mask.is_empty());
        assert_eq!(bindings[1].mask, Modifiers::LOGO | Modifiers::SHIFT);
        assert_eq!(bindings[1].keysym, 0x61);
        assert!(bindings[1].ignore_case);
    }

    #[test]
    fn test_unknown_binding_pieces_rejected() {
        let bad_modifier = KeybindingEntry {
            modifiers: vec!["Hyper2".to_string()],
            key: "a".to_string(),
            action: "quit".to_string(),
            ..KeybindingEntry::default()
        };
        assert!(bad_modifier.resolve().is_err());

        let bad_key = KeybindingEntry {
            key: "NotAKeyName".to_string(),
            action: "quit".to_string(),
            ..KeybindingEntry::default()
        };
        assert!(bad_key.resolve().is_err());

        let bad_action = KeybindingEntry {
            key: "a".to_string(),
            action: "warp-ten".to_string(),
            ..KeybindingEntry::default()
        };
        assert!(bad_action.resolve().is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff8000").unwrap(), Color::rgba(0xff, 0x80, 0, 0xff));
        assert_eq!(
            parse_color("#11223344").unwrap(),
            Color::rgba(0x11, 0x22, 0x33, 0x44)
        );
        for bad in ["ff8000", "#ff80", "#gg0000", "#ff80001"] {
            assert!(parse_color(bad).is_err(), "'{}' should fail", bad);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nworkspaces = [\"web\", \"code\"]\nedge_reserve = 32"
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.workspaces, vec!["web", "code"]);
        assert_eq!(config.server.edge_reserve, 32);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("/nonexistent/trellis.toml").is_err());
    }
}
