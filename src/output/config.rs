//! Output configuration records and matching
//!
//! A persisted configuration record pairs an [`OutputDescription`] — the
//! identity keys used to recognize a display — with the
//! [`OutputAttributes`] to apply. Descriptions match either exactly
//! (persisted identity records) or by shell glob (default/fallback
//! records); resolution scans records in order and the first match wins.

use log::error;

use super::{Mode, Transform};

/// Identity keys for recognizing a display; every field is independently
/// present or a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputDescription {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
}

impl OutputDescription {
    fn fields<'a>(&'a self) -> [&'a Option<String>; 4] {
        [&self.name, &self.manufacturer, &self.model, &self.serial]
    }

    /// Exact equality over present fields
    ///
    /// Every field present on either side must be present on both with the
    /// same value, and at least one field pair must be present — a fully
    /// wildcard description never matches exactly, so identity records
    /// cannot degenerate into catch-alls.
    pub fn matches_exactly(&self, other: &OutputDescription) -> bool {
        let mut present_pairs = 0;
        for (mine, theirs) in self.fields().into_iter().zip(other.fields()) {
            match (mine, theirs) {
                (Some(a), Some(b)) => {
                    if a != b {
                        return false;
                    }
                    present_pairs += 1;
                }
                (None, None) => {}
                _ => return false,
            }
        }
        present_pairs > 0
    }

    /// Shell-glob match of this description against a live output's
    ///
    /// Every present field here must find the corresponding field on the
    /// output and glob-match it; absent fields impose no constraint, so an
    /// empty description matches any output.
    pub fn fnmatches(&self, output: &OutputDescription) -> bool {
        for (pattern, value) in self.fields().into_iter().zip(output.fields()) {
            let Some(pattern) = pattern else {
                continue;
            };
            match value {
                Some(value) if glob_match(pattern, value) => {}
                _ => return false,
            }
        }
        true
    }
}

/// The settings a configuration record applies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputAttributes {
    pub transformation: Transform,
    pub scale: f64,
    pub enabled: bool,
    pub position: Option<(i32, i32)>,
    pub mode: Option<Mode>,
}

impl Default for OutputAttributes {
    fn default() -> Self {
        Self {
            transformation: Transform::Normal,
            scale: 1.0,
            enabled: true,
            position: None,
            mode: None,
        }
    }
}

/// One persisted or default configuration record
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfigRecord {
    pub description: OutputDescription,
    pub attributes: OutputAttributes,
}

/// Resolve the record applying to a live output: first glob match in
/// record order wins
pub fn resolve_config<'a>(
    records: &'a [OutputConfigRecord],
    description: &OutputDescription,
) -> Option<&'a OutputConfigRecord> {
    records
        .iter()
        .find(|record| record.description.fnmatches(description))
}

/// Errors from decoding configuration fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed position '{0}', expected '<x>,<y>'")]
    MalformedPosition(String),
    #[error("malformed mode '{0}', expected '<width>x<height>[@<rate>]'")]
    MalformedMode(String),
    #[error("value out of range in '{0}'")]
    OutOfRange(String),
    #[error("unknown transformation '{0}'")]
    UnknownTransform(String),
    #[error("malformed glob pattern '{0}'")]
    MalformedGlob(String),
}

/// Decode a `"<x>,<y>"` position; both components must fit a signed 32-bit
/// range
pub fn decode_position(input: &str) -> Result<(i32, i32), DecodeError> {
    let result = (|| {
        let (x, y) = input.split_once(',')?;
        let x: i32 = x.parse().ok()?;
        let y: i32 = y.parse().ok()?;
        Some((x, y))
    })();
    result.ok_or_else(|| {
        error!("Failed to decode position '{}'", input);
        DecodeError::MalformedPosition(input.to_string())
    })
}

/// Decode a `"<width>x<height>[@<rate>]"` mode string
///
/// The rate is given in Hz, possibly fractional, and stored as mHz
/// truncated toward zero; an omitted rate decodes to 0, which lets the
/// hardware pick. Parsing is textual so no float rounding can flip a
/// milli-hertz digit.
pub fn decode_mode(input: &str) -> Result<Mode, DecodeError> {
    let malformed = || {
        error!("Failed to decode mode '{}'", input);
        DecodeError::MalformedMode(input.to_string())
    };

    let (size, rate) = match input.split_once('@') {
        Some((size, rate)) => (size, Some(rate)),
        None => (input, None),
    };
    let (width, height) = size.split_once('x').ok_or_else(malformed)?;
    let width: i32 = width.parse().map_err(|_| malformed())?;
    let height: i32 = height.parse().map_err(|_| malformed())?;
    if width <= 0 || height <= 0 {
        return Err(malformed());
    }

    let refresh = match rate {
        None => 0,
        Some(rate) => decode_refresh_mhz(rate).ok_or_else(|| {
            error!("Failed to decode refresh rate in mode '{}'", input);
            DecodeError::OutOfRange(input.to_string())
        })?,
    };
    Ok(Mode {
        width,
        height,
        refresh,
    })
}

/// Parse a decimal Hz rate into truncated mHz, digit by digit
fn decode_refresh_mhz(rate: &str) -> Option<i32> {
    let (whole, frac) = match rate.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (rate, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    // Truncation toward zero: only the first three fraction digits count
    let mut millis: i64 = 0;
    for (i, b) in frac.bytes().take(3).enumerate() {
        millis += i64::from(b - b'0') * 10_i64.pow(2 - i as u32);
    }
    let mhz = whole.checked_mul(1000)?.checked_add(millis)?;
    i32::try_from(mhz).ok()
}

/// Re-derive the position string from decoded components
pub fn format_position(x: i32, y: i32) -> String {
    format!("{},{}", x, y)
}

/// Shell-glob matching: `*`, `?`, and `[...]`/`[!...]` character classes
///
/// Iterative with star backtracking; an unterminated class falls back to
/// matching `[` literally, the way fnmatch(3) does.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        let step = if pi < p.len() {
            match p[pi] {
                '?' => Some(pi + 1),
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '[' => match match_class(&p, pi, t[ti]) {
                    Some((true, next)) => Some(next),
                    Some((false, _)) => None,
                    // Unterminated class: literal bracket
                    None => (p[pi] == t[ti]).then_some(pi + 1),
                },
                c => (c == t[ti]).then_some(pi + 1),
            }
        } else {
            None
        };
        match step {
            Some(next) => {
                pi = next;
                ti += 1;
            }
            None => match star {
                Some((star_pi, star_ti)) => {
                    // Let the star swallow one more character and retry
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Match one `[...]` class starting at `start`; returns (matched, index
/// after the class), or None when the class never terminates
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(p.get(i), Some('!') | Some('^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let item = *p.get(i)?;
        if item == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        if p.get(i + 1) == Some(&'-') && p.get(i + 2).is_some_and(|&e| e != ']') {
            let end = *p.get(i + 2)?;
            if item <= c && c <= end {
                matched = true;
            }
            i += 3;
        } else {
            if item == c {
                matched = true;
            }
            i += 1;
        }
    }
}

/// Validate a glob pattern at configuration-load time
pub fn validate_glob(pattern: &str) -> Result<(), DecodeError> {
    let p: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < p.len() {
        if p[i] == '[' {
            match match_class(&p, i, '\0') {
                Some((_, next)) => i = next,
                None => {
                    error!("Malformed glob pattern '{}'", pattern);
                    return Err(DecodeError::MalformedGlob(pattern.to_string()));
                }
            }
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> OutputDescription {
        OutputDescription {
            name: Some(name.to_string()),
            ..OutputDescription::default()
        }
    }

    #[test]
    fn test_exact_match_requires_a_present_field() {
        let empty = OutputDescription::default();
        // Vacuous equality is rejected
        assert!(!empty.matches_exactly(&empty));
        assert!(named("DP-1").matches_exactly(&named("DP-1")));
        assert!(!named("DP-1").matches_exactly(&named("DP-2")));
    }

    #[test]
    fn test_exact_match_fails_on_presence_mismatch() {
        let mut full = named("DP-1");
        full.serial = Some("1234".to_string());
        assert!(!full.matches_exactly(&named("DP-1")));
        assert!(!named("DP-1").matches_exactly(&full));
    }

    #[test]
    fn test_fnmatch_empty_description_matches_anything() {
        let empty = OutputDescription::default();
        assert!(empty.fnmatches(&named("whatever")));
        assert!(empty.fnmatches(&OutputDescription::default()));
    }

    #[test]
    fn test_fnmatch_globs_each_present_field() {
        let pattern = named("Oth*");
        assert!(pattern.fnmatches(&named("Other1")));
        assert!(!pattern.fnmatches(&named("Name1")));
        // A present pattern field needs the output to carry the field
        let mut by_serial = OutputDescription::default();
        by_serial.serial = Some("12*".to_string());
        assert!(!by_serial.fnmatches(&named("Other1")));
    }

    #[test]
    fn test_resolve_config_first_match_wins() {
        let records = vec![
            OutputConfigRecord {
                description: named("DP-*"),
                attributes: OutputAttributes {
                    scale: 2.0,
                    ..OutputAttributes::default()
                },
            },
            OutputConfigRecord {
                description: OutputDescription::default(),
                attributes: OutputAttributes::default(),
            },
        ];
        let hit = resolve_config(&records, &named("DP-3")).unwrap();
        assert_eq!(hit.attributes.scale, 2.0);
        // Falls through to the catch-all
        let hit = resolve_config(&records, &named("HDMI-1")).unwrap();
        assert_eq!(hit.attributes.scale, 1.0);
    }

    #[test]
    fn test_glob_basics() {
        assert!(glob_match("", ""));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*-1", "DP-1"));
        assert!(!glob_match("*-1", "DP-2"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXcYYb"));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob_match("DP-[0-9]", "DP-3"));
        assert!(!glob_match("DP-[0-9]", "DP-x"));
        assert!(glob_match("[!a]bc", "xbc"));
        assert!(!glob_match("[!a]bc", "abc"));
        assert!(glob_match("[]]", "]"));
    }

    #[test]
    fn test_glob_unterminated_class_is_literal() {
        assert!(glob_match("a[b", "a[b"));
        assert!(!glob_match("a[b", "ab"));
    }

    #[test]
    fn test_validate_glob() {
        assert!(validate_glob("DP-[0-9]*").is_ok());
        assert!(validate_glob("a[bc").is_err());
    }

    #[test]
    fn test_decode_position_roundtrip() {
        assert_eq!(decode_position("10,20"), Ok((10, 20)));
        assert_eq!(decode_position("-5,7"), Ok((-5, 7)));
        assert_eq!(format_position(10, 20), "10,20");
        assert_eq!(
            decode_position("2147483647,-2147483648"),
            Ok((i32::MAX, i32::MIN))
        );
    }

    #[test]
    fn test_decode_position_failures() {
        for bad in ["", "10", "10,", ",20", "a,b", "10,20,30", "2147483648,0"] {
            assert!(decode_position(bad).is_err(), "'{}' should fail", bad);
        }
    }

    #[test]
    fn test_decode_mode() {
        assert_eq!(
            decode_mode("1920x1080@60"),
            Ok(Mode {
                width: 1920,
                height: 1080,
                refresh: 60000
            })
        );
        // Fractional rates truncate toward zero at mHz precision
        assert_eq!(decode_mode("1x2@3.4").unwrap().refresh, 3400);
        assert_eq!(decode_mode("1x2@59.9999").unwrap().refresh, 59999);
        // Omitted rate lets the hardware pick
        assert_eq!(decode_mode("3x4").unwrap().refresh, 0);
    }

    #[test]
    fn test_decode_mode_failures() {
        for bad in [
            "",
            "1920",
            "x1080",
            "1920x",
            "1920x1080@",
            "1920x1080@-60",
            "0x1080",
            "1920x-1080",
            "axb",
            "1920x1080@abc",
            "1920x1080@2147484",
        ] {
            assert!(decode_mode(bad).is_err(), "'{}' should fail", bad);
        }
    }
}
