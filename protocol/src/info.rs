//! Server info response parser
//!
//! Game servers answer the status query with `\key\value\key\value...`
//! text. Values are sanitized (control characters and `^x` color codes
//! stripped) and coerced to integer, float or text, in that order.

use crate::constants::PLAYER_COUNT_KEY;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// A coerced info value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl InfoValue {
    /// Classify an already sanitized value
    pub fn coerce(value: &str) -> Self {
        if is_digits(value) {
            if let Ok(n) = value.parse::<i64>() {
                return Self::Integer(n);
            }
        } else if let Some((whole, frac)) = value.split_once('.') {
            if is_digits(whole) && is_digits(frac) {
                if let Ok(f) = value.parse::<f64>() {
                    return Self::Float(f);
                }
            }
        }
        Self::Text(value.to_string())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Insertion-ordered key/value record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedInfo {
    entries: Vec<(String, InfoValue)>,
}

impl ParsedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position
    pub fn insert(&mut self, key: impl Into<String>, value: InfoValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Player count, when the server reported it as an integer
    pub fn player_count(&self) -> Option<i64> {
        self.get(PLAYER_COUNT_KEY).and_then(InfoValue::as_integer)
    }
}

impl Serialize for ParsedInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Strip control characters and color codes, replace backslashes
pub fn sanitize(value: &str) -> String {
    let printable: String = value
        .chars()
        .filter(|&c| c >= '\u{20}' || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let mut out = String::with_capacity(printable.len());
    let mut chars = printable.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_digit() || next.is_ascii_lowercase() {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(if c == '\\' { '/' } else { c });
    }
    out
}

/// Parse one raw status payload
pub fn parse(payload: &[u8]) -> ParsedInfo {
    let text = String::from_utf8_lossy(payload);
    let mut tokens = text.split('\\').peekable();
    if tokens.peek() == Some(&"") {
        tokens.next();
    }

    let mut info = ParsedInfo::new();
    while let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
        info.insert(key, InfoValue::coerce(&sanitize(value)));
    }
    info
}
