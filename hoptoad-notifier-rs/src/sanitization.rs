//! # Parameter Sanitization
//!
//! Masks protected request parameters and re-encodes text so that every
//! value placed in a notice is plain ASCII.

use std::collections::{BTreeMap, HashSet};

/// Replacement for the value of every protected parameter
pub const MASK: &str = "********************";

/// Masks the values of a fixed set of parameter names.
///
/// Names are matched exactly and case-sensitively. The set is captured when
/// the redactor is built and never changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    protected: HashSet<String>,
}

impl Redactor {
    /// Creates a redactor protecting the given parameter names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protected: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if `name` is protected
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    /// Masks every protected entry of `params`
    pub fn redact(&self, mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
        for (key, value) in params.iter_mut() {
            if self.protected.contains(key) {
                *value = MASK.to_string();
            }
        }
        params
    }
}

/// Re-encodes text as ASCII, replacing every non-ASCII character with `?`
pub fn ascii_lossy(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// Encodes a raw parameter value for inclusion in a notice.
///
/// UTF-8 input is re-encoded with [`ascii_lossy`]. Anything else falls back to
/// an escaped byte-string representation of the raw value.
pub fn encode_value(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => ascii_lossy(text),
        Err(_) => debug_repr(raw),
    }
}

fn debug_repr(raw: &[u8]) -> String {
    let escaped: String = raw
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect();
    format!("b\"{}\"", escaped)
}
