//! Path-pattern compiler.
//!
//! A pattern is a slash-delimited template. Within a segment, `#NAME`
//! denotes an integer wildcard (`[0-9]+`) and `:NAME` a string wildcard
//! (`[^/]+`); anything else matches literally. Wildcards may be embedded in
//! a segment (`:INPUT_ID.txt`). Matching is whole-string and anchored.
//!
//! On a match, each wildcard yields a typed binding. Names are
//! `UPPER_SNAKE` in the pattern and canonicalized to lowerCamel when bound
//! (`TAB_ID` → `tabId`).

use std::collections::HashMap;

use regex::Regex;

use crate::errno::{FsError, FsResult};

/// A typed value bound from a wildcard segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Int(i64),
    Str(String),
}

/// Variables bound by a successful match, keyed by canonicalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(HashMap<String, VarValue>);

impl Bindings {
    /// Look up an integer variable. Missing or mistyped variables are a
    /// route-authoring bug, surfaced as `EIO` rather than a panic.
    pub fn int(&self, name: &str) -> FsResult<i64> {
        match self.0.get(name) {
            Some(VarValue::Int(n)) => Ok(*n),
            _ => Err(FsError::io(format!("missing int variable {name}"))),
        }
    }

    /// Look up a string variable.
    pub fn str(&self, name: &str) -> FsResult<&str> {
        match self.0.get(name) {
            Some(VarValue::Str(s)) => Ok(s),
            _ => Err(FsError::io(format!("missing string variable {name}"))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&VarValue> {
        self.0.get(name)
    }
}

/// Capture-group names cannot carry the `#`/`:` sigil, so the wildcard type
/// rides along as a name prefix.
const INT_PREFIX: &str = "I_";
const STR_PREFIX: &str = "S_";

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern string.
    ///
    /// Compilation is total for the patterns the catalog uses; a malformed
    /// pattern is a programming error and panics at table construction, not
    /// at request time.
    pub fn compile(pattern: &str) -> Self {
        let mut expr = String::from("^");
        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                expr.push('/');
            }
            expr.push_str(&compile_segment(segment));
        }
        expr.push('$');
        let regex = Regex::new(&expr)
            .unwrap_or_else(|e| panic!("invalid route pattern {pattern:?}: {e}"));
        Self {
            source: pattern.to_string(),
            regex,
        }
    }

    /// The original pattern string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match a path. `None` means "no match", never an error. A wildcard
    /// whose integer parse fails does not match.
    pub fn try_match(&self, path: &str) -> Option<Bindings> {
        let caps = self.regex.captures(path)?;
        let mut vars = HashMap::new();
        for name in self.regex.capture_names().flatten() {
            let text = caps.name(name)?.as_str();
            if let Some(snake) = name.strip_prefix(INT_PREFIX) {
                let value = text.parse::<i64>().ok()?;
                vars.insert(canonicalize(snake), VarValue::Int(value));
            } else if let Some(snake) = name.strip_prefix(STR_PREFIX) {
                vars.insert(canonicalize(snake), VarValue::Str(text.to_string()));
            }
        }
        Some(Bindings(vars))
    }
}

/// Compile one segment: wildcard tokens become named captures, everything
/// else is escaped literally.
fn compile_segment(segment: &str) -> String {
    let mut out = String::new();
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let sigil = bytes[i];
        if sigil == b'#' || sigil == b':' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_uppercase() || bytes[end] == b'_') {
                end += 1;
            }
            if end > start {
                let name = &segment[start..end];
                if sigil == b'#' {
                    out.push_str(&format!("(?P<{INT_PREFIX}{name}>[0-9]+)"));
                } else {
                    out.push_str(&format!("(?P<{STR_PREFIX}{name}>[^/]+)"));
                }
                i = end;
                continue;
            }
        }
        let ch = &segment[i..i + utf8_len(bytes[i])];
        out.push_str(&regex::escape(ch));
        i += ch.len();
    }
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b < 0xe0 => 2,
        b if b < 0xf0 => 3,
        _ => 4,
    }
}

/// `TAB_ID` → `tabId`: lowercase, drop each underscore, uppercase the
/// letter that followed it.
fn canonicalize(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}
