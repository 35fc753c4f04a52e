//! Line-oriented gin config patching.
//!
//! A gin file is treated as a list of physical lines. Overriding a binding
//! rewrites the first line that binds the key, or appends a new binding
//! when no line does. The source text is never modified in place; every
//! override produces a fresh [`GinConfig`].

use crate::value::GinValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a binding line is matched against an override key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMatch {
    /// The trimmed text left of the first `=` must equal the key.
    #[default]
    Exact,
    /// The trimmed line only has to start with the key. Kept for configs
    /// generated by older releases; `train.lr` also matches
    /// `train.lr_schedule = ...` in this mode.
    Prefix,
}

impl fmt::Display for KeyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatch::Exact => write!(f, "exact"),
            KeyMatch::Prefix => write!(f, "prefix"),
        }
    }
}

/// Parsed gin config text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GinConfig {
    lines: Vec<String>,
}

impl GinConfig {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Index of the first line binding `key`.
    pub fn find_binding(&self, key: &str, mode: KeyMatch) -> Option<usize> {
        self.lines.iter().position(|line| line_binds(line, key, mode))
    }

    /// Raw right-hand side of the first exact binding of `key`, without any
    /// trailing `# comment`.
    pub fn query(&self, key: &str) -> Option<&str> {
        let idx = self.find_binding(key, KeyMatch::Exact)?;
        self.lines[idx]
            .split_once('=')
            .map(|(_, rhs)| strip_inline_comment(rhs).trim())
    }

    /// Return a copy of this config with `key` bound to `value`.
    pub fn with_param(&self, key: &str, value: &GinValue, mode: KeyMatch) -> Self {
        let mut patched = self.clone();
        let line = binding_line(key, value);
        match patched.find_binding(key, mode) {
            Some(idx) => patched.lines[idx] = line,
            None => patched.lines.push(line),
        }
        patched
    }

    /// Apply every override in order.
    pub fn with_params<'a, I>(&self, overrides: I, mode: KeyMatch) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a GinValue)>,
    {
        overrides
            .into_iter()
            .fold(self.clone(), |cfg, (key, value)| cfg.with_param(key, value, mode))
    }
}

impl fmt::Display for GinConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// Format a single `key = literal` binding.
pub fn binding_line(key: &str, value: &GinValue) -> String {
    format!("{key} = {}", value.to_literal())
}

/// Cut `text` at the first `#` outside a quoted string.
fn strip_inline_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' => return &text[..i],
            None => {}
        }
    }
    text
}

fn line_binds(line: &str, key: &str, mode: KeyMatch) -> bool {
    let trimmed = line.trim();
    match mode {
        KeyMatch::Prefix => trimmed.starts_with(key),
        KeyMatch::Exact => {
            if trimmed.starts_with('#') {
                return false;
            }
            trimmed
                .split_once('=')
                .is_some_and(|(lhs, _)| lhs.trim() == key)
        }
    }
}

/// Render `base` with every override applied.
pub fn override_gin<'a, I>(base: &str, overrides: I, mode: KeyMatch) -> String
where
    I: IntoIterator<Item = (&'a str, &'a GinValue)>,
{
    GinConfig::parse(base).with_params(overrides, mode).to_string()
}
