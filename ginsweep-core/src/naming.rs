//! Experiment names derived from sweep combinations.
//!
//! Names are meant for humans and for path components. Each binding
//! contributes `<last key segment>_<value>`, so `{"train.lr": 0.1}` becomes
//! `lr__0.1`. Distinct combinations can collapse onto the same name once
//! sanitized; callers needing on-disk uniqueness should fall back to
//! [`ParamCombination::content_hash`].

use crate::sweep::ParamCombination;
use crate::value::GinValue;

/// Name used for the empty combination.
pub const DEFAULT_EXPERIMENT_NAME: &str = "default";

const MAX_NAME_BYTES: usize = 255;

const INVALID_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Derive a filesystem-safe experiment name from a combination.
pub fn exp_name_from_params(params: &ParamCombination) -> String {
    if params.is_empty() {
        return DEFAULT_EXPERIMENT_NAME.to_string();
    }

    let joined = params
        .iter()
        .map(|(key, value)| {
            format!("{}_{}", shortened_param_name(key), sanitize_value(value))
        })
        .collect::<Vec<_>>()
        .join("_");
    sanitize_filename(&joined)
}

/// Last dotted segment of a gin key (`train.lr` -> `lr`).
pub fn shortened_param_name(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

fn sanitize_value(value: &GinValue) -> String {
    match value {
        GinValue::Str(s) => format!("_{s}"),
        GinValue::List(items) | GinValue::Tuple(items) => items
            .iter()
            .map(sanitize_value)
            .collect::<Vec<_>>()
            .join("__"),
        GinValue::Dict(entries) => entries
            .iter()
            .map(|(k, _)| sanitize_value(k))
            .collect::<Vec<_>>()
            .join("__"),
        other => format!("_{}", other.to_literal()),
    }
}

/// Strip characters that are illegal in a path component on any common
/// platform, drop trailing dots and spaces, and cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !INVALID_CHARS.contains(c))
        .collect();

    if cleaned.len() > MAX_NAME_BYTES {
        let mut end = MAX_NAME_BYTES;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
    cleaned.truncate(trimmed_len);

    if cleaned.is_empty() {
        return DEFAULT_EXPERIMENT_NAME.to_string();
    }

    // Device names are reserved whatever the extension (`aux.txt`). An
    // existing trailing `_` already marks the name as escaped.
    let stem = cleaned.split('.').next().unwrap_or_default();
    let reserved = RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem));
    if reserved && !cleaned.ends_with('_') {
        while cleaned.len() + 1 > MAX_NAME_BYTES {
            cleaned.pop();
        }
        cleaned.push('_');
    }
    cleaned
}
