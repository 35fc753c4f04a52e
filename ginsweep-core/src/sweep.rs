//! Grid sweep expansion.
//!
//! A sweep maps gin parameter names to candidate values; expanding it
//! yields the full Cartesian product, one [`ParamCombination`] per point,
//! in the same order `itertools.product` would visit them (last key
//! varies fastest).

use crate::error::SweepError;
use crate::gin::{GinConfig, KeyMatch, binding_line};
use crate::value::GinValue;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Default limit on generated combinations.
pub const DEFAULT_MAX_COMBINATIONS: usize = 30;

/// Parameter name -> candidate values, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSpec {
    params: Vec<(String, Vec<GinValue>)>,
}

impl SweepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the candidates for `key`.
    pub fn with_param(mut self, key: impl Into<String>, values: Vec<GinValue>) -> Self {
        let key = key.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.params.push((key, values)),
        }
        self
    }

    pub fn params(&self) -> &[(String, Vec<GinValue>)] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Size of the Cartesian product, saturating at `usize::MAX`.
    pub fn combination_count(&self) -> usize {
        self.params
            .iter()
            .fold(1usize, |acc, (_, values)| acc.saturating_mul(values.len()))
    }

    /// Parse a YAML mapping of `name: [candidates...]`.
    pub fn from_yaml(text: &str) -> Result<Self, SweepError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        let map = match doc {
            serde_yaml::Value::Mapping(map) => map,
            // An empty document is an empty sweep.
            serde_yaml::Value::Null => return Ok(Self::new()),
            other => {
                return Err(SweepError::invalid_sweep(format!(
                    "expected a mapping of parameter names to lists, got {}",
                    yaml_kind(&other)
                )));
            }
        };

        let mut spec = Self::new();
        for (key, values) in map {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                other => {
                    return Err(SweepError::invalid_sweep(format!(
                        "parameter names must be strings, got {}",
                        yaml_kind(&other)
                    )));
                }
            };
            let candidates = match values {
                serde_yaml::Value::Sequence(items) => items
                    .into_iter()
                    .map(GinValue::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(SweepError::invalid_sweep(format!(
                        "candidates for '{key}' must be a list, got {}",
                        yaml_kind(&other)
                    )));
                }
            };
            spec = spec.with_param(key, candidates);
        }
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// One point of a sweep: each swept parameter bound to a single value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamCombination {
    params: Vec<(String, GinValue)>,
}

impl ParamCombination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key`, replacing an earlier binding of the same key in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<GinValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<GinValue>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&GinValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GinValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// `key = literal` lines, one per binding.
    pub fn binding_lines(&self) -> Vec<String> {
        self.iter().map(|(k, v)| binding_line(k, v)).collect()
    }

    /// SHA-256 over the rendered bindings, hex encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for line in self.binding_lines() {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Expand a sweep into every combination of its candidates.
pub fn expand(spec: &SweepSpec) -> Vec<ParamCombination> {
    let mut combos = vec![ParamCombination::new()];
    for (key, values) in spec.params() {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut c = combo.clone();
                c.params.push((key.clone(), value.clone()));
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

/// Expand `spec` and render one gin config per combination.
///
/// Fails before rendering anything when the sweep would produce more than
/// `max_combinations` configs, or none at all.
pub fn gin_configs_from_sweep(
    base_gin: &str,
    spec: &SweepSpec,
    max_combinations: usize,
    mode: KeyMatch,
) -> Result<Vec<(ParamCombination, String)>, SweepError> {
    let count = spec.combination_count();
    if count > max_combinations {
        return Err(SweepError::TooManyCombinations {
            count,
            max: max_combinations,
        });
    }
    if count == 0 {
        let empty = spec
            .params()
            .iter()
            .find(|(_, values)| values.is_empty())
            .map(|(k, _)| k.as_str())
            .unwrap_or_default();
        return Err(SweepError::invalid_sweep(format!(
            "parameter '{empty}' has no candidate values"
        )));
    }

    let base = GinConfig::parse(base_gin);
    let rendered = expand(spec)
        .into_iter()
        .map(|combo| {
            let text = base.with_params(combo.iter(), mode).to_string();
            debug!(
                bindings = combo.len(),
                lines = text.lines().count(),
                "Rendered gin config"
            );
            (combo, text)
        })
        .collect();
    Ok(rendered)
}
