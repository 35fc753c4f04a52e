//! Turn a training config into an evaluation-only config.
//!
//! The evaluation run resumes from a checkpoint, trains for exactly one more
//! step with a zero learning rate, and evaluates on that step.

use crate::error::SweepError;
use crate::gin::{GinConfig, KeyMatch};
use crate::value::GinValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix that replaces the extension of the source config.
pub const EVAL_SUFFIX: &str = "_eval.gin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalOptions {
    pub eval_steps: u64,
    pub eval_batch_size: u64,
    /// Checkpoint step to resume from; `0` reuses the config's `train.steps`.
    pub steps: u64,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            eval_steps: 49999,
            eval_batch_size: 1,
            steps: 0,
        }
    }
}

fn base_steps(base: &GinConfig) -> Result<i64, SweepError> {
    let raw = base
        .query("train.steps")
        .ok_or_else(|| SweepError::invalid_input("train.steps is not bound"))?;
    GinValue::parse_scalar(raw)
        .as_i64()
        .ok_or_else(|| SweepError::invalid_input(format!("train.steps is not an integer: {raw}")))
}

fn to_int(v: u64) -> GinValue {
    GinValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
}

/// Render the evaluation config for `base_text`.
pub fn make_eval_config(base_text: &str, opts: &EvalOptions) -> Result<String, SweepError> {
    let base = GinConfig::parse(base_text);
    let steps = if opts.steps == 0 {
        base_steps(&base)?
    } else {
        i64::try_from(opts.steps)
            .map_err(|_| SweepError::invalid_input(format!("steps out of range: {}", opts.steps)))?
    };
    debug!(steps, eval_steps = opts.eval_steps, "Building eval config");

    let overrides = [
        ("train.steps", GinValue::Int(steps.saturating_add(1))),
        ("batcher.eval_batch_size", to_int(opts.eval_batch_size)),
        ("train.eval_steps", to_int(opts.eval_steps)),
        ("train.eval_frequency", GinValue::Int(1)),
        ("train.optimizer", GinValue::reference("trax.optimizers.SGD")),
        (
            "train.lr_schedule_fn",
            GinValue::reference("trax.supervised.lr_schedules.constant"),
        ),
        ("trax.supervised.lr_schedules.constant.value", GinValue::Float(0.0)),
    ];
    let patched = base.with_params(overrides.iter().map(|(k, v)| (*k, v)), KeyMatch::Exact);
    Ok(patched.to_string())
}

/// `dir/base.gin` -> `dir/base_eval.gin`.
pub fn eval_config_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{EVAL_SUFFIX}"))
}
