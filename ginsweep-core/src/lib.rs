//! # ginsweep-core: hyperparameter sweeps over gin configs
//!
//! Expands a YAML sweep into concrete parameter combinations, patches them
//! into a base gin config, and drives one training run per combination.
//!
//! ## Layout
//!
//! 1. **Sweeps**: `value`, `sweep`, `gin`, `naming` turn a sweep file and a
//!    base config into named, rendered configs.
//! 2. **Orchestration**: `training` runs each rendered config through a
//!    [`Trainer`] and moves the output into the saved-models tree.
//! 3. **Artifacts**: `tensorboard` packages event files, `eval_gin` derives
//!    evaluation configs.

// Foundation
pub mod config;
pub mod error;

// Sweep expansion
pub mod gin;
pub mod naming;
pub mod sweep;
pub mod value;

// Orchestration
pub mod training;

// Artifacts
pub mod eval_gin;
pub mod tensorboard;

// Re-exports
pub use config::{GinsweepConfig, load_config};
pub use error::SweepError;
pub use eval_gin::{EvalOptions, eval_config_path, make_eval_config};
pub use gin::{GinConfig, KeyMatch, override_gin};
pub use naming::{exp_name_from_params, sanitize_filename};
pub use sweep::{
    DEFAULT_MAX_COMBINATIONS, ParamCombination, SweepSpec, expand, gin_configs_from_sweep,
};
pub use tensorboard::{PackageOptions, PackageReport, PlannedCopy, package_tfevents};
pub use training::{
    CommandTrainer, ExperimentConfig, ExperimentInstance, ExperimentRun, ExperimentSaver,
    Trainer, TrainingSession,
};
pub use value::GinValue;
