//! Configuration for ginsweep.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Configuration
//! is read from `~/.config/ginsweep/config.toml` and/or
//! `.ginsweep/config.toml` in the workspace directory.

use crate::gin::KeyMatch;
use crate::sweep::DEFAULT_MAX_COMBINATIONS;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GinsweepConfig {
    /// Sweep expansion and file generation.
    #[serde(default)]
    pub sweep: SweepSettings,
    /// Experiment directories and checkpoints.
    #[serde(default)]
    pub experiments: ExperimentSettings,
    /// External trainer invocation.
    #[serde(default)]
    pub trainer: TrainerSettings,
    /// Evaluation config defaults.
    #[serde(default)]
    pub eval: EvalSettings,
    /// Metric-log packaging.
    #[serde(default)]
    pub package: PackageSettings,
}

/// How generated gin files are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// `<experiment name><suffix>`.
    #[default]
    ExperimentName,
    /// `<index><suffix>`, counting from zero.
    Index,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Upper bound on combinations generated from one sweep file.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
    /// Binding-line matching policy.
    #[serde(default)]
    pub key_match: KeyMatch,
    /// Suffix of generated gin files.
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    #[serde(default)]
    pub naming: FileNaming,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            max_combinations: default_max_combinations(),
            key_match: KeyMatch::default(),
            file_suffix: default_file_suffix(),
            naming: FileNaming::default(),
        }
    }
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

fn default_file_suffix() -> String {
    ".gin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Directory base gin paths are resolved against.
    #[serde(default = "default_configs_root")]
    pub configs_root: PathBuf,
    /// Working directory handed to the trainer (defaults to `~/train_dir`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_dir: Option<PathBuf>,
    /// Permanent home of finished runs; must already exist.
    #[serde(default = "default_saved_models_dir")]
    pub saved_models_dir: PathBuf,
    /// Required suffix of checkpoint files seeded into the working directory.
    #[serde(default = "default_checkpoint_suffix")]
    pub checkpoint_suffix: String,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            configs_root: default_configs_root(),
            train_dir: None,
            saved_models_dir: default_saved_models_dir(),
            checkpoint_suffix: default_checkpoint_suffix(),
        }
    }
}

impl ExperimentSettings {
    /// Resolved working directory.
    pub fn train_dir(&self) -> PathBuf {
        if let Some(dir) = &self.train_dir {
            return dir.clone();
        }
        directories::BaseDirs::new()
            .map(|d| d.home_dir().join("train_dir"))
            .unwrap_or_else(|| PathBuf::from("train_dir"))
    }
}

fn default_configs_root() -> PathBuf {
    PathBuf::from("configs")
}

fn default_saved_models_dir() -> PathBuf {
    PathBuf::from("saved_models")
}

fn default_checkpoint_suffix() -> String {
    ".pkl.gz".to_string()
}

/// External trainer command. `{config}` and `{output_dir}` in `args` are
/// replaced with the rendered config path and the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSettings {
    #[serde(default = "default_trainer_program")]
    pub program: String,
    #[serde(default = "default_trainer_args")]
    pub args: Vec<String>,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            program: default_trainer_program(),
            args: default_trainer_args(),
        }
    }
}

fn default_trainer_program() -> String {
    "python3".to_string()
}

fn default_trainer_args() -> Vec<String> {
    vec![
        "-m".to_string(),
        "trax.trainer".to_string(),
        "--config_file={config}".to_string(),
        "--output_dir={output_dir}".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSettings {
    #[serde(default = "default_eval_steps")]
    pub eval_steps: u64,
    #[serde(default = "default_eval_batch_size")]
    pub eval_batch_size: u64,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            eval_steps: default_eval_steps(),
            eval_batch_size: default_eval_batch_size(),
        }
    }
}

fn default_eval_steps() -> u64 {
    49999
}

fn default_eval_batch_size() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    /// Substring a file name must contain to be packaged.
    #[serde(default = "default_package_pattern")]
    pub pattern: String,
    /// Directory archives are written to.
    #[serde(default = "default_package_save_dir")]
    pub save_dir: PathBuf,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            pattern: default_package_pattern(),
            save_dir: default_package_save_dir(),
        }
    }
}

fn default_package_pattern() -> String {
    "tfevents".to_string()
}

fn default_package_save_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Workspace-relative location of the config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".ginsweep").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `GINSWEEP_`)
/// 3. Workspace-local config (`.ginsweep/config.toml`)
/// 4. User config (`~/.config/ginsweep/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&GinsweepConfig>,
) -> Result<GinsweepConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(GinsweepConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ginsweep", "ginsweep") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // GINSWEEP_SWEEP__MAX_COMBINATIONS, GINSWEEP_TRAINER__PROGRAM, ...
    figment = figment.merge(Env::prefixed("GINSWEEP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
