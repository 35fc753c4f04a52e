//! Experiments: a base gin config plus a sweep, run one combination at a time.

use crate::error::SweepError;
use crate::gin::{GinConfig, KeyMatch};
use crate::naming::exp_name_from_params;
use crate::sweep::{ParamCombination, SweepSpec, expand};
use crate::training::registry::{ExperimentRecord, ExperimentRegistry, RunStatus};
use crate::training::runner::{Trainer, TrainingSession};
use crate::training::saver::ExperimentSaver;
use crate::value::GinValue;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Read a base gin config addressed relative to `configs_root`.
pub fn load_base_gin(gin_repo_path: &Path, configs_root: &Path) -> Result<String, SweepError> {
    let path = configs_root.join(gin_repo_path);
    std::fs::read_to_string(&path)
        .map_err(|e| SweepError::not_found(format!("base gin {}: {e}", path.display())))
}

/// One combination of an experiment's sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentInstance {
    base_gin_path: PathBuf,
    sweep_override: ParamCombination,
}

impl ExperimentInstance {
    pub fn new(base_gin_path: PathBuf, sweep_override: ParamCombination) -> Self {
        Self {
            base_gin_path,
            sweep_override,
        }
    }

    pub fn base_gin_path(&self) -> &Path {
        &self.base_gin_path
    }

    pub fn sweep_override(&self) -> &ParamCombination {
        &self.sweep_override
    }

    /// `<config dir>#<config stem>@<sweep suffix>`, e.g. `lm#reformer@lr__0.1`.
    pub fn name(&self) -> String {
        format!(
            "{}@{}",
            self.repo_path_prefix(),
            exp_name_from_params(&self.sweep_override)
        )
    }

    fn repo_path_prefix(&self) -> String {
        let stem = self
            .base_gin_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = self
            .base_gin_path
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned());
        match dir {
            Some(dir) => format!("{dir}#{stem}"),
            None => stem,
        }
    }
}

impl fmt::Display for ExperimentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A sweep over a base config, saved under a branch name.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub branch_name: String,
    pub base_gin_path: PathBuf,
    pub sweep: SweepSpec,
}

impl ExperimentConfig {
    pub fn new(branch_name: impl Into<String>, base_gin_path: PathBuf, sweep: SweepSpec) -> Self {
        Self {
            branch_name: branch_name.into(),
            base_gin_path,
            sweep,
        }
    }

    pub fn generate_experiment_instances(&self) -> impl Iterator<Item = ExperimentInstance> {
        expand(&self.sweep)
            .into_iter()
            .map(|combo| ExperimentInstance::new(self.base_gin_path.clone(), combo))
    }
}

/// Options for a single [`ExperimentRun::run_instance`] call.
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions<'a> {
    pub save: bool,
    pub model: Option<&'a str>,
    pub checkpoint_path: Option<&'a Path>,
    pub clear_train_dir: bool,
}

/// Drives every instance of an [`ExperimentConfig`] through a [`Trainer`].
pub struct ExperimentRun {
    config: ExperimentConfig,
    saver: ExperimentSaver,
    base_gin: GinConfig,
    checkpoint_path: Option<PathBuf>,
    key_match: KeyMatch,
    max_combinations: usize,
    registry_path: Option<PathBuf>,
}

impl ExperimentRun {
    /// `checkpoint_path`, when given, must end with `checkpoint_suffix`.
    pub fn new(
        config: ExperimentConfig,
        saver: ExperimentSaver,
        base_gin: &str,
        checkpoint_path: Option<PathBuf>,
        checkpoint_suffix: &str,
    ) -> Result<Self, SweepError> {
        if let Some(ckpt) = &checkpoint_path
            && !ckpt.to_string_lossy().ends_with(checkpoint_suffix)
        {
            return Err(SweepError::invalid_input(format!(
                "checkpoint {} does not end with {checkpoint_suffix}",
                ckpt.display()
            )));
        }
        Ok(Self {
            config,
            saver,
            base_gin: GinConfig::parse(base_gin),
            checkpoint_path,
            key_match: KeyMatch::default(),
            max_combinations: usize::MAX,
            registry_path: None,
        })
    }

    pub fn with_key_match(mut self, mode: KeyMatch) -> Self {
        self.key_match = mode;
        self
    }

    pub fn with_max_combinations(mut self, max: usize) -> Self {
        self.max_combinations = max;
        self
    }

    /// Append an [`ExperimentRecord`] to the JSON ledger at `path` after
    /// every instance run by [`ExperimentRun::run`].
    pub fn with_registry(mut self, path: PathBuf) -> Self {
        self.registry_path = Some(path);
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn saver(&self) -> &ExperimentSaver {
        &self.saver
    }

    /// Render the gin config for `instance`, optionally swapping the model.
    pub fn render(&self, instance: &ExperimentInstance, model: Option<&str>) -> String {
        let mut cfg = self
            .base_gin
            .with_params(instance.sweep_override().iter(), self.key_match);
        if let Some(model) = model {
            let model_ref = GinValue::reference(format!("trax.models.{model}"));
            cfg = cfg.with_param("train.model", &model_ref, self.key_match);
        }
        cfg.to_string()
    }

    /// Run every instance in sweep order. The first failure aborts the rest.
    pub fn run(
        &self,
        trainer: &mut dyn Trainer,
        save: bool,
        model: Option<&str>,
    ) -> Result<Vec<(ExperimentInstance, TrainingSession)>, SweepError> {
        let count = self.config.sweep.combination_count();
        if count > self.max_combinations {
            return Err(SweepError::TooManyCombinations {
                count,
                max: self.max_combinations,
            });
        }

        let mut sessions = Vec::new();
        for instance in self.config.generate_experiment_instances() {
            let opts = InstanceOptions {
                save,
                model,
                checkpoint_path: self.checkpoint_path.as_deref(),
                clear_train_dir: true,
            };
            let result = self.run_instance(trainer, &instance, &opts);
            let recorded = self.record(&instance, &result);
            match result {
                Ok(session) => {
                    recorded?;
                    sessions.push((instance, session));
                }
                Err(e) => {
                    error!(experiment = %instance, error = %e, "Experiment failed");
                    // The training error is what the caller needs to see.
                    if let Err(record_err) = recorded {
                        warn!(
                            experiment = %instance,
                            error = %record_err,
                            "Failed to record experiment"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(sessions)
    }

    fn record(
        &self,
        instance: &ExperimentInstance,
        result: &Result<TrainingSession, SweepError>,
    ) -> Result<(), SweepError> {
        let Some(path) = &self.registry_path else {
            return Ok(());
        };
        let (status, session, err) = match result {
            Ok(session) => (RunStatus::Completed, Some(session), None),
            Err(e) => (RunStatus::Failed, None, Some(e.to_string())),
        };
        let combo = instance.sweep_override();
        let record = ExperimentRecord {
            name: instance.name(),
            branch_name: self.config.branch_name.clone(),
            base_gin_path: instance.base_gin_path().to_path_buf(),
            overrides: combo.binding_lines(),
            content_hash: combo.content_hash(),
            status,
            session_id: session.map(|s| s.id.clone()),
            saved_to: session.and_then(|s| s.saved_to.clone()),
            error: err,
            recorded_at: chrono::Utc::now(),
        };
        ExperimentRegistry::append(path, record)
    }

    /// Run one instance: clear, seed, train, then move the output when saving.
    pub fn run_instance(
        &self,
        trainer: &mut dyn Trainer,
        instance: &ExperimentInstance,
        opts: &InstanceOptions<'_>,
    ) -> Result<TrainingSession, SweepError> {
        if opts.clear_train_dir {
            self.saver.clear_train_dir()?;
        }
        if let Some(ckpt) = opts.checkpoint_path {
            self.saver.load_checkpoint_from_path(ckpt)?;
        }

        info!(experiment = %instance, branch = %self.config.branch_name, "Running experiment");
        let rendered = self.render(instance, opts.model);
        let mut session = trainer.train(&rendered, self.saver.output_dir())?;

        if opts.save {
            let dest = self.saver.save_as(&self.config.branch_name, instance)?;
            session.saved_to = Some(dest);
        }
        Ok(session)
    }

    /// Evaluate `overrides` for `n_steps` in the current working directory,
    /// without clearing or saving it.
    pub fn eval(
        &self,
        trainer: &mut dyn Trainer,
        n_steps: i64,
        overrides: ParamCombination,
        load_checkpoint: bool,
    ) -> Result<TrainingSession, SweepError> {
        let overrides = overrides.with("train.eval_steps", n_steps);
        let instance = ExperimentInstance::new(self.config.base_gin_path.clone(), overrides);
        let checkpoint_path = if load_checkpoint {
            self.checkpoint_path.as_deref()
        } else {
            None
        };
        let opts = InstanceOptions {
            save: false,
            model: None,
            checkpoint_path,
            clear_train_dir: false,
        };
        self.run_instance(trainer, &instance, &opts)
    }
}
