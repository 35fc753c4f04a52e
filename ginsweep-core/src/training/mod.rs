//! Experiment orchestration: working directories, trainer runs, saved outputs.

pub mod experiment;
pub mod registry;
pub mod runner;
pub mod saver;

pub use experiment::{
    ExperimentConfig, ExperimentInstance, ExperimentRun, InstanceOptions, load_base_gin,
};
pub use registry::{ExperimentRecord, ExperimentRegistry, REGISTRY_FILE, RunStatus};
pub use runner::{CommandTrainer, RENDERED_CONFIG_FILE, Trainer, TrainingSession};
pub use saver::ExperimentSaver;
