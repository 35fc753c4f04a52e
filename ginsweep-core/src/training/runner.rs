//! Trainer invocation: the only boundary to the external training framework.

use crate::config::TrainerSettings;
use crate::error::SweepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// File name the rendered config is written to inside the working directory.
pub const RENDERED_CONFIG_FILE: &str = "config.gin";

/// Handle describing one finished training invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    /// Permanent location of the output once it has been moved.
    #[serde(default)]
    pub saved_to: Option<PathBuf>,
}

/// Runs training for one rendered gin config inside `output_dir`.
pub trait Trainer {
    fn train(&mut self, rendered_config: &str, output_dir: &Path)
    -> Result<TrainingSession, SweepError>;
}

/// Trainer that shells out to a configured command.
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandTrainer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_settings(settings: &TrainerSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }

    /// Directory the command is started from (defaults to the current one).
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn expand_args(&self, config_path: &Path, output_dir: &Path) -> Vec<String> {
        let config = config_path.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{config}", &config).replace("{output_dir}", &output))
            .collect()
    }
}

impl Trainer for CommandTrainer {
    fn train(
        &mut self,
        rendered_config: &str,
        output_dir: &Path,
    ) -> Result<TrainingSession, SweepError> {
        std::fs::create_dir_all(output_dir)?;
        let config_path = output_dir.join(RENDERED_CONFIG_FILE);
        std::fs::write(&config_path, rendered_config)?;

        let args = self.expand_args(&config_path, output_dir);
        debug!(program = %self.program, ?args, "Starting trainer");

        let started_at = Utc::now();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        // Trainer logs stream straight to the terminal for the whole run.
        let status = command.status().map_err(|e| {
            SweepError::training(format!("Failed to spawn {}: {e}", self.program))
        })?;
        let finished_at = Utc::now();

        if !status.success() {
            return Err(SweepError::training(format!(
                "{} failed ({status}) after {}s, config {}",
                self.program,
                (finished_at - started_at).num_seconds(),
                config_path.display()
            )));
        }

        let session = TrainingSession {
            id: uuid::Uuid::new_v4().to_string(),
            config_path,
            output_dir: output_dir.to_path_buf(),
            started_at,
            finished_at,
            exit_code: status.code(),
            saved_to: None,
        };
        info!(
            session = %session.id,
            seconds = (finished_at - started_at).num_seconds(),
            "Trainer finished"
        );
        Ok(session)
    }
}
