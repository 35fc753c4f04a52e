//! Working-directory bookkeeping around training runs.

use crate::error::SweepError;
use crate::training::experiment::ExperimentInstance;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Number of content-hash characters appended on a name collision.
const HASH_SUFFIX_LEN: usize = 12;

/// Owns the trainer's working directory and moves finished runs into
/// `<saved_models>/<branch>/<experiment>`.
#[derive(Debug, Clone)]
pub struct ExperimentSaver {
    output_dir: PathBuf,
    saved_models_path: PathBuf,
}

impl ExperimentSaver {
    /// Fails when `saved_models_dir` is not an existing directory.
    pub fn new(saved_models_dir: &Path, train_dir: PathBuf) -> Result<Self, SweepError> {
        if !saved_models_dir.is_dir() {
            return Err(SweepError::NotADirectory(saved_models_dir.to_path_buf()));
        }
        Ok(Self {
            output_dir: train_dir,
            saved_models_path: saved_models_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn saved_models_path(&self) -> &Path {
        &self.saved_models_path
    }

    /// Remove the working directory (if any) and recreate it empty.
    pub fn clear_train_dir(&self) -> Result<(), SweepError> {
        if self.output_dir.is_dir() {
            std::fs::remove_dir_all(&self.output_dir)?;
        }
        std::fs::create_dir_all(&self.output_dir)?;
        debug!(dir = %self.output_dir.display(), "Cleared train dir");
        Ok(())
    }

    /// Copy a checkpoint file into the working directory.
    pub fn load_checkpoint_from_path(&self, ckpt_path: &Path) -> Result<PathBuf, SweepError> {
        let file_name = ckpt_path
            .file_name()
            .ok_or_else(|| SweepError::invalid_input(format!("{}", ckpt_path.display())))?;
        if !ckpt_path.is_file() {
            return Err(SweepError::not_found(format!(
                "checkpoint {}",
                ckpt_path.display()
            )));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        let dest = self.output_dir.join(file_name);
        std::fs::copy(ckpt_path, &dest)?;
        info!(checkpoint = %ckpt_path.display(), "Seeded train dir from checkpoint");
        Ok(dest)
    }

    /// Where `instance` would be saved under `branch_name`.
    ///
    /// Falls back to `<name>-<hash>` when the plain name is taken, so two
    /// combinations that sanitize to the same name never overwrite each
    /// other.
    pub fn destination_for(
        &self,
        branch_name: &str,
        instance: &ExperimentInstance,
    ) -> Result<PathBuf, SweepError> {
        let branch_dir = self.saved_models_path.join(branch_name);
        let name = instance.name();
        let plain = branch_dir.join(&name);
        if !plain.exists() {
            return Ok(plain);
        }

        let hash = instance.sweep_override().content_hash();
        let hashed = branch_dir.join(format!("{name}-{}", &hash[..HASH_SUFFIX_LEN]));
        if hashed.exists() {
            return Err(SweepError::AlreadyExists(hashed));
        }
        warn!(taken = %plain.display(), "Experiment name taken, using content hash suffix");
        Ok(hashed)
    }

    /// Move the working directory to its permanent location.
    pub fn save_as(
        &self,
        branch_name: &str,
        instance: &ExperimentInstance,
    ) -> Result<PathBuf, SweepError> {
        let branch_dir = self.saved_models_path.join(branch_name);
        if !branch_dir.is_dir() {
            return Err(SweepError::NotADirectory(branch_dir));
        }
        let dest = self.destination_for(branch_name, instance)?;
        move_dir(&self.output_dir, &dest)?;
        info!(from = %self.output_dir.display(), to = %dest.display(), "Saved experiment");
        Ok(dest)
    }
}

/// Rename `from` to `to`, copying and deleting when they live on different
/// filesystems.
fn move_dir(from: &Path, to: &Path) -> Result<(), SweepError> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            copy_dir_all(from, to)?;
            std::fs::remove_dir_all(from)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<(), SweepError> {
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| SweepError::invalid_input(e.to_string()))?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
