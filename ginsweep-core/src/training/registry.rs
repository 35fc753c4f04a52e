//! Ledger of experiment runs, kept as JSON next to the saved models.

use crate::error::SweepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default ledger file name inside the saved-models directory.
pub const REGISTRY_FILE: &str = "experiments.json";

/// Outcome of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub name: String,
    pub branch_name: String,
    pub base_gin_path: PathBuf,
    /// `key = literal` lines applied on top of the base config.
    pub overrides: Vec<String>,
    pub content_hash: String,
    pub status: RunStatus,
    pub session_id: Option<String>,
    pub saved_to: Option<PathBuf>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentRegistry {
    pub experiments: Vec<ExperimentRecord>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self {
            experiments: Vec::new(),
        }
    }

    pub fn add(&mut self, record: ExperimentRecord) {
        self.experiments.push(record);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ExperimentRecord> {
        self.experiments.iter().rev().find(|r| r.name == name)
    }

    pub fn list_by_status(&self, status: &RunStatus) -> Vec<&ExperimentRecord> {
        self.experiments
            .iter()
            .filter(|r| &r.status == status)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write via a `.tmp` sibling and rename.
    pub fn save(&self, path: &Path) -> Result<(), SweepError> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load, append one record, save.
    pub fn append(path: &Path, record: ExperimentRecord) -> Result<(), SweepError> {
        let mut registry = Self::load(path)?;
        registry.add(record);
        registry.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: RunStatus) -> ExperimentRecord {
        ExperimentRecord {
            name: name.to_string(),
            branch_name: "master".to_string(),
            base_gin_path: PathBuf::from("lm/base.gin"),
            overrides: vec!["train.steps = 1".to_string()],
            content_hash: "abc".to_string(),
            status,
            session_id: None,
            saved_to: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_registry_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(REGISTRY_FILE);
        assert!(ExperimentRegistry::load(&path).unwrap().experiments.is_empty());

        ExperimentRegistry::append(&path, record("a", RunStatus::Completed)).unwrap();
        ExperimentRegistry::append(&path, record("b", RunStatus::Failed)).unwrap();

        let loaded = ExperimentRegistry::load(&path).unwrap();
        assert_eq!(loaded.experiments.len(), 2);
        assert_eq!(loaded.list_by_status(&RunStatus::Failed).len(), 1);
        assert_eq!(loaded.find_by_name("a").unwrap().overrides, ["train.steps = 1"]);
        assert!(!path.with_extension("tmp").exists());
    }
}
