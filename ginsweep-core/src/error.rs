//! Error types for the ginsweep-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sweep, experiment and packaging operations.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Invalid sweep: {0}")]
    InvalidSweep(String),

    #[error("Too many gin config combinations: {count} (limit {max})")]
    TooManyCombinations { count: usize, max: usize },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SweepError {
    pub fn invalid_sweep(msg: impl Into<String>) -> Self {
        Self::InvalidSweep(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<Box<figment::Error>> for SweepError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}
