//! Collect TensorBoard event files from saved runs into a single archive.
//!
//! Saved runs live at `<models>/<branch>/<experiment>/<subdir>/<events file>`,
//! so an event file's branch and experiment are its 4th- and 3rd-from-last
//! path components. Files are regrouped as `<branch>@<experiment>/` in a
//! temporary staging directory, which is then written out as
//! `tensorboards_<timestamp>.tar.gz`.

use crate::error::SweepError;
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder for a path component that does not exist.
pub const UNKNOWN_COMPONENT: &str = "unknown";

/// Inputs for [`package_tfevents`].
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub models_dir: PathBuf,
    pub save_dir: PathBuf,
    /// Only paths matching this expression are packaged.
    pub regex: Option<Regex>,
    /// Substring a file name must contain.
    pub pattern: String,
    /// Plan only: no staging directory, no archive.
    pub dry_run: bool,
}

impl PackageOptions {
    pub fn new(models_dir: impl Into<PathBuf>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            save_dir: save_dir.into(),
            regex: None,
            pattern: "tfevents".to_string(),
            dry_run: false,
        }
    }
}

/// One file and the staging subdirectory it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub source: PathBuf,
    /// `<branch>@<experiment>`, relative to the staging root.
    pub experiment: String,
}

#[derive(Debug, Clone, Default)]
pub struct PackageReport {
    pub copies: Vec<PlannedCopy>,
    /// Written archive; always `None` for a dry run.
    pub archive: Option<PathBuf>,
}

/// Archive timestamp, e.g. `2024_03_01T12_30_05_123456`.
pub fn current_timestamp() -> String {
    chrono::Local::now()
        .format("%Y_%m_%dT%H_%M_%S_%6f")
        .to_string()
}

/// `<branch>@<experiment>` for an event file path.
pub fn exp_name_from_event_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let from_end = |n: usize| {
        parts
            .len()
            .checked_sub(n)
            .map(|i| parts[i].as_str())
            .unwrap_or(UNKNOWN_COMPONENT)
    };
    format!("{}@{}", from_end(4), from_end(3))
}

/// Every file below `models_dir` whose name contains `pattern` and whose
/// path matches `regex` (when given), in a stable order.
pub fn find_event_files(
    models_dir: &Path,
    pattern: &str,
    regex: Option<&Regex>,
) -> Result<Vec<PathBuf>, SweepError> {
    if !models_dir.is_dir() {
        return Err(SweepError::NotADirectory(models_dir.to_path_buf()));
    }
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(models_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().contains(pattern) {
            continue;
        }
        let path = entry.into_path();
        if let Some(re) = regex
            && !re.is_match(&path.to_string_lossy())
        {
            continue;
        }
        found.push(path);
    }
    Ok(found)
}

/// Stage matching event files per experiment and archive them.
///
/// The staging directory is removed on every exit path.
pub fn package_tfevents(opts: &PackageOptions) -> Result<PackageReport, SweepError> {
    let files = find_event_files(&opts.models_dir, &opts.pattern, opts.regex.as_ref())?;
    let copies: Vec<PlannedCopy> = files
        .into_iter()
        .map(|source| PlannedCopy {
            experiment: exp_name_from_event_path(&source),
            source,
        })
        .collect();

    if opts.dry_run {
        for copy in &copies {
            info!(experiment = %copy.experiment, source = %copy.source.display(), "Would copy");
        }
        return Ok(PackageReport {
            copies,
            archive: None,
        });
    }

    if !opts.save_dir.is_dir() {
        return Err(SweepError::NotADirectory(opts.save_dir.clone()));
    }

    let staging = tempfile::TempDir::new()?;
    for copy in &copies {
        let exp_dir = staging.path().join(&copy.experiment);
        std::fs::create_dir_all(&exp_dir)?;
        let file_name = copy
            .source
            .file_name()
            .ok_or_else(|| SweepError::invalid_input(copy.source.display().to_string()))?;
        let dest = exp_dir.join(file_name);
        if dest.exists() {
            warn!(dest = %dest.display(), "Overwriting staged event file with the same name");
        }
        std::fs::copy(&copy.source, &dest)?;
        debug!(source = %copy.source.display(), experiment = %copy.experiment, "Staged");
    }

    let archive = opts
        .save_dir
        .join(format!("tensorboards_{}.tar.gz", current_timestamp()));
    write_archive(staging.path(), &archive)?;
    info!(archive = %archive.display(), files = copies.len(), "Packaged event files");

    Ok(PackageReport {
        copies,
        archive: Some(archive),
    })
}

fn write_archive(src_dir: &Path, archive: &Path) -> Result<(), SweepError> {
    let file = File::create(archive)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", src_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}
