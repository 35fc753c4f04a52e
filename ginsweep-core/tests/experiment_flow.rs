//! End-to-end flow: sweep file -> rendered configs -> trainer runs -> saved
//! runs -> packaged event files.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use ginsweep_core::gin::{GinConfig, KeyMatch};
use ginsweep_core::sweep::{SweepSpec, gin_configs_from_sweep};
use ginsweep_core::tensorboard::{PackageOptions, package_tfevents};
use ginsweep_core::training::{
    ExperimentConfig, ExperimentRegistry, ExperimentRun, ExperimentSaver, REGISTRY_FILE,
    RunStatus, Trainer, TrainingSession,
};
use ginsweep_core::{SweepError, exp_name_from_params};

const BASE_GIN: &str = "\
train.steps = 100
train.lr = 0.1
train.model = @trax.models.TransformerLM";

const SWEEP_YAML: &str = "\
train.lr: [0.1, 0.01]
train.steps: [200]
";

/// Records every rendered config and leaves an event file behind, failing
/// whenever the config binds `fail_on`.
struct FakeTrainer {
    seen: Vec<String>,
    fail_on: Option<String>,
}

impl FakeTrainer {
    fn new() -> Self {
        Self {
            seen: Vec::new(),
            fail_on: None,
        }
    }
}

impl Trainer for FakeTrainer {
    fn train(
        &mut self,
        rendered_config: &str,
        output_dir: &Path,
    ) -> Result<TrainingSession, SweepError> {
        self.seen.push(rendered_config.to_string());
        if let Some(needle) = &self.fail_on
            && rendered_config.contains(needle.as_str())
        {
            return Err(SweepError::training("diverged"));
        }
        let train_dir = output_dir.join("train");
        std::fs::create_dir_all(&train_dir)?;
        std::fs::write(train_dir.join("events.out.tfevents.1"), rendered_config)?;
        let now = Utc::now();
        Ok(TrainingSession {
            id: format!("fake-{}", self.seen.len()),
            config_path: output_dir.join("config.gin"),
            output_dir: output_dir.to_path_buf(),
            started_at: now,
            finished_at: now,
            exit_code: Some(0),
            saved_to: None,
        })
    }
}

struct Workspace {
    _dir: TempDir,
    saved: PathBuf,
    train: PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let saved = dir.path().join("saved");
    std::fs::create_dir_all(saved.join("master")).unwrap();
    let train = dir.path().join("train");
    Workspace {
        saved,
        train,
        _dir: dir,
    }
}

fn experiment_run(ws: &Workspace) -> ExperimentRun {
    let sweep = SweepSpec::from_yaml(SWEEP_YAML).unwrap();
    let config = ExperimentConfig::new("master", PathBuf::from("lm/base.gin"), sweep);
    let saver = ExperimentSaver::new(&ws.saved, ws.train.clone()).unwrap();
    ExperimentRun::new(config, saver, BASE_GIN, None, ".pkl.gz")
        .unwrap()
        .with_max_combinations(30)
        .with_registry(ws.saved.join(REGISTRY_FILE))
}

#[test]
fn sweep_renders_one_config_per_combination() {
    let spec = SweepSpec::from_yaml(SWEEP_YAML).unwrap();
    let rendered = gin_configs_from_sweep(BASE_GIN, &spec, 30, KeyMatch::Exact).unwrap();
    let names: Vec<String> = rendered
        .iter()
        .map(|(combo, _)| exp_name_from_params(combo))
        .collect();
    assert_eq!(names, ["lr__0.1_steps__200", "lr__0.01_steps__200"]);

    let second = GinConfig::parse(&rendered[1].1);
    assert_eq!(second.query("train.lr"), Some("0.01"));
    assert_eq!(second.query("train.steps"), Some("200"));
    assert_eq!(second.lines().len(), 3);
}

#[test]
fn run_saves_every_instance_and_records_it() {
    let ws = workspace();
    let run = experiment_run(&ws);
    let mut trainer = FakeTrainer::new();

    let sessions = run.run(&mut trainer, true, Some("Reformer")).unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(
        trainer
            .seen
            .iter()
            .all(|cfg| cfg.contains("train.model = @trax.models.Reformer"))
    );

    let first = ws.saved.join("master").join("lm#base@lr__0.1_steps__200");
    assert_eq!(sessions[0].1.saved_to.as_deref(), Some(first.as_path()));
    assert!(first.join("train/events.out.tfevents.1").is_file());
    assert!(
        ws.saved
            .join("master/lm#base@lr__0.01_steps__200/train")
            .is_dir()
    );

    let registry = ExperimentRegistry::load(&ws.saved.join(REGISTRY_FILE)).unwrap();
    assert_eq!(registry.list_by_status(&RunStatus::Completed).len(), 2);
    let record = registry.find_by_name("lm#base@lr__0.01_steps__200").unwrap();
    assert_eq!(record.overrides, ["train.lr = 0.01", "train.steps = 200"]);
}

#[test]
fn first_failure_aborts_the_sweep() {
    let ws = workspace();
    let run = experiment_run(&ws);
    let mut trainer = FakeTrainer {
        seen: Vec::new(),
        fail_on: Some("train.lr = 0.1\n".to_string()),
    };

    let err = run.run(&mut trainer, true, None).unwrap_err();
    assert!(matches!(err, SweepError::Training(_)));
    assert_eq!(trainer.seen.len(), 1);

    let registry = ExperimentRegistry::load(&ws.saved.join(REGISTRY_FILE)).unwrap();
    assert_eq!(registry.experiments.len(), 1);
    assert_eq!(registry.experiments[0].status, RunStatus::Failed);
    assert!(registry.experiments[0].error.as_deref().unwrap().contains("diverged"));
}

#[test]
fn training_error_survives_a_broken_registry() {
    let ws = workspace();
    let run = experiment_run(&ws).with_registry(ws.saved.join("missing/experiments.json"));
    let mut trainer = FakeTrainer {
        seen: Vec::new(),
        fail_on: Some("train.lr = 0.1\n".to_string()),
    };

    let err = run.run(&mut trainer, true, None).unwrap_err();
    assert!(matches!(err, SweepError::Training(_)));
}

#[test]
fn registry_errors_fail_successful_runs() {
    let ws = workspace();
    let run = experiment_run(&ws).with_registry(ws.saved.join("missing/experiments.json"));
    let err = run.run(&mut FakeTrainer::new(), true, None).unwrap_err();
    assert!(matches!(err, SweepError::Io(_)));
}

#[test]
fn oversized_sweep_runs_nothing() {
    let ws = workspace();
    let run = experiment_run(&ws).with_max_combinations(1);
    let mut trainer = FakeTrainer::new();
    let err = run.run(&mut trainer, true, None).unwrap_err();
    assert!(matches!(
        err,
        SweepError::TooManyCombinations { count: 2, max: 1 }
    ));
    assert!(trainer.seen.is_empty());
    assert!(!ws.train.exists());
}

#[test]
fn eval_keeps_the_working_directory() {
    let ws = workspace();
    let run = experiment_run(&ws);
    std::fs::create_dir_all(&ws.train).unwrap();
    std::fs::write(ws.train.join("model.pkl.gz"), "weights").unwrap();

    let mut trainer = FakeTrainer::new();
    let overrides = ginsweep_core::ParamCombination::new().with("train.lr", 0.0f64);
    let session = run.eval(&mut trainer, 10, overrides, false).unwrap();
    assert_eq!(session.saved_to, None);
    assert!(ws.train.join("model.pkl.gz").is_file());
    assert!(trainer.seen[0].contains("train.eval_steps = 10"));
}

#[test]
fn dry_run_plans_the_same_copies_as_a_real_run() {
    let ws = workspace();
    let run = experiment_run(&ws);
    run.run(&mut FakeTrainer::new(), true, None).unwrap();

    let out = TempDir::new().unwrap();
    let mut opts = PackageOptions::new(&ws.saved, out.path());
    opts.dry_run = true;
    let plan = package_tfevents(&opts).unwrap();
    assert_eq!(plan.archive, None);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);

    opts.dry_run = false;
    let report = package_tfevents(&opts).unwrap();
    assert_eq!(plan.copies, report.copies);
    assert_eq!(report.copies.len(), 2);
    assert!(report.archive.unwrap().is_file());
}

#[test]
fn package_collects_saved_event_files() {
    let ws = workspace();
    let run = experiment_run(&ws);
    run.run(&mut FakeTrainer::new(), true, None).unwrap();

    let out = TempDir::new().unwrap();
    let mut opts = PackageOptions::new(&ws.saved, out.path());
    opts.regex = Some(regex::Regex::new(r"lr__0\.01").unwrap());
    let report = package_tfevents(&opts).unwrap();
    assert_eq!(report.copies.len(), 1);
    assert_eq!(report.copies[0].experiment, "master@lm#base@lr__0.01_steps__200");

    let archive = report.archive.unwrap();
    let name = archive.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("tensorboards_") && name.ends_with(".tar.gz"));

    let file = std::fs::File::open(&archive).unwrap();
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut files = Vec::new();
    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().unwrap().into_owned();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        files.push((path, body));
    }
    assert_eq!(files.len(), 1);
    assert!(
        files[0]
            .0
            .ends_with("master@lm#base@lr__0.01_steps__200/events.out.tfevents.1")
    );
    assert!(files[0].1.contains("train.lr = 0.01"));
}
