//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use ginsweep_core::config::{FileNaming, GinsweepConfig, load_config, workspace_config_path};
use ginsweep_core::eval_gin::{EvalOptions, eval_config_path, make_eval_config};
use ginsweep_core::naming::exp_name_from_params;
use ginsweep_core::sweep::{ParamCombination, SweepSpec, gin_configs_from_sweep};
use ginsweep_core::tensorboard::{PackageOptions, package_tfevents};
use ginsweep_core::training::{
    CommandTrainer, ExperimentConfig, ExperimentRun, ExperimentSaver, REGISTRY_FILE,
    load_base_gin,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Sweep {
            yaml_path,
            gin_path,
            max_n,
            index_names,
            out_dir,
        } => handle_sweep(workspace, &yaml_path, &gin_path, max_n, index_names, &out_dir),
        Commands::Eval {
            gin,
            eval_steps,
            eval_bs,
            steps,
        } => handle_eval(workspace, &gin, eval_steps, eval_bs, steps),
        Commands::Run {
            sweep,
            gin,
            branch,
            saved_models,
            train_dir,
            checkpoint,
            model,
            no_save,
            max_n,
        } => {
            let args = RunArgs {
                sweep,
                gin,
                branch,
                saved_models,
                train_dir,
                checkpoint,
                model,
                save: !no_save,
                max_n,
            };
            handle_run(workspace, args)
        }
        Commands::Package {
            models_dir,
            save_dir,
            regex,
            dry_run,
        } => handle_package(workspace, models_dir, save_dir, regex.as_deref(), dry_run),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<GinsweepConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn handle_sweep(
    workspace: &Path,
    yaml_path: &Path,
    gin_path: &Path,
    max_n: Option<usize>,
    index_names: bool,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let spec = SweepSpec::load(yaml_path)
        .with_context(|| format!("Failed to load sweep {}", yaml_path.display()))?;
    let base = std::fs::read_to_string(gin_path)
        .with_context(|| format!("Failed to read gin config {}", gin_path.display()))?;

    let max = max_n.unwrap_or(config.sweep.max_combinations);
    let rendered = gin_configs_from_sweep(&base, &spec, max, config.sweep.key_match)?;

    let naming = if index_names {
        FileNaming::Index
    } else {
        config.sweep.naming
    };
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut written = HashSet::new();
    for (file, (_, text)) in sweep_files(&rendered, naming).iter().zip(&rendered) {
        if !written.insert(file.stem.clone()) {
            warn!(name = %file.stem, "Two combinations share a file name; the later one wins");
        }
        let path = out_dir.join(format!("{}{}", file.stem, config.sweep.file_suffix));
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", file.summary());
    }
    Ok(())
}

/// File written for one combination of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SweepFile {
    /// File name without the suffix.
    stem: String,
    experiment: String,
}

impl SweepFile {
    /// Line printed once the file is written: the experiment name, prefixed by
    /// the file stem when the two differ.
    fn summary(&self) -> String {
        if self.stem == self.experiment {
            self.experiment.clone()
        } else {
            format!("{}\t{}", self.stem, self.experiment)
        }
    }
}

fn sweep_files(rendered: &[(ParamCombination, String)], naming: FileNaming) -> Vec<SweepFile> {
    rendered
        .iter()
        .enumerate()
        .map(|(i, (combo, _))| {
            let experiment = exp_name_from_params(combo);
            let stem = match naming {
                FileNaming::Index => i.to_string(),
                FileNaming::ExperimentName => experiment.clone(),
            };
            SweepFile { stem, experiment }
        })
        .collect()
}

fn handle_eval(
    workspace: &Path,
    gin: &Path,
    eval_steps: Option<u64>,
    eval_bs: Option<u64>,
    steps: u64,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let base = std::fs::read_to_string(gin)
        .with_context(|| format!("Failed to read gin config {}", gin.display()))?;
    let opts = EvalOptions {
        eval_steps: eval_steps.unwrap_or(config.eval.eval_steps),
        eval_batch_size: eval_bs.unwrap_or(config.eval.eval_batch_size),
        steps,
    };
    let text = make_eval_config(&base, &opts)?;
    let out = eval_config_path(gin);
    std::fs::write(&out, text).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

struct RunArgs {
    sweep: PathBuf,
    gin: PathBuf,
    branch: String,
    saved_models: Option<PathBuf>,
    train_dir: Option<PathBuf>,
    checkpoint: Option<PathBuf>,
    model: Option<String>,
    save: bool,
    max_n: Option<usize>,
}

fn handle_run(workspace: &Path, args: RunArgs) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let sweep = SweepSpec::load(&args.sweep)
        .with_context(|| format!("Failed to load sweep {}", args.sweep.display()))?;
    let configs_root = workspace.join(&config.experiments.configs_root);
    let base = load_base_gin(&args.gin, &configs_root)?;

    let saved = args
        .saved_models
        .unwrap_or_else(|| workspace.join(&config.experiments.saved_models_dir));
    let train_dir = args
        .train_dir
        .unwrap_or_else(|| config.experiments.train_dir());
    let saver = ExperimentSaver::new(&saved, train_dir)?;

    let experiment = ExperimentConfig::new(args.branch, args.gin, sweep);
    let run = ExperimentRun::new(
        experiment,
        saver,
        &base,
        args.checkpoint,
        &config.experiments.checkpoint_suffix,
    )?
    .with_key_match(config.sweep.key_match)
    .with_max_combinations(args.max_n.unwrap_or(config.sweep.max_combinations))
    .with_registry(saved.join(REGISTRY_FILE));

    let mut trainer =
        CommandTrainer::from_settings(&config.trainer).with_working_dir(workspace.to_path_buf());
    let sessions = run.run(&mut trainer, args.save, args.model.as_deref())?;

    for (instance, session) in &sessions {
        match &session.saved_to {
            Some(dest) => println!("{}\t{}", instance, dest.display()),
            None => println!("{}", instance),
        }
    }
    Ok(())
}

fn handle_package(
    workspace: &Path,
    models_dir: PathBuf,
    save_dir: Option<PathBuf>,
    regex: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let regex = regex
        .map(regex::Regex::new)
        .transpose()
        .context("Invalid --regex")?;
    let opts = PackageOptions {
        models_dir,
        save_dir: save_dir.unwrap_or(config.package.save_dir),
        regex,
        pattern: config.package.pattern,
        dry_run,
    };
    let report = package_tfevents(&opts)?;

    for copy in &report.copies {
        println!("{}\t{}", copy.experiment, copy.source.display());
    }
    match &report.archive {
        Some(archive) => println!("Archive: {}", archive.display()),
        None if dry_run => println!("Dry run: {} file(s) would be packaged", report.copies.len()),
        None => {}
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if let Some(config_dir) = config_path.parent() {
                std::fs::create_dir_all(config_dir)?;
            }

            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = GinsweepConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ginsweep_core::{GinValue, KeyMatch};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const BASE_GIN: &str = "train.steps = 100\ntrain.lr = 0.1";

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).unwrap();

        let config_path = workspace.join(".ginsweep").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: GinsweepConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.sweep.max_combinations, 30);
        assert_eq!(parsed.trainer.program, "python3");
    }

    #[test]
    fn test_sweep_writes_named_configs() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        write(&ws.join("sweep.yaml"), "train.lr: [0.1, 0.01]\n");
        write(&ws.join("base.gin"), BASE_GIN);
        let out = ws.join("out");

        let command = Commands::Sweep {
            yaml_path: ws.join("sweep.yaml"),
            gin_path: ws.join("base.gin"),
            max_n: None,
            index_names: false,
            out_dir: out.clone(),
        };
        handle_command(command, ws).unwrap();

        assert_eq!(
            std::fs::read_to_string(out.join("lr__0.01.gin")).unwrap(),
            "train.steps = 100\ntrain.lr = 0.01"
        );
        assert!(out.join("lr__0.1.gin").is_file());
    }

    #[test]
    fn test_sweep_index_names_and_limit() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        write(&ws.join("sweep.yaml"), "train.lr: [0.1, 0.01, 0.001]\n");
        write(&ws.join("base.gin"), BASE_GIN);

        let too_many = Commands::Sweep {
            yaml_path: ws.join("sweep.yaml"),
            gin_path: ws.join("base.gin"),
            max_n: Some(2),
            index_names: true,
            out_dir: ws.join("out"),
        };
        assert!(handle_command(too_many, ws).is_err());
        assert!(!ws.join("out").exists());

        let command = Commands::Sweep {
            yaml_path: ws.join("sweep.yaml"),
            gin_path: ws.join("base.gin"),
            max_n: None,
            index_names: true,
            out_dir: ws.join("out"),
        };
        handle_command(command, ws).unwrap();
        for i in 0..3 {
            assert!(ws.join("out").join(format!("{i}.gin")).is_file());
        }
        assert_eq!(
            std::fs::read_to_string(ws.join("out").join("1.gin")).unwrap(),
            "train.steps = 100\ntrain.lr = 0.01"
        );
    }

    #[test]
    fn test_sweep_summary_maps_files_to_experiments() {
        let spec = SweepSpec::new().with_param(
            "train.lr",
            vec![GinValue::Float(0.1), GinValue::Float(0.01)],
        );
        let rendered = gin_configs_from_sweep(BASE_GIN, &spec, 30, KeyMatch::Exact).unwrap();

        let summaries: Vec<String> = sweep_files(&rendered, FileNaming::Index)
            .iter()
            .map(SweepFile::summary)
            .collect();
        assert_eq!(summaries, ["0\tlr__0.1", "1\tlr__0.01"]);

        let summaries: Vec<String> = sweep_files(&rendered, FileNaming::ExperimentName)
            .iter()
            .map(SweepFile::summary)
            .collect();
        assert_eq!(summaries, ["lr__0.1", "lr__0.01"]);
    }

    #[test]
    fn test_eval_writes_sibling_file() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        let gin = ws.join("configs").join("base.gin");
        write(&gin, BASE_GIN);

        let command = Commands::Eval {
            gin: gin.clone(),
            eval_steps: Some(7),
            eval_bs: None,
            steps: 0,
        };
        handle_command(command, ws).unwrap();

        let text = std::fs::read_to_string(ws.join("configs").join("base_eval.gin")).unwrap();
        assert!(text.contains("train.steps = 101"));
        assert!(text.contains("train.eval_steps = 7"));
        assert!(text.contains("batcher.eval_batch_size = 1"));
    }

    #[test]
    fn test_package_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        write(
            &ws.join("saved/master/lm#base@default/train/events.out.tfevents.1"),
            "e",
        );
        let out = ws.join("archives");
        std::fs::create_dir(&out).unwrap();

        let command = Commands::Package {
            models_dir: ws.join("saved"),
            save_dir: Some(out.clone()),
            regex: None,
            dry_run: true,
        };
        handle_command(command, ws).unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);

        let bad_regex = Commands::Package {
            models_dir: ws.join("saved"),
            save_dir: Some(out),
            regex: Some("(".to_string()),
            dry_run: true,
        };
        assert!(handle_command(bad_regex, ws).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_uses_configured_trainer() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        write(
            &ws.join(".ginsweep/config.toml"),
            r#"
[trainer]
program = "sh"
args = ["-c", "cp {config} {output_dir}/used.gin"]
"#,
        );
        write(&ws.join("configs/lm/base.gin"), BASE_GIN);
        write(&ws.join("sweep.yaml"), "train.steps: [1, 2]\n");
        std::fs::create_dir_all(ws.join("saved/master")).unwrap();

        let command = Commands::Run {
            sweep: ws.join("sweep.yaml"),
            gin: PathBuf::from("lm/base.gin"),
            branch: "master".to_string(),
            saved_models: Some(ws.join("saved")),
            train_dir: Some(ws.join("train")),
            checkpoint: None,
            model: None,
            no_save: false,
            max_n: None,
        };
        handle_command(command, ws).unwrap();

        let used = ws.join("saved/master/lm#base@steps__2/used.gin");
        assert_eq!(
            std::fs::read_to_string(used).unwrap(),
            "train.steps = 2\ntrain.lr = 0.1"
        );
        assert!(ws.join("saved").join(REGISTRY_FILE).is_file());
    }
}
