//! ginsweep CLI: generate sweep configs, eval configs, run experiments and
//! package TensorBoard logs.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ginsweep: hyperparameter sweeps over gin configs
#[derive(Parser, Debug)]
#[command(name = "ginsweep", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Write one gin config per combination of a sweep file
    Sweep {
        /// YAML file mapping gin keys to candidate lists
        yaml_path: PathBuf,
        /// Base gin config
        gin_path: PathBuf,
        /// Refuse sweeps with more combinations than this
        #[arg(long = "max_n")]
        max_n: Option<usize>,
        /// Name files 0.gin, 1.gin, ... instead of by experiment name
        #[arg(long)]
        index_names: bool,
        /// Directory the generated configs are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Derive an evaluation config from a training config
    Eval {
        /// Training gin config
        #[arg(long)]
        gin: PathBuf,
        /// Number of evaluation steps
        #[arg(long = "eval_steps")]
        eval_steps: Option<u64>,
        /// Evaluation batch size
        #[arg(long = "eval_bs")]
        eval_bs: Option<u64>,
        /// Checkpoint step to resume from (0 reads train.steps)
        #[arg(long, default_value = "0")]
        steps: u64,
    },
    /// Run every combination of a sweep through the trainer
    Run {
        /// Sweep YAML file
        #[arg(long)]
        sweep: PathBuf,
        /// Base gin config, relative to the configs root
        #[arg(long)]
        gin: PathBuf,
        /// Branch the runs are saved under
        #[arg(long)]
        branch: String,
        /// Saved-models directory (must exist)
        #[arg(long)]
        saved_models: Option<PathBuf>,
        /// Trainer working directory
        #[arg(long)]
        train_dir: Option<PathBuf>,
        /// Checkpoint copied into the working directory before each run
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Swap train.model for @trax.models.<MODEL>
        #[arg(long)]
        model: Option<String>,
        /// Leave outputs in the working directory
        #[arg(long)]
        no_save: bool,
        /// Refuse sweeps with more combinations than this
        #[arg(long = "max_n")]
        max_n: Option<usize>,
    },
    /// Archive TensorBoard event files from saved runs
    Package {
        /// Saved-models directory to search
        models_dir: PathBuf,
        /// Directory the archive is written to
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Only package paths matching this regular expression
        #[arg(long)]
        regex: Option<String>,
        /// List what would be packaged without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "ginsweep", "ginsweep")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ginsweep.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace)
}
