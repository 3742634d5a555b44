mod ansi;
mod app;
mod config;
mod exec;
mod filter;
mod jobs;
mod logs;
mod model;
mod nav;
mod reconcile;
mod ui;

use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use reconcile::RefreshRates;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "FREQUENCMD_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "frequencmd",
    version,
    about = "Launch frequently used commands and watch their output live"
)]
struct Cli {
    /// Override config path. If omitted, frequencmd checks ./frequencmd.toml, ./.frequencmd.toml, ~/.config/frequencmd/config.toml and ~/frequencmd/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an example config to the global config path and exit
    #[arg(long)]
    init: bool,

    /// Overwrite an existing config when used with --init
    #[arg(long, requires = "init")]
    force: bool,

    /// Append diagnostics to this file (filter with FREQUENCMD_LOG, default "info")
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    if cli.init {
        let path = config::global_config_path()?;
        config::write_example_config(&path, cli.force)?;
        println!("Wrote example config: {}", path.display());
        return Ok(());
    }

    let cwd = env::current_dir()?;
    let loaded = config::load(&cwd, cli.config.as_deref())?;
    let commands = model::commands_from_config(&loaded, &cwd)?;
    info!(path = %loaded.path.display(), commands = commands.len(), "config loaded");

    let rates = RefreshRates {
        idle: loaded.config.idle_refresh(),
        running: loaded.config.running_refresh(),
    };
    app::run_tui(commands, rates)
}

// The terminal belongs to the dashboard, so diagnostics only go to a file when asked.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .try_init();
        }
    }
    Ok(())
}
