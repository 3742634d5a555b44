use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};

const MIN_REFRESH_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default = "default_idle_refresh_ms", alias = "idleRefreshRateMs")]
    pub idle_refresh_rate_ms: u64,
    #[serde(
        default = "default_running_refresh_ms",
        alias = "processRunningRefreshRateMs"
    )]
    pub process_running_refresh_rate_ms: u64,
}

impl Config {
    pub fn idle_refresh(&self) -> Duration {
        Duration::from_millis(self.idle_refresh_rate_ms.max(MIN_REFRESH_MS))
    }

    pub fn running_refresh(&self) -> Duration {
        Duration::from_millis(self.process_running_refresh_rate_ms.max(MIN_REFRESH_MS))
    }
}

fn default_idle_refresh_ms() -> u64 {
    500
}

fn default_running_refresh_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub label: String,
    #[serde(default, alias = "cmd")]
    pub command: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArgsConfig {
    Single(String),
    Many(Vec<String>),
}

fn deserialize_args<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let args = Option::<ArgsConfig>::deserialize(deserializer)?;
    Ok(args.map(|args| match args {
        ArgsConfig::Single(value) => value.split_whitespace().map(str::to_string).collect(),
        ArgsConfig::Many(values) => values,
    }))
}

pub fn load(cwd: &Path, explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit_path {
        return Ok(LoadedConfig {
            config: load_from_path(path)?,
            path: path.to_path_buf(),
        });
    }

    let candidates = candidate_paths(cwd);
    for path in &candidates {
        if path.exists() {
            return Ok(LoadedConfig {
                config: load_from_path(path)?,
                path: path.clone(),
            });
        }
    }

    let tried = candidates
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("no config file found (tried {tried}); run with --init to create one")
}

fn candidate_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join("frequencmd.toml"), cwd.join(".frequencmd.toml")];
    if let Ok(global) = global_config_path() {
        candidates.push(global);
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("frequencmd").join("config.toml"));
    }
    candidates
}

pub fn global_config_path() -> Result<PathBuf> {
    let config_root = dirs::config_dir().context("unable to resolve OS config directory")?;
    Ok(config_root.join("frequencmd").join("config.toml"))
}

pub fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn load_from_path(path: &Path) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}

const EXAMPLE_CONFIG: &str = r#"# frequencmd config
#
# How often the dashboard refreshes, in milliseconds.
idle_refresh_rate_ms = 500
process_running_refresh_rate_ms = 100

# Each command needs a label plus either `command` (with optional `args`)
# or a `shell` snippet, which runs through `sh -c` unless `command` names
# another shell.

[[commands]]
label = "list files"
command = "ls"
args = "-la"

[[commands]]
label = "greet"
shell = "echo hello; echo oops >&2; exit 3"

[[commands]]
label = "build (release)"
command = "cargo"
args = ["build", "--release"]
env = ["CARGO_TERM_COLOR=always"]
# working_dir = "."
"#;
