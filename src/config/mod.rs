use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use regex::{Captures, Regex};
use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use serde::{Deserialize, Serialize};

use crate::args::BaseArgs;
use crate::ui::{print_command_status, CommandStatus};

mod get;
mod list;
mod set;

pub const DEFAULT_TAIL_LINES: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 16;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_all: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const KNOWN_KEYS: &[&str] = &[
    "base_url",
    "token",
    "projects",
    "tail_lines",
    "concurrency",
    "sync_all",
];

impl Config {
    pub fn get_field(&self, key: &str) -> Option<String> {
        match key {
            "base_url" => self.base_url.clone(),
            "token" => self.token.clone(),
            "projects" => self.projects.clone(),
            "tail_lines" => self.tail_lines.map(|v| v.to_string()),
            "concurrency" => self.concurrency.map(|v| v.to_string()),
            "sync_all" => self.sync_all.map(|v| v.to_string()),
            _ => None,
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base_url" => self.base_url = Some(value.to_string()),
            "token" => self.token = Some(value.to_string()),
            "projects" => self.projects = Some(value.to_string()),
            "tail_lines" => self.tail_lines = Some(parse_number(key, value)?),
            "concurrency" => self.concurrency = Some(parse_number(key, value)?),
            "sync_all" => {
                self.sync_all = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow!("{key} must be true or false, got '{value}'"))?,
                )
            }
            _ => bail!("unknown config key: {key}"),
        }
        Ok(())
    }

    pub fn unset_field(&mut self, key: &str) -> bool {
        match key {
            "base_url" => self.base_url = None,
            "token" => self.token = None,
            "projects" => self.projects = None,
            "tail_lines" => self.tail_lines = None,
            "concurrency" => self.concurrency = None,
            "sync_all" => self.sync_all = None,
            _ => return false,
        }
        true
    }

    pub fn non_empty_fields(&self) -> Vec<(&'static str, String)> {
        KNOWN_KEYS
            .iter()
            .filter_map(|&key| self.get_field(key).map(|v| (key, v)))
            .collect()
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be a non-negative integer, got '{value}'"))
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("lab"));
    }
    dirs::home_dir()
        .map(|path| path.join(".config").join("lab"))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            print_command_status(
                CommandStatus::Error,
                &format!("Warning: could not read {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            print_command_status(
                CommandStatus::Error,
                &format!("Warning: could not parse {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("Unknown config key {} in {}", key, path.display()),
        );
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

pub fn load() -> Result<Config> {
    Ok(load_file(&config_path()?))
}

pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Fully resolved runtime settings handed to the sync and jobs commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub token: String,
    pub projects_file: PathBuf,
    pub tail_lines: usize,
    pub concurrency: usize,
    pub sync_all: bool,
}

impl Settings {
    pub fn load(base: &BaseArgs) -> Result<Self> {
        let config = load()?;
        Self::resolve(base, &config, &config_dir()?, |name| env::var(name).ok())
    }

    /// Priority: CLI flag / env var > config file > default.
    pub fn resolve(
        base: &BaseArgs,
        config: &Config,
        config_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let expand = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| expand_env(v, &lookup).trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = base
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| expand(&config.token))
            .ok_or_else(|| anyhow!("set GitLab token first, use `lab config set token <TOKEN>`"))?;

        let base_url = base
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| expand(&config.base_url))
            .ok_or_else(|| {
                anyhow!("set GitLab base url first, use `lab config set base_url <URL>`")
            })?;

        let projects_file = expand(&config.projects)
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| config_dir.join(".projects"));

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            token: token.trim().to_string(),
            projects_file,
            tail_lines: config
                .tail_lines
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TAIL_LINES),
            concurrency: config
                .concurrency
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_CONCURRENCY),
            sync_all: config.sync_all.unwrap_or(false),
        })
    }
}

/// Replace `$VAR` and `${VAR}` with their values; unset variables become empty.
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_VAR_RE
        .replace_all(value, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    url.trim_end_matches('/').to_string()
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

// --- CLI commands ---

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommands {
    /// List config values
    List {
        /// Print the token instead of masking it
        #[arg(long)]
        show_token: bool,
    },
    /// Get a config value
    Get {
        /// Config key (base_url, token, projects, tail_lines, concurrency, sync_all)
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key (base_url, token, projects, tail_lines, concurrency, sync_all)
        key: String,
        /// Value to set; `$VAR` references are expanded when the value is used
        value: String,
    },
    /// Remove a config value
    Unset {
        /// Config key (base_url, token, projects, tail_lines, concurrency, sync_all)
        key: String,
    },
}

fn validate_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key: {key}\nValid keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

pub fn run(base: BaseArgs, args: ConfigArgs) -> Result<()> {
    match args.command {
        None => list::run(base, false),
        Some(ConfigCommands::List { show_token }) => list::run(base, show_token),
        Some(ConfigCommands::Get { key }) => {
            validate_key(&key)?;
            get::run(base, &key)
        }
        Some(ConfigCommands::Set { key, value }) => {
            validate_key(&key)?;
            set::run(&key, &value)
        }
        Some(ConfigCommands::Unset { key }) => {
            validate_key(&key)?;
            set::unset(&key)
        }
    }
}
