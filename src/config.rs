// src/config.rs
use crate::error::ConfigError;
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const DEFAULT_PREVIEW_LINES: usize = 10;
const DEFAULT_RETRY_SECS: u64 = 2;

/// Command-line arguments for the application.
///
/// `-h` is taken by `--host`, so help is only available as `--help`.
#[derive(Parser, Debug, Deserialize, Default)]
#[clap(author, version, about, long_about = None, disable_help_flag = true)]
pub struct CliArgs {
    /// Port to listen on
    #[clap(short, long, value_parser, help = "Port to listen on (default 3000)")]
    pub port: Option<u16>,

    /// Host address to bind
    #[clap(short, long, value_parser, help = "Host address to bind (default 0.0.0.0)")]
    pub host: Option<String>,

    /// Directory of markdown documents to serve
    #[clap(short, long, value_parser, help = "Directory of markdown documents to serve")]
    pub dir: Option<PathBuf>,

    /// Directory given as a bare argument
    #[clap(value_name = "DIR", help = "Directory to serve (same as --dir)")]
    pub path: Option<PathBuf>,

    /// Path to a configuration file (e.g., mdlive.toml)
    #[clap(
        short,
        long,
        value_parser,
        help = "Path to a configuration file (e.g., mdlive.toml)"
    )]
    pub config: Option<PathBuf>,

    /// Log level (e.g., trace, debug, info, warn, error)
    #[clap(
        long,
        value_parser,
        help = "Log level (e.g., trace, debug, info, warn, error)"
    )]
    pub log_level: Option<String>,

    #[clap(long, action = clap::ArgAction::Help, help = "Print help")]
    #[serde(skip)]
    pub help: Option<bool>,
}

/// Configuration loaded from file, environment, or defaults.
#[derive(Deserialize, Serialize, Debug, Default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Served root
    pub dir: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Watcher debounce window in milliseconds
    pub debounce_ms: Option<u64>,
    /// Number of `index.md` lines shown in a directory preview
    pub preview_lines: Option<usize>,
    /// Seconds between attempts to re-arm a lost watch
    pub retry_secs: Option<u64>,
}

impl FileConfig {
    fn defaults() -> Self {
        FileConfig {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            dir: Some(default_docs_dir()),
            log_level: Some("info".to_string()),
            debounce_ms: Some(DEFAULT_DEBOUNCE_MS),
            preview_lines: Some(DEFAULT_PREVIEW_LINES),
            retry_secs: Some(DEFAULT_RETRY_SECS),
        }
    }
}

/// Final application configuration after merging all sources.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,
    /// Canonical absolute path of the served root
    pub root: PathBuf,
    pub log_level: String,
    pub debounce: Duration,
    pub preview_lines: usize,
    pub retry_interval: Duration,
}

impl AppConfig {
    /// Loads the configuration from the process arguments, `mdlive.toml` and
    /// `MDLIVE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merges defaults, config file, environment and the given CLI arguments.
    ///
    /// Fails if the served root does not exist or is not a directory.
    pub fn from_args(cli_args: CliArgs) -> Result<Self, ConfigError> {
        let config_file_path = cli_args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("mdlive.toml"));

        let fig = Figment::new()
            .merge(Serialized::defaults(FileConfig::defaults()))
            .merge(Toml::file(config_file_path))
            .merge(Env::prefixed("MDLIVE_"));

        let mut merged: FileConfig = fig.extract()?;

        // CLI always wins over file and environment.
        if let Some(host) = cli_args.host {
            merged.host = Some(host);
        }
        if let Some(port) = cli_args.port {
            merged.port = Some(port);
        }
        if let Some(dir) = cli_args.dir.or(cli_args.path) {
            merged.dir = Some(dir);
        }
        if let Some(level) = cli_args.log_level {
            merged.log_level = Some(level);
        }

        let host = merged.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = merged.port.unwrap_or(DEFAULT_PORT);
        let listen_addr = parse_listen_addr(&host, port)?;
        let root = resolve_root(&merged.dir.unwrap_or_else(default_docs_dir))?;

        Ok(AppConfig {
            listen_addr,
            root,
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
            debounce: Duration::from_millis(merged.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            preview_lines: merged.preview_lines.unwrap_or(DEFAULT_PREVIEW_LINES),
            retry_interval: Duration::from_secs(
                merged.retry_secs.unwrap_or(DEFAULT_RETRY_SECS).max(1),
            ),
        })
    }

    /// Builds a configuration for an already-validated root with default tunables.
    pub fn for_root(root: PathBuf, listen_addr: SocketAddr) -> Self {
        AppConfig {
            listen_addr,
            root,
            log_level: "info".to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            preview_lines: DEFAULT_PREVIEW_LINES,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_SECS),
        }
    }
}

/// The bundled `docs` directory: next to the executable if present, else `./docs`.
fn default_docs_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("docs")))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("docs"))
}

fn parse_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let raw = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
}

fn resolve_root(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        return Err(ConfigError::RootNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ConfigError::RootNotDirectory(dir.to_path_buf()));
    }
    // Watch events arrive with canonical paths, so the root must be canonical too.
    dir.canonicalize()
        .map_err(|_| ConfigError::RootNotFound(dir.to_path_buf()))
}
