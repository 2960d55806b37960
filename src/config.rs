// src/config.rs
use crate::error::ConfigError;
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Profile (TOML table) holding this application's settings.
const PROFILE: &str = "hotpage";
const DEFAULT_ROOT: &str = "dest";
const DEFAULT_WEB_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_STYLE_PATTERN: &str = "**/*.css";
const DEFAULT_PAGE_PATTERN: &str = "**/*.html";

/// Command-line arguments for the application.
#[derive(Parser, Debug, Deserialize, Default)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Directory served over HTTP
    #[clap(short, long, value_parser, help = "Directory served over HTTP (default: dest)")]
    pub root: Option<PathBuf>,

    /// HTTP address to listen on (e.g., "127.0.0.1:3000")
    #[clap(
        short,
        long,
        value_parser,
        help = "HTTP address to listen on (e.g., \"127.0.0.1:3000\")"
    )]
    pub webaddr: Option<String>,

    /// Absolute push URL the browser subscribes to
    #[clap(
        long,
        value_parser,
        help = "Absolute push URL the browser subscribes to (e.g., \"http://localhost:3000/sse\")"
    )]
    pub sse_url: Option<String>,

    /// Path to a configuration file (e.g., hotpage.toml)
    #[clap(
        short,
        long,
        value_parser,
        help = "Path to a configuration file (e.g., hotpage.toml)"
    )]
    pub config: Option<PathBuf>,

    /// Directories to watch (default: the served root)
    #[clap(help = "Directories to watch (default: the served root)")]
    pub folders: Vec<String>,

    /// Log level (e.g., trace, debug, info, warn, error)
    #[clap(
        long,
        value_parser,
        help = "Log level (e.g., trace, debug, info, warn, error)"
    )]
    pub log_level: Option<String>,
}

/// A source pattern that triggers an external build command.
///
/// Every `{path}` in `command` is replaced by the changed file.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RebuildRule {
    pub name: String,
    pub pattern: String,
    pub command: Vec<String>,
}

/// Configuration loaded from file, environment, or defaults.
#[derive(Deserialize, Serialize, Debug, Default)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub webaddr: Option<String>,
    pub sse_url: Option<String>,
    pub folders: Option<Vec<String>>,
    pub style_patterns: Option<Vec<String>>,
    pub page_patterns: Option<Vec<String>>,
    pub rebuild: Option<Vec<RebuildRule>>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Lowest-precedence values.
    pub fn defaults(log_level: String) -> Self {
        FileConfig {
            root: Some(PathBuf::from(DEFAULT_ROOT)),
            webaddr: Some(DEFAULT_WEB_ADDR.to_string()),
            sse_url: None,
            folders: Some(vec![]),
            style_patterns: Some(vec![DEFAULT_STYLE_PATTERN.to_string()]),
            page_patterns: Some(vec![DEFAULT_PAGE_PATTERN.to_string()]),
            rebuild: Some(vec![]),
            log_level: Some(log_level),
        }
    }
}

/// Final application configuration after merging all sources.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory served over HTTP
    pub root: PathBuf,
    /// HTTP listen address
    pub web_addr: SocketAddr,
    /// Push URL advertised to browsers
    pub sse_url: String,
    /// Directories to monitor
    pub folders_to_watch: Vec<String>,
    /// Changes here trigger a stylesheet swap
    pub style_patterns: Vec<String>,
    /// Changes here trigger a full page reload
    pub page_patterns: Vec<String>,
    pub rebuild: Vec<RebuildRule>,
    pub log_level: String,
}

impl AppConfig {
    /// Loads the application configuration by merging CLI, file, environment, and defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let default_log_level =
            std::env::var("HOTPAGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let config_file_path = cli_args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("hotpage.toml"));

        let file_config: FileConfig = Self::figment(&config_file_path, default_log_level).extract()?;
        Self::resolve(cli_args, file_config)
    }

    /// Layers defaults < `[hotpage]` table of `config_file` < `HOTPAGE_*` env.
    ///
    /// The env provider is placed in the `hotpage` profile so that it is
    /// merged after the file's table rather than underneath it.
    pub fn figment(config_file: &Path, default_log_level: String) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(FileConfig::defaults(default_log_level)))
            .merge(Toml::file(config_file).nested())
            .merge(
                Env::prefixed("HOTPAGE_")
                    .map(|key| key.as_str().replace("__", ".").into())
                    .profile(PROFILE),
            )
            .select(PROFILE)
    }

    /// Applies CLI overrides on top of merged file/env/default values.
    pub fn resolve(cli_args: CliArgs, merged: FileConfig) -> Result<Self, ConfigError> {
        let root = cli_args
            .root
            .or(merged.root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        let web_addr_str = cli_args
            .webaddr
            .or(merged.webaddr)
            .unwrap_or_else(|| DEFAULT_WEB_ADDR.to_string());
        let web_addr: SocketAddr = web_addr_str
            .parse()
            .map_err(|_| ConfigError::Address(web_addr_str.clone()))?;

        let sse_url = cli_args
            .sse_url
            .or(merged.sse_url)
            .unwrap_or_else(|| default_sse_url(web_addr));

        let folders_to_watch = if !cli_args.folders.is_empty() {
            cli_args.folders
        } else {
            match merged.folders {
                Some(folders) if !folders.is_empty() => folders,
                _ => vec![root.to_string_lossy().to_string()],
            }
        };

        Ok(AppConfig {
            root,
            web_addr,
            sse_url,
            folders_to_watch,
            style_patterns: merged
                .style_patterns
                .unwrap_or_else(|| vec![DEFAULT_STYLE_PATTERN.to_string()]),
            page_patterns: merged
                .page_patterns
                .unwrap_or_else(|| vec![DEFAULT_PAGE_PATTERN.to_string()]),
            rebuild: merged.rebuild.unwrap_or_default(),
            log_level: cli_args
                .log_level
                .or(merged.log_level)
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// `http://localhost:<port>/sse` for loopback and wildcard binds, otherwise
/// the bound address itself.
pub fn default_sse_url(addr: SocketAddr) -> String {
    match addr.ip() {
        ip if ip.is_loopback() || ip.is_unspecified() => {
            format!("http://localhost:{}/sse", addr.port())
        }
        IpAddr::V4(ip) => format!("http://{}:{}/sse", ip, addr.port()),
        IpAddr::V6(ip) => format!("http://[{}]:{}/sse", ip, addr.port()),
    }
}
