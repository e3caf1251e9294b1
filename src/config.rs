use crate::cli::Cli;
use crate::error::DownloaderError;
use crate::types::PoolConfig;
use log::debug;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_SOCKS_PORT: u16 = 9051;
pub const DEFAULT_MAX_DOWNLOADS: usize = 7;
pub const DEFAULT_MAX_TOR_CHECKS: u32 = 5;

/// Fully resolved configuration: defaults, overlaid by the JSON config
/// file, overlaid by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub socks_port: u16,
    pub max_downloads: usize,
    pub max_tor_checks: u32,
    pub tor_path: Option<PathBuf>,
    pub links_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socks_port: DEFAULT_SOCKS_PORT,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            max_tor_checks: DEFAULT_MAX_TOR_CHECKS,
            tor_path: None,
            links_file: PathBuf::from("links.json"),
            log_file: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Optional keys as they appear in the JSON config file. Empty strings are
/// treated as absent so a templated config file does not clobber defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    socks_port: Option<u16>,
    max_downloads: Option<usize>,
    max_tor_checks: Option<u32>,
    tor_path: Option<String>,
    links_file: Option<String>,
    log_file: Option<String>,
    #[serde(alias = "output_directory")]
    output_dir: Option<String>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, DownloaderError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| DownloaderError::ConfigError(format!("{}: {}", path.display(), e)))
    }
}

impl Config {
    pub fn resolve(cli: &Cli) -> Result<Self, DownloaderError> {
        let mut config = Config::default();
        if let Some(path) = &cli.config {
            let file = FileConfig::load(path)?;
            debug!("Loaded config file {}: {:?}", path.display(), file);
            config.apply_file(file);
        }
        config.apply_cli(cli);
        if config.max_downloads == 0 {
            return Err(DownloaderError::ConfigError(
                "max_downloads must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(port) = file.socks_port {
            self.socks_port = port;
        }
        if let Some(max) = file.max_downloads {
            self.max_downloads = max;
        }
        if let Some(checks) = file.max_tor_checks {
            self.max_tor_checks = checks;
        }
        if let Some(path) = non_empty(file.tor_path) {
            self.tor_path = Some(path);
        }
        if let Some(path) = non_empty(file.links_file) {
            self.links_file = path;
        }
        if let Some(path) = non_empty(file.log_file) {
            self.log_file = Some(path);
        }
        if let Some(path) = non_empty(file.output_dir) {
            self.output_dir = path;
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.socks_port {
            self.socks_port = port;
        }
        if let Some(max) = cli.max_downloads {
            self.max_downloads = max;
        }
        if let Some(checks) = cli.max_tor_checks {
            self.max_tor_checks = checks;
        }
        if let Some(path) = &cli.tor_path {
            self.tor_path = Some(path.clone());
        }
        if let Some(path) = &cli.links_file {
            self.links_file = path.clone();
        }
        if let Some(path) = &cli.log_file {
            self.log_file = Some(path.clone());
        }
        if let Some(path) = &cli.output_dir {
            self.output_dir = path.clone();
        }
    }

    /// Snapshot handed to the worker pool; the pool never sees the rest of
    /// the configuration surface.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            proxy: SocketAddr::from(([127, 0, 0, 1], self.socks_port)),
            max_downloads: self.max_downloads,
            max_tor_checks: self.max_tor_checks,
            output_dir: self.output_dir.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<PathBuf> {
    value.filter(|s| !s.is_empty()).map(PathBuf::from)
}
