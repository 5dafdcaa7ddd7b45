//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name used under the platform config/data folders
pub const APP_DIR_NAME: &str = "atm";

/// Optional settings read from `config.toml`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TomlConfig {
    /// Folder holding the session database and results ledger
    pub data_dir: Option<PathBuf>,
    /// Base URL of the session service used by the survey runner
    pub server_url: Option<String>,
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Locate the configuration file for the platform.
///
/// Linux checks `~/.config/atm/config.toml` then `/etc/atm/config.toml`;
/// other platforms check the user config directory only.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Load the discovered configuration file, or defaults when there is none.
///
/// An unreadable file is logged and treated as absent.
pub fn load_config() -> TomlConfig {
    let Some(path) = config_file_path() else {
        debug!("No config file found, using defaults");
        return TomlConfig::default();
    };
    match load_toml_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Resolve the data folder in priority order:
/// 1. Command-line argument or environment variable (already merged by clap)
/// 2. `data_dir` from the TOML config file
/// 3. OS-dependent default
pub fn resolve_data_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Some(path) = &config.data_dir {
        return path.clone();
    }
    default_data_dir()
}

/// Session service URL used when neither the command line nor the config names one
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Resolve the session service URL: command line/env, then config file, then
/// [`DEFAULT_SERVER_URL`]. Trailing slashes are dropped.
pub fn resolve_server_url(cli_arg: Option<&str>, config: &TomlConfig) -> String {
    cli_arg
        .or(config.server_url.as_deref())
        .unwrap_or(DEFAULT_SERVER_URL)
        .trim_end_matches('/')
        .to_string()
}

/// OS-dependent default data folder (`~/.local/share/atm` on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./atm_data"))
}
