use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog::{EmptyIndexPolicy, IndexOptions};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    /// Directory holding the mounted drives. Empty means "not configured".
    pub media_root: String,
    pub virtual_prefix: String,
    pub index_path: String,
    pub port: u16,
    pub session_ttl_secs: u64,
    pub persist_sessions: bool,
    pub registration_enabled: bool,
    /// 0 disables the walk deadline.
    pub refresh_timeout_secs: u64,
    pub follow_links: bool,
    pub empty_index_policy: EmptyIndexPolicy,
    pub refresh_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            media_root: "".to_string(),
            virtual_prefix: "/usb".to_string(),
            index_path: "catalog.redb".to_string(),
            port: DEFAULT_PORT,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            persist_sessions: false,
            registration_enabled: true,
            refresh_timeout_secs: 0,
            follow_links: false,
            empty_index_policy: EmptyIndexPolicy::Replace,
            refresh_on_start: false,
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        if self.session_ttl_secs == 0 {
            Duration::from_secs(DEFAULT_SESSION_TTL_SECS)
        } else {
            Duration::from_secs(self.session_ttl_secs)
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        let timeout = match self.refresh_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        IndexOptions {
            virtual_prefix: self.virtual_prefix.clone(),
            follow_links: self.follow_links,
            timeout,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("NASBOARD_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Reads the config file, writing a default one first when it is missing.
/// The flag is true when the file was just created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "catalog.redb".to_string();
        }
        if config.virtual_prefix.trim().is_empty() {
            config.virtual_prefix = "/usb".to_string();
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Relative values resolve against the directory holding the config file.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_media_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}
