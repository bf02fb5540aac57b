//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PANTRY_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable default TOML file is never fatal: a warning is
//! logged and compiled defaults are used. Startup reads the config before
//! logging exists, so the outcome is returned as a [`ConfigSource`] and
//! logged once the subscriber is installed.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PANTRY_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "pantry.db";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set (e.g. "info", "pantry_enrich=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[enrichment]` section of the TOML config
///
/// Every field is optional; unset fields fall through to the settings table
/// and compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentToml {
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub min_key_length: Option<usize>,
    pub create_missing_canonicals: Option<bool>,
    pub db_max_lock_wait_ms: Option<u64>,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub enrichment: EnrichmentToml,

    /// Extra brand/retailer tokens stripped by the normalizer
    #[serde(default)]
    pub boilerplate_tokens: Vec<String>,
}

impl TomlConfig {
    /// Parse a TOML config from a string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }
}

/// Where a TOML config came from
///
/// Returned alongside the config so callers that load it before logging is
/// up can report it afterwards with [`ConfigSource::log`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Loaded(PathBuf),
    Missing(PathBuf),
    Unreadable { path: PathBuf, error: String },
    NoDefaultLocation,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::Loaded(path) => debug!("Loaded config file: {}", path.display()),
            ConfigSource::Missing(path) => {
                warn!("Config file not found: {} (using defaults)", path.display())
            }
            ConfigSource::Unreadable { path, error } => {
                warn!("Ignoring unreadable config {}: {}", path.display(), error)
            }
            ConfigSource::NoDefaultLocation => debug!("No config file found (using defaults)"),
        }
    }
}

/// Read a TOML config file without logging
///
/// A missing file yields the default config; a file that does not parse is
/// an error.
pub fn read_toml_config(path: &Path) -> Result<(TomlConfig, ConfigSource)> {
    if !path.exists() {
        return Ok((TomlConfig::default(), ConfigSource::Missing(path.to_path_buf())));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    Ok((config, ConfigSource::Loaded(path.to_path_buf())))
}

/// Read the explicit config file if given, else the platform default
///
/// Only an explicit file that fails to parse is an error; an unreadable
/// default file falls back to defaults.
pub fn read_startup_config(explicit: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    if let Some(path) = explicit {
        return read_toml_config(path);
    }

    match default_config_path() {
        Some(path) => match read_toml_config(&path) {
            Ok(loaded) => Ok(loaded),
            Err(e) => Ok((
                TomlConfig::default(),
                ConfigSource::Unreadable {
                    path,
                    error: e.to_string(),
                },
            )),
        },
        None => Ok((TomlConfig::default(), ConfigSource::NoDefaultLocation)),
    }
}

/// Load a TOML config file, logging where it came from
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let (config, source) = read_toml_config(path)?;
    source.log();
    Ok(config)
}

/// Load the config from the platform's default location, or defaults
pub fn load_default_toml_config() -> TomlConfig {
    match read_startup_config(None) {
        Ok((config, source)) => {
            source.log();
            config
        }
        Err(_) => TomlConfig::default(),
    }
}

/// Root folder resolver
///
/// Applies the priority order documented at module level.
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_config: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_config: None,
        }
    }

    /// Use a command-line supplied root folder (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use an already loaded TOML config instead of the default location
    pub fn with_toml_config(mut self, config: TomlConfig) -> Self {
        self.toml_config = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        let toml_root = match &self.toml_config {
            Some(config) => config.root_folder.clone(),
            None => load_default_toml_config().root_folder,
        };
        if let Some(path) = toml_root {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Ensures the root folder exists and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Default configuration file path for the platform, if it exists
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pantry").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pantry/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pantry (or /var/lib/pantry for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("pantry"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pantry"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("pantry"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pantry"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("pantry"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pantry"))
    } else {
        PathBuf::from("./pantry_data")
    }
}
