//! Configuration loading
//!
//! Two layers:
//!
//! - an environment file (`/etc/mindmatrix/environment` or `.env`) whose
//!   entries are exported without overriding variables already set
//! - `MindMatrixConfig`, read from TOML with serde defaults and a few
//!   environment overrides
//!
//! ```rust,no_run
//! use mm_core::config::{load_environment, MindMatrixConfig};
//!
//! load_environment();
//! let config = MindMatrixConfig::load_default().expect("config");
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Environment file locations, in priority order
pub const ENV_FILE_PATHS: &[&str] = &["/etc/mindmatrix/environment", ".env"];

/// Config file locations checked by `load_default`
pub const CONFIG_FILE_PATHS: &[&str] = &["/etc/mindmatrix/config.toml", "mindmatrix.toml"];

/// Load environment variables from the first environment file found.
///
/// `MINDMATRIX_ENV_FILE` takes precedence. Existing variables are never
/// overridden. Returns the path that was loaded.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("MINDMATRIX_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded = 0;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded += 1;
                    }
                }
            }
            info!(path = %path, loaded, "Loaded environment file");
            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse `KEY=VALUE`, `KEY="VALUE"` or `KEY='VALUE'`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get an optional configuration value; empty values count as unset.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an unsigned integer configuration value.
pub fn get_config_u64(key: &str) -> Option<u64> {
    get_config_opt(key).and_then(|v| v.parse().ok())
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindMatrixConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Workflow engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budget for one step, counting only time spent waiting on the step
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Capacity of the per-run event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

/// Plugin loading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_true")]
    pub enable_builtins: bool,
    #[serde(default)]
    pub enable_plugins: bool,
    /// Plugins to register; empty means every known plugin
    #[serde(default)]
    pub auto_load: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enable_builtins: true,
            enable_plugins: false,
            auto_load: Vec::new(),
        }
    }
}

/// Host settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Workflow used when a request names none
    #[serde(default)]
    pub default_workflow: Option<String>,
}

impl MindMatrixConfig {
    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = Self::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::invalid_config(format!("failed to parse config: {}", e)))
    }

    /// Load from a TOML file. Environment overrides apply before validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse_toml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `MINDMATRIX_CONFIG` or the default paths, falling back to defaults
    pub fn load_default() -> Result<Self> {
        if let Some(path) = get_config_opt("MINDMATRIX_CONFIG") {
            return Self::load(path);
        }

        for path in CONFIG_FILE_PATHS {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `MM_STEP_TIMEOUT_SECS` and `MM_EVENT_BUFFER`
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = get_config_u64("MM_STEP_TIMEOUT_SECS") {
            self.engine.step_timeout_secs = secs;
        }
        if let Some(buffer) = get_config_u64("MM_EVENT_BUFFER") {
            self.engine.event_buffer = buffer as usize;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.step_timeout_secs == 0 {
            return Err(Error::invalid_config("engine.step_timeout_secs must be > 0"));
        }
        if self.engine.event_buffer == 0 {
            return Err(Error::invalid_config("engine.event_buffer must be > 0"));
        }
        Ok(())
    }
}
