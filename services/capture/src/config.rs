//! Capture service configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides,
//! mirroring `forwarder::config::load_config`.
//!
//! # Required fields
//! - `file_storage` — absolute path to the artifact storage root
//!
//! All other fields have defaults applied by hand below.

use serde::Deserialize;
use std::path::Path;

/// Top-level capture service configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Root directory the file sink writes extracted artifacts under.
    pub file_storage: String,
    /// Decoder tags to register (subset of "http", "pop3", "smtp").
    pub enabled_decoders: Vec<String>,
    /// Address the (stubbed) status surface would bind to.
    pub bind: String,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    file_storage: Option<String>,
    enabled_decoders: Option<Vec<String>>,
    bind: Option<String>,
    description: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Loads capture config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<CaptureConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Loads capture config from the default path `/etc/netcap/capture.toml`.
pub fn load_config() -> Result<CaptureConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/netcap/capture.toml"))
}

/// Loads capture config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<CaptureConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let file_storage = raw
        .file_storage
        .ok_or_else(|| ConfigError::MissingField("file_storage".to_owned()))?;
    if !Path::new(&file_storage).is_absolute() {
        return Err(ConfigError::InvalidValue(format!(
            "file_storage must be an absolute path, got '{}'",
            file_storage
        )));
    }

    let enabled_decoders = raw
        .enabled_decoders
        .unwrap_or_else(|| vec!["http".to_owned(), "pop3".to_owned(), "smtp".to_owned()]);
    for tag in &enabled_decoders {
        if !["http", "pop3", "smtp"].contains(&tag.as_str()) {
            return Err(ConfigError::InvalidValue(format!("unknown decoder tag '{}'", tag)));
        }
    }

    Ok(CaptureConfig {
        file_storage,
        enabled_decoders,
        bind: raw.bind.unwrap_or_else(|| "0.0.0.0:8090".to_owned()),
        description: raw.description,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
