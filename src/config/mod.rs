pub mod types;

use crate::error::ConfigError;
use log::debug;
use std::path::{Path, PathBuf};

pub use types::{AuditConfig, CapabilityPolicy, DEFAULT_DROP};

const CONFIG_FILE_NAME: &str = ".kubeguard.yaml";

/// Get the global config file path (~/.kubeguard.yaml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

/// Get the local config file path (./.kubeguard.yaml)
pub fn local_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Load the configuration named on the command line, or the first default
/// location that exists. No file at all means the default configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<AuditConfig, ConfigError> {
    if let Some(path) = explicit {
        debug!("Loading configuration from {}", path.display());
        return AuditConfig::load_from_file(path);
    }
    load_from_default()
}

pub fn load_from_default() -> Result<AuditConfig, ConfigError> {
    let candidates = std::iter::once(local_config_path()).chain(global_config_path());
    for path in candidates {
        if path.exists() {
            debug!("Loading configuration from {}", path.display());
            return AuditConfig::load_from_file(&path);
        }
    }
    debug!("No configuration file found, using defaults");
    Ok(AuditConfig::default())
}
