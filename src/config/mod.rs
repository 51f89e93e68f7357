//! Configuration module
//!
//! Handles the device identities, link parameters and service settings

mod settings;

pub use settings::{
    AppConfig, LoggingConfig, MonitorConfig, ResolverConfig, SensorConfig, TriggerSettings,
};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration file name
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Value out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rangelink", "Rangelink")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the default log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

/// Default configuration file path
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_dir()
        .map(|d| d.join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}
