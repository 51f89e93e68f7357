//! Application settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::ConfigError;
use crate::core::codec::parse_escapes;
use crate::core::device::{DeviceIdentity, DeviceResolver, SysfsDeviceSource};
use crate::core::transmitter::{DEFAULT_INTERVAL, DEFAULT_TRIGGER_DATA};
use crate::core::transport::SerialConfig;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ultrasonic sensor link
    pub sensor: SensorConfig,
    /// Trigger link
    pub trigger: TriggerSettings,
    /// Device resolution
    pub resolver: ResolverConfig,
    /// Connection monitoring
    pub monitor: MonitorConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from `path`, or from the default location.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = super::default_config_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to `path` as pretty TOML
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&super::default_config_path()?)
    }

    /// Check values that would make a link or service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sensor.identity()?;
        self.trigger.identity()?;

        if self.sensor.baud_rate == 0 || self.trigger.baud_rate == 0 {
            return Err(invalid("baud rate must be positive"));
        }
        if self.trigger.interval_ms == 0 {
            return Err(invalid("trigger interval must be positive"));
        }
        if self.resolver.poll_interval_ms == 0 {
            return Err(invalid("resolver poll interval must be positive"));
        }
        if self.monitor.period_ms == 0 {
            return Err(invalid("monitor period must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

fn identity(vendor_id: &str, product_id: &str) -> Result<DeviceIdentity, ConfigError> {
    DeviceIdentity::parse(vendor_id, product_id).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "malformed device identity {}:{}",
            vendor_id, product_id
        ))
    })
}

/// Ultrasonic sensor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// USB vendor ID (hex)
    pub vendor_id: String,
    /// USB product ID (hex)
    pub product_id: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let id = DeviceIdentity::ULTRASONIC;
        Self {
            vendor_id: id.vendor_hex(),
            product_id: id.product_hex(),
            baud_rate: crate::core::transport::ULTRASONIC_BAUD_RATE,
        }
    }
}

impl SensorConfig {
    /// Parsed identity
    pub fn identity(&self) -> Result<DeviceIdentity, ConfigError> {
        identity(&self.vendor_id, &self.product_id)
    }

    /// Serial configuration for `port`
    pub fn serial(&self, port: &str) -> SerialConfig {
        SerialConfig::ultrasonic(port).baud_rate(self.baud_rate)
    }
}

/// Trigger link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    /// USB vendor ID (hex)
    pub vendor_id: String,
    /// USB product ID (hex)
    pub product_id: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Payload text; `\r`, `\n`, `\xNN` escapes are expanded
    pub payload: String,
    /// Interval between sends
    pub interval_ms: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        let id = DeviceIdentity::TRIGGER;
        Self {
            vendor_id: id.vendor_hex(),
            product_id: id.product_hex(),
            baud_rate: crate::core::transport::TRIGGER_BAUD_RATE,
            payload: String::from_utf8_lossy(DEFAULT_TRIGGER_DATA).into_owned(),
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl TriggerSettings {
    /// Parsed identity
    pub fn identity(&self) -> Result<DeviceIdentity, ConfigError> {
        identity(&self.vendor_id, &self.product_id)
    }

    /// Serial configuration for `port`
    pub fn serial(&self, port: &str) -> SerialConfig {
        SerialConfig::trigger(port).baud_rate(self.baud_rate)
    }

    /// Payload bytes with escapes expanded
    pub fn payload_bytes(&self) -> Vec<u8> {
        parse_escapes(&self.payload)
    }

    /// Interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Device resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory holding device nodes
    pub dev_root: PathBuf,
    /// sysfs tty class directory
    pub sys_class_tty: PathBuf,
    /// Node name prefixes to consider
    pub node_prefixes: Vec<String>,
    /// How long `run` waits for each device
    pub wait_timeout_secs: u64,
    /// Poll interval while waiting
    pub poll_interval_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dev_root: PathBuf::from("/dev"),
            sys_class_tty: PathBuf::from("/sys/class/tty"),
            node_prefixes: vec!["ttyUSB".to_string()],
            wait_timeout_secs: 10,
            poll_interval_ms: 500,
        }
    }
}

impl ResolverConfig {
    /// Wait timeout as a duration
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Resolver over the configured sysfs roots
    pub fn resolver(&self) -> DeviceResolver {
        let source = SysfsDeviceSource::new(&self.dev_root, &self.sys_class_tty)
            .prefixes(self.node_prefixes.clone());
        DeviceResolver::new(Arc::new(source))
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

/// Connection monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Check period
    pub period_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

impl MonitorConfig {
    /// Period as a duration
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. "info", "rangelink_core=debug")
    pub level: String,
    /// Directory for daily-rolling log files
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}
