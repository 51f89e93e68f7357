//! USB serial device discovery
//!
//! Maps a vendor/product identity to a device node path. Enumeration goes
//! through the [`DeviceSource`] trait:
//! - [`SysfsDeviceSource`] walks `/dev` and `/sys/class/tty` (Linux)
//! - [`SerialPortDeviceSource`] asks the `serialport` crate for USB metadata

mod ports;
mod sysfs;

pub use ports::SerialPortDeviceSource;
pub use sysfs::SysfsDeviceSource;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default poll interval of [`DeviceResolver::wait_for`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Vendor/product identity of a USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentity {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Ultrasonic distance sensor (CP210x bridge)
    pub const ULTRASONIC: Self = Self::new(0x10c4, 0xea60);
    /// Trigger device (CH340 bridge)
    pub const TRIGGER: Self = Self::new(0x1a86, 0x7523);

    /// Create an identity
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Parse hex vendor and product IDs such as `"10c4"` and `"EA60"`
    pub fn parse(vendor_id: &str, product_id: &str) -> Option<Self> {
        Some(Self::new(parse_id(vendor_id)?, parse_id(product_id)?))
    }

    /// Lowercase 4-digit vendor ID
    pub fn vendor_hex(&self) -> String {
        format!("{:04x}", self.vendor_id)
    }

    /// Lowercase 4-digit product ID
    pub fn product_hex(&self) -> String {
        format!("{:04x}", self.product_id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

fn parse_id(s: &str) -> Option<u16> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(s, 16).ok()
}

/// Human-readable name of a known identity
pub fn describe(vendor_id: &str, product_id: &str) -> &'static str {
    match DeviceIdentity::parse(vendor_id, product_id) {
        Some(DeviceIdentity::ULTRASONIC) => "Ultrasonic distance sensor (CP210x)",
        Some(DeviceIdentity::TRIGGER) => "Trigger device (CH340)",
        _ => "Unknown device",
    }
}

/// A discovered device node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Device node path
    pub path: PathBuf,
    /// Vendor ID as reported by the OS
    pub vendor_id: String,
    /// Product ID as reported by the OS
    pub product_id: String,
    /// Human-readable description
    pub description: String,
}

impl DeviceDescriptor {
    /// Create a descriptor, deriving the description from the identity
    pub fn new(path: impl Into<PathBuf>, vendor_id: &str, product_id: &str) -> Self {
        Self {
            path: path.into(),
            vendor_id: vendor_id.to_string(),
            product_id: product_id.to_string(),
            description: describe(vendor_id, product_id).to_string(),
        }
    }

    /// Whether this node has the given identity.
    ///
    /// IDs are compared numerically when both sides parse as hex (so `0x10c4`
    /// matches `10C4`), otherwise as case-insensitive text.
    pub fn matches(&self, vendor_id: &str, product_id: &str) -> bool {
        match (
            self.identity(),
            DeviceIdentity::parse(vendor_id, product_id),
        ) {
            (Some(ours), Some(wanted)) => ours == wanted,
            _ => {
                self.vendor_id.eq_ignore_ascii_case(vendor_id.trim())
                    && self.product_id.eq_ignore_ascii_case(product_id.trim())
            }
        }
    }

    /// Parsed identity, if the OS reported well-formed hex IDs
    pub fn identity(&self) -> Option<DeviceIdentity> {
        DeviceIdentity::parse(&self.vendor_id, &self.product_id)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device: {} [{}:{}] - {}",
            self.path.display(),
            self.vendor_id,
            self.product_id,
            self.description
        )
    }
}

/// Source of currently enumerated USB serial devices
#[cfg_attr(test, mockall::automock)]
pub trait DeviceSource: Send + Sync {
    /// List devices; enumeration failures yield an empty list
    fn scan(&self) -> Vec<DeviceDescriptor>;
}

/// Diagnostic snapshot of attached devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Every identified device
    pub devices: Vec<DeviceDescriptor>,
    /// Path of the ultrasonic sensor, if attached
    pub ultrasonic: Option<PathBuf>,
    /// Path of the trigger device, if attached
    pub trigger: Option<PathBuf>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn path_or_missing(path: Option<&PathBuf>) -> String {
            path.map_or_else(|| "not found".to_string(), |p| p.display().to_string())
        }

        writeln!(f, "=== USB serial device report ===")?;
        writeln!(f, "Devices found: {}", self.devices.len())?;
        writeln!(f)?;
        for device in &self.devices {
            writeln!(f, "{}", device)?;
        }
        writeln!(f)?;
        writeln!(f, "=== Expected devices ===")?;
        writeln!(
            f,
            "Ultrasonic sensor: {}",
            path_or_missing(self.ultrasonic.as_ref())
        )?;
        writeln!(f, "Trigger device: {}", path_or_missing(self.trigger.as_ref()))
    }
}

/// Resolves device identities to paths
#[derive(Clone)]
pub struct DeviceResolver {
    source: Arc<dyn DeviceSource>,
    poll_interval: Duration,
}

impl DeviceResolver {
    /// Create a resolver over `source`
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Resolver for the running system
    pub fn system() -> Self {
        if cfg!(target_os = "linux") {
            Self::new(Arc::new(SysfsDeviceSource::system()))
        } else {
            Self::new(Arc::new(SerialPortDeviceSource))
        }
    }

    /// Set the poll interval of `wait_for`
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// All currently attached devices
    pub fn scan(&self) -> Vec<DeviceDescriptor> {
        self.source.scan()
    }

    /// Path of the first device with the given identity
    pub fn resolve(&self, vendor_id: &str, product_id: &str) -> Option<PathBuf> {
        match self.find(vendor_id, product_id) {
            Some(device) => {
                info!("Found matching device: {}", device);
                Some(device.path)
            }
            None => {
                warn!("Device not found [{}:{}]", vendor_id, product_id);
                None
            }
        }
    }

    /// Path of the first device with `identity`
    pub fn resolve_identity(&self, identity: DeviceIdentity) -> Option<PathBuf> {
        self.resolve(&identity.vendor_hex(), &identity.product_hex())
    }

    /// Path of the ultrasonic sensor
    pub fn find_ultrasonic(&self) -> Option<PathBuf> {
        self.resolve_identity(DeviceIdentity::ULTRASONIC)
    }

    /// Path of the trigger device
    pub fn find_trigger(&self) -> Option<PathBuf> {
        self.resolve_identity(DeviceIdentity::TRIGGER)
    }

    /// Poll until the device appears or `timeout` elapses.
    ///
    /// At least one lookup is always made, even with a zero timeout.
    pub fn wait_for(&self, vendor_id: &str, product_id: &str, timeout: Duration) -> Option<PathBuf> {
        let deadline = Instant::now() + timeout;
        info!(
            "Waiting for device [{}:{}], timeout {} ms",
            vendor_id,
            product_id,
            timeout.as_millis()
        );

        loop {
            if let Some(device) = self.find(vendor_id, product_id) {
                info!("Device ready: {}", device);
                return Some(device.path);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Timed out waiting for device [{}:{}]", vendor_id, product_id);
                return None;
            }
            std::thread::sleep(self.poll_interval.min(remaining));
        }
    }

    /// Whether the device node still exists
    pub fn is_connected(&self, path: &Path) -> bool {
        is_connected(path)
    }

    /// Snapshot of attached devices and the expected pair
    pub fn status_report(&self) -> StatusReport {
        let devices = self.scan();
        let locate = |identity: DeviceIdentity| {
            devices
                .iter()
                .find(|d| d.matches(&identity.vendor_hex(), &identity.product_hex()))
                .map(|d| d.path.clone())
        };
        let ultrasonic = locate(DeviceIdentity::ULTRASONIC);
        let trigger = locate(DeviceIdentity::TRIGGER);

        StatusReport {
            devices,
            ultrasonic,
            trigger,
        }
    }

    fn find(&self, vendor_id: &str, product_id: &str) -> Option<DeviceDescriptor> {
        let found = self
            .source
            .scan()
            .into_iter()
            .find(|d| d.matches(vendor_id, product_id));
        if found.is_none() {
            debug!("No device with identity {}:{}", vendor_id, product_id);
        }
        found
    }
}

/// Whether `path` still exists
pub fn is_connected(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_with(devices: Vec<DeviceDescriptor>) -> DeviceResolver {
        let mut source = MockDeviceSource::new();
        source.expect_scan().returning(move || devices.clone());
        DeviceResolver::new(Arc::new(source))
    }

    #[test]
    fn test_identity_parse() {
        assert_eq!(DeviceIdentity::parse("10C4", "ea60"), Some(DeviceIdentity::ULTRASONIC));
        assert_eq!(DeviceIdentity::parse("0x1a86", "7523"), Some(DeviceIdentity::TRIGGER));
        assert_eq!(DeviceIdentity::parse("zz", "7523"), None);
        assert_eq!(DeviceIdentity::parse("12345", "7523"), None);
        assert_eq!(DeviceIdentity::parse("+10c", "ea60"), None);
        assert_eq!(DeviceIdentity::parse("0x", "ea60"), None);
        assert_eq!(DeviceIdentity::TRIGGER.to_string(), "1a86:7523");
    }

    #[test]
    fn test_descriptor_display() {
        let d = DeviceDescriptor::new("/dev/ttyUSB0", "10c4", "ea60");
        assert_eq!(
            d.to_string(),
            "Device: /dev/ttyUSB0 [10c4:ea60] - Ultrasonic distance sensor (CP210x)"
        );
        assert_eq!(describe("1A86", "7523"), "Trigger device (CH340)");
        assert_eq!(describe("0403", "6001"), "Unknown device");
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let resolver = mock_with(vec![
            DeviceDescriptor::new("/dev/ttyUSB0", "0403", "6001"),
            DeviceDescriptor::new("/dev/ttyUSB1", "1a86", "7523"),
        ]);
        assert_eq!(resolver.resolve("1A86", "7523"), Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(resolver.find_trigger(), Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(resolver.find_ultrasonic(), None);
    }

    #[test]
    fn test_resolve_prefixed_ids() {
        let resolver = mock_with(vec![DeviceDescriptor::new("/dev/ttyUSB0", "10c4", "ea60")]);
        assert_eq!(
            resolver.resolve("0x10c4", "0xEA60"),
            Some(PathBuf::from("/dev/ttyUSB0"))
        );
        assert_eq!(resolver.resolve("0x10c4", "0xea61"), None);

        let odd = DeviceDescriptor::new("/dev/ttyUSB3", "n/a", "n/a");
        assert_eq!(odd.identity(), None);
        assert!(odd.matches("N/A", "n/a"));
    }

    #[test]
    fn test_wait_for_zero_timeout_polls_once() {
        let mut source = MockDeviceSource::new();
        source.expect_scan().times(1).returning(Vec::new);
        let resolver = DeviceResolver::new(Arc::new(source));
        assert_eq!(resolver.wait_for("10c4", "ea60", Duration::ZERO), None);
    }

    #[test]
    fn test_wait_for_device_appears() {
        let mut source = MockDeviceSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_scan()
            .times(2)
            .in_sequence(&mut seq)
            .returning(Vec::new);
        source
            .expect_scan()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| vec![DeviceDescriptor::new("/dev/ttyUSB3", "10c4", "ea60")]);

        let resolver = DeviceResolver::new(Arc::new(source)).poll_interval(Duration::from_millis(5));
        assert_eq!(
            resolver.wait_for("10c4", "ea60", Duration::from_secs(5)),
            Some(PathBuf::from("/dev/ttyUSB3"))
        );
    }

    #[test]
    fn test_status_report() {
        let resolver = mock_with(vec![DeviceDescriptor::new("/dev/ttyUSB0", "10c4", "ea60")]);
        let report = resolver.status_report();
        assert_eq!(report.ultrasonic, Some(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(report.trigger, None);

        let text = report.to_string();
        assert!(text.contains("Devices found: 1"));
        assert!(text.contains("Device: /dev/ttyUSB0 [10c4:ea60]"));
        assert!(text.contains("Ultrasonic sensor: /dev/ttyUSB0"));
        assert!(text.contains("Trigger device: not found"));
    }

    #[test]
    fn test_is_connected() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("ttyUSB0");
        std::fs::write(&node, b"").unwrap();
        assert!(is_connected(&node));
        std::fs::remove_file(&node).unwrap();
        assert!(!is_connected(&node));
    }
}
