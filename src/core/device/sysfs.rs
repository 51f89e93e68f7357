//! Linux sysfs device enumeration

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DeviceDescriptor, DeviceSource};

/// Parent levels above `<tty>/device` searched for identity files
const IDENTITY_LEVELS: [&str; 3] = ["..", "../..", "../../.."];

/// Enumerates `<dev_root>/<prefix>*` nodes and reads their USB identity
/// from `<sys_class_tty>/<name>/device/..`
#[derive(Debug, Clone)]
pub struct SysfsDeviceSource {
    dev_root: PathBuf,
    sys_class_tty: PathBuf,
    prefixes: Vec<String>,
}

impl SysfsDeviceSource {
    /// Create a source over explicit roots, matching `ttyUSB*` nodes
    pub fn new(dev_root: impl Into<PathBuf>, sys_class_tty: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            sys_class_tty: sys_class_tty.into(),
            prefixes: vec!["ttyUSB".to_string()],
        }
    }

    /// Source over `/dev` and `/sys/class/tty`
    pub fn system() -> Self {
        Self::new("/dev", "/sys/class/tty")
    }

    /// Replace the node name prefixes
    #[must_use]
    pub fn prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    fn identity(&self, name: &str) -> Option<(String, String)> {
        let device = self.sys_class_tty.join(name).join("device");

        IDENTITY_LEVELS.iter().find_map(|level| {
            let dir = device.join(level);
            let vendor = read_id(&dir.join("idVendor"))?;
            let product = read_id(&dir.join("idProduct"))?;
            Some((vendor, product))
        })
    }
}

fn read_id(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let id = content.trim();
    (!id.is_empty()).then(|| id.to_string())
}

impl DeviceSource for SysfsDeviceSource {
    fn scan(&self) -> Vec<DeviceDescriptor> {
        let entries = match fs::read_dir(&self.dev_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {}", self.dev_root.display(), e);
                return Vec::new();
            }
        };

        let mut devices: Vec<DeviceDescriptor> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !self.prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                    return None;
                }
                match self.identity(&name) {
                    Some((vendor, product)) => {
                        let device = DeviceDescriptor::new(entry.path(), &vendor, &product);
                        info!("Discovered {}", device);
                        Some(device)
                    }
                    None => {
                        debug!("No USB identity for {}", name);
                        None
                    }
                }
            })
            .collect();

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    /// Lays out a sysfs-like tree where the identity sits two levels above
    /// `<tty>/device`, as it does for a USB interface
    fn fake_node(root: &Path, name: &str, vendor: &str, product: &str) {
        let usb = root.join("sys/devices/usb1").join(format!("1-{}", name));
        let tty = usb.join("1-1:1.0").join(name);
        fs::create_dir_all(&tty).unwrap();
        fs::write(usb.join("idVendor"), format!("{}\n", vendor)).unwrap();
        fs::write(usb.join("idProduct"), format!("{}\n", product)).unwrap();

        let class = root.join("sys/class/tty").join(name);
        fs::create_dir_all(&class).unwrap();
        symlink(&tty, class.join("device")).unwrap();

        fs::create_dir_all(root.join("dev")).unwrap();
        fs::write(root.join("dev").join(name), b"").unwrap();
    }

    fn source(root: &Path) -> SysfsDeviceSource {
        SysfsDeviceSource::new(root.join("dev"), root.join("sys/class/tty"))
    }

    #[test]
    fn test_scan_reads_identity() {
        let root = tempfile::tempdir().unwrap();
        fake_node(root.path(), "ttyUSB1", "1a86", "7523");
        fake_node(root.path(), "ttyUSB0", "10c4", "ea60");
        fs::write(root.path().join("dev/ttyS0"), b"").unwrap();

        let devices = source(root.path()).scan();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].path, root.path().join("dev/ttyUSB0"));
        assert_eq!(devices[0].vendor_id, "10c4");
        assert_eq!(devices[1].description, "Trigger device (CH340)");
    }

    #[test]
    fn test_node_without_identity_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("dev")).unwrap();
        fs::write(root.path().join("dev/ttyUSB7"), b"").unwrap();
        assert!(source(root.path()).scan().is_empty());
    }

    #[test]
    fn test_missing_dev_root() {
        let root = tempfile::tempdir().unwrap();
        assert!(source(&root.path().join("nope")).scan().is_empty());
    }

    #[test]
    fn test_custom_prefixes() {
        let root = tempfile::tempdir().unwrap();
        fake_node(root.path(), "ttyACM0", "10c4", "ea60");
        assert!(source(root.path()).scan().is_empty());

        let acm = source(root.path()).prefixes(vec!["ttyACM".to_string()]);
        assert_eq!(acm.scan().len(), 1);
    }
}
