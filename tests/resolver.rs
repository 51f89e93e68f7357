//! Device resolution over a fake sysfs tree
#![cfg(unix)]

use rangelink_core::core::device::SysfsDeviceSource;
use rangelink_core::{DeviceIdentity, DeviceResolver};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Serial adapters expose their USB identity at different depths above
/// `<class>/<tty>/device`; `depth` picks how many levels up it lives
fn plug(root: &Path, name: &str, vendor: &str, product: &str, depth: usize) {
    let usb = root.join("sys/devices/pci0/usb1").join(format!("1-{}", name));
    let mut tty = usb.clone();
    for level in 1..depth {
        tty = tty.join(format!("level{}", level));
    }
    let tty = tty.join(name);
    fs::create_dir_all(&tty).unwrap();
    fs::write(usb.join("idVendor"), format!("{}\n", vendor)).unwrap();
    fs::write(usb.join("idProduct"), format!("{}\n", product)).unwrap();

    let class = root.join("sys/class/tty").join(name);
    fs::create_dir_all(&class).unwrap();
    symlink(&tty, class.join("device")).unwrap();

    fs::create_dir_all(root.join("dev")).unwrap();
    fs::write(root.join("dev").join(name), b"").unwrap();
}

fn resolver(root: &Path) -> DeviceResolver {
    let source = SysfsDeviceSource::new(root.join("dev"), root.join("sys/class/tty"));
    DeviceResolver::new(Arc::new(source)).poll_interval(Duration::from_millis(20))
}

#[test]
fn resolves_both_devices_at_any_depth() {
    let root = tempfile::tempdir().unwrap();
    plug(root.path(), "ttyUSB0", "1a86", "7523", 1);
    plug(root.path(), "ttyUSB1", "10c4", "ea60", 3);

    let resolver = resolver(root.path());
    assert_eq!(
        resolver.find_ultrasonic(),
        Some(root.path().join("dev/ttyUSB1"))
    );
    assert_eq!(resolver.find_trigger(), Some(root.path().join("dev/ttyUSB0")));
    assert_eq!(
        resolver.resolve("10C4", "EA60"),
        Some(root.path().join("dev/ttyUSB1"))
    );
    assert_eq!(resolver.resolve("dead", "beef"), None);
}

#[test]
fn wait_for_sees_late_device() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("dev")).unwrap();
    let resolver = resolver(root.path());

    let tree = root.path().to_path_buf();
    let plugger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        plug(&tree, "ttyUSB0", "10c4", "ea60", 2);
    });

    let id = DeviceIdentity::ULTRASONIC;
    let found = resolver.wait_for(&id.vendor_hex(), &id.product_hex(), Duration::from_secs(5));
    plugger.join().unwrap();

    assert_eq!(found, Some(root.path().join("dev/ttyUSB0")));
}

#[test]
fn wait_for_gives_up_after_timeout() {
    let root = tempfile::tempdir().unwrap();
    let resolver = resolver(root.path());

    let started = Instant::now();
    assert_eq!(
        resolver.wait_for("1a86", "7523", Duration::from_millis(150)),
        None
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn status_report_lists_everything() {
    let root = tempfile::tempdir().unwrap();
    plug(root.path(), "ttyUSB0", "10c4", "ea60", 2);
    plug(root.path(), "ttyUSB1", "0403", "6001", 2);

    let report = resolver(root.path()).status_report();
    assert_eq!(report.devices.len(), 2);
    assert_eq!(report.ultrasonic, Some(root.path().join("dev/ttyUSB0")));
    assert_eq!(report.trigger, None);

    let text = report.to_string();
    assert!(text.contains("Devices found: 2"));
    assert!(text.contains("[10c4:ea60] - Ultrasonic distance sensor (CP210x)"));
    assert!(text.contains("[0403:6001] - Unknown device"));
    assert!(text.contains("Trigger device: not found"));
}

#[test]
fn unplugged_node_is_no_longer_connected() {
    let root = tempfile::tempdir().unwrap();
    plug(root.path(), "ttyUSB0", "1a86", "7523", 2);
    let resolver = resolver(root.path());

    let path = resolver.find_trigger().unwrap();
    assert!(resolver.is_connected(&path));
    fs::remove_file(&path).unwrap();
    assert!(!resolver.is_connected(&path));
    assert_eq!(resolver.find_trigger(), None);
}
