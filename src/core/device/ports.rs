//! Portable enumeration through `serialport`

use serialport::SerialPortType;
use tracing::warn;

use super::{DeviceDescriptor, DeviceSource};

/// Lists USB serial ports reported by `serialport::available_ports`
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortDeviceSource;

impl DeviceSource for SerialPortDeviceSource {
    fn scan(&self) -> Vec<DeviceDescriptor> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                return Vec::new();
            }
        };

        let mut devices: Vec<DeviceDescriptor> = ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(info) => Some(DeviceDescriptor::new(
                    port.port_name,
                    &format!("{:04x}", info.vid),
                    &format!("{:04x}", info.pid),
                )),
                _ => None,
            })
            .collect();

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }
}
