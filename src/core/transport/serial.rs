//! Serial port transport implementation

use super::{LinkOpener, LinkStream, TransportError};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Read timeout of an open port; bounds how long `stop()` waits for the reader
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Ultrasonic sensor baud rate
pub const ULTRASONIC_BAUD_RATE: u32 = 9600;

/// Trigger device baud rate
pub const TRIGGER_BAUD_RATE: u32 = 115_200;

/// Serial port configuration. Framing is fixed at 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port path (e.g., /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Create a new serial configuration
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
        }
    }

    /// Ultrasonic sensor link (9600 baud)
    pub fn ultrasonic(port: &str) -> Self {
        Self::new(port, ULTRASONIC_BAUD_RATE)
    }

    /// Trigger device link (115200 baud)
    pub fn trigger(port: &str) -> Self {
        Self::new(port, TRIGGER_BAUD_RATE)
    }

    /// Set baud rate
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Human-readable description of the link
    pub fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1)", self.port, self.baud_rate)
    }
}

/// Open serial port
pub struct SerialStream {
    port: Box<dyn SerialPort>,
}

impl SerialStream {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn LinkStream>, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(format!("{}: {}", config.port, e)),
            })?;

        debug!("Opened {}", config.connection_info());
        Ok(Box::new(SerialStream::new(port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_presets() {
        let sensor = SerialConfig::ultrasonic("/dev/ttyUSB0");
        assert_eq!(sensor.baud_rate, 9600);
        assert_eq!(sensor.connection_info(), "/dev/ttyUSB0 @ 9600 baud (8N1)");

        let trigger = SerialConfig::trigger("/dev/ttyUSB1").baud_rate(57600);
        assert_eq!(trigger.baud_rate, 57600);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialOpener.open(&SerialConfig::ultrasonic("/dev/rangelink-does-not-exist"));
        assert!(matches!(
            result,
            Err(TransportError::PortNotFound(_)) | Err(TransportError::ConnectionFailed(_))
        ));
    }
}
