//! Virtual serial device
//!
//! In-memory stand-in for a serial port, used by tests and benches.
//! A [`VirtualDevice`] is the device side: queue bytes for the link to read,
//! inspect what the link wrote, and inject open/read/write failures.
//! [`VirtualOpener`] hands out streams bound to one device.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::transport::{LinkOpener, LinkStream, SerialConfig, TransportError};

/// Default idle read timeout of a virtual stream
pub const VIRTUAL_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// One write observed on the device side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Bytes written
    pub data: Vec<u8>,
    /// When the write happened
    pub at: Instant,
}

#[derive(Debug, Default)]
struct DeviceState {
    rx: VecDeque<u8>,
    writes: Vec<RecordedWrite>,
    fail_open: bool,
    fail_reads: bool,
    fail_writes: bool,
    opened: Vec<SerialConfig>,
    open_streams: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    data_ready: Condvar,
}

/// Device side of a virtual serial port
#[derive(Debug, Clone, Default)]
pub struct VirtualDevice {
    shared: Arc<Shared>,
}

impl VirtualDevice {
    /// Create a new virtual device
    pub fn new() -> Self {
        Self::default()
    }

    /// Opener bound to this device
    pub fn opener(&self) -> VirtualOpener {
        VirtualOpener {
            device: self.clone(),
        }
    }

    /// Queue bytes for the link to read
    pub fn feed(&self, data: &[u8]) {
        self.shared.state.lock().rx.extend(data.iter().copied());
        self.shared.data_ready.notify_all();
    }

    /// Make future opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.state.lock().fail_open = fail;
    }

    /// Make reads fail (simulates unplugging)
    pub fn set_fail_reads(&self, fail: bool) {
        self.shared.state.lock().fail_reads = fail;
        self.shared.data_ready.notify_all();
    }

    /// Make writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.state.lock().fail_writes = fail;
    }

    /// All writes observed so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.shared.state.lock().writes.clone()
    }

    /// Concatenation of everything written
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared
            .state
            .lock()
            .writes
            .iter()
            .flat_map(|w| w.data.iter().copied())
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.shared.state.lock().writes.clear();
    }

    /// Configurations the device was opened with
    pub fn opened(&self) -> Vec<SerialConfig> {
        self.shared.state.lock().opened.clone()
    }

    /// Number of streams currently open
    pub fn open_streams(&self) -> usize {
        self.shared.state.lock().open_streams
    }

    fn open_stream(&self, config: &SerialConfig) -> Result<VirtualStream, TransportError> {
        let mut state = self.shared.state.lock();
        if state.fail_open {
            return Err(TransportError::PortNotFound(config.port.clone()));
        }
        state.opened.push(config.clone());
        state.open_streams += 1;
        Ok(VirtualStream {
            shared: self.shared.clone(),
        })
    }
}

/// Link side of a virtual serial port
#[derive(Debug)]
pub struct VirtualStream {
    shared: Arc<Shared>,
}

impl Read for VirtualStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + VIRTUAL_READ_TIMEOUT;
        let mut state = self.shared.state.lock();

        loop {
            if state.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            if !state.rx.is_empty() {
                let n = buf.len().min(state.rx.len());
                for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if self
                .shared
                .data_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
        }
    }
}

impl Write for VirtualStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.writes.push(RecordedWrite {
            data: buf.to_vec(),
            at: Instant::now(),
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.open_streams = state.open_streams.saturating_sub(1);
    }
}

/// Opener that always connects to one [`VirtualDevice`]
#[derive(Debug, Clone)]
pub struct VirtualOpener {
    device: VirtualDevice,
}

impl LinkOpener for VirtualOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn LinkStream>, TransportError> {
        Ok(Box::new(self.device.open_stream(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fed_bytes() {
        let device = VirtualDevice::new();
        let mut stream = device.opener().open(&SerialConfig::ultrasonic("vdev")).unwrap();
        device.feed(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(stream.read(&mut buf).unwrap(), 1);

        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_write_and_close_tracking() {
        let device = VirtualDevice::new();
        let mut stream = device.opener().open(&SerialConfig::trigger("vdev")).unwrap();
        assert_eq!(device.open_streams(), 1);

        stream.write_all(b"abc").unwrap();
        assert_eq!(device.written_bytes(), b"abc".to_vec());

        device.set_fail_writes(true);
        assert!(stream.write_all(b"x").is_err());

        drop(stream);
        assert_eq!(device.open_streams(), 0);
        assert_eq!(device.opened()[0].baud_rate, 115_200);
    }

    #[test]
    fn test_fail_open() {
        let device = VirtualDevice::new();
        device.set_fail_open(true);
        assert!(matches!(
            device.opener().open(&SerialConfig::trigger("vdev")),
            Err(TransportError::PortNotFound(_))
        ));
    }
}
