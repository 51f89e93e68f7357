//! Ultrasonic distance sensor link
//!
//! Owns one serial stream and one dedicated reader thread. The thread feeds
//! every chunk it reads into a [`FrameDecoder`] and pushes the resulting
//! [`DistanceEvent`]s, in arrival order, onto a channel.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

use super::decoder::{DecoderStats, DistanceEvent, FrameDecoder};
use super::transport::{is_idle_error, LinkOpener, LinkStream, SerialConfig, SerialOpener, TransportError};

/// Size of a single read from the port
const READ_CHUNK: usize = 64;

/// Ultrasonic sensor reader
pub struct UltrasonicReader {
    config: SerialConfig,
    opener: Arc<dyn LinkOpener>,
    running: Arc<AtomicBool>,
    destroyed: AtomicBool,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    stats: Arc<Mutex<DecoderStats>>,
    event_tx: Sender<DistanceEvent>,
    event_rx: Receiver<DistanceEvent>,
}

impl UltrasonicReader {
    /// Create a reader for a real serial port
    pub fn new(config: SerialConfig) -> Self {
        Self::with_opener(config, Arc::new(SerialOpener))
    }

    /// Create a reader that opens its stream through `opener`
    pub fn with_opener(config: SerialConfig, opener: Arc<dyn LinkOpener>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            config,
            opener,
            running: Arc::new(AtomicBool::new(false)),
            destroyed: AtomicBool::new(false),
            handle: Mutex::new(None),
            stats: Arc::new(Mutex::new(DecoderStats::default())),
            event_tx,
            event_rx,
        }
    }

    /// Route events into an existing channel instead of the built-in one
    #[must_use]
    pub fn with_events(mut self, event_tx: Sender<DistanceEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    /// Receiver for the built-in event channel.
    ///
    /// Clones share one queue: each event is delivered to exactly one receiver.
    pub fn subscribe(&self) -> Receiver<DistanceEvent> {
        self.event_rx.clone()
    }

    /// Open the port and start the reader thread
    pub fn start(&self) -> Result<(), TransportError> {
        let mut handle = self.handle.lock();

        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }

        // Reap a reader that ended on its own after a stream error
        if let Some(old) = handle.take() {
            if old.join().is_err() {
                error!("Previous ultrasonic reader thread panicked");
            }
        }

        let stream = match self.opener.open(&self.config) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start ultrasonic link {}: {}", self.config.port, e);
                let _ = self.event_tx.send(DistanceEvent::Error {
                    message: format!("failed to open serial port: {}", e),
                });
                return Err(e);
            }
        };

        *self.stats.lock() = DecoderStats::default();
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let stats = self.stats.clone();
        let event_tx = self.event_tx.clone();
        let port = self.config.port.clone();

        let spawned = thread::Builder::new()
            .name("ultrasonic-reader".to_string())
            .spawn(move || read_loop(stream, &running, &stats, &event_tx, &port));

        match spawned {
            Ok(h) => {
                *handle = Some(h);
                info!("Ultrasonic link started: {}", self.config.connection_info());
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                error!("Failed to spawn ultrasonic reader: {}", e);
                Err(TransportError::Io(e))
            }
        }
    }

    /// Stop reading and close the port. Safe to call repeatedly and from any thread.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Cannot join ourselves; the loop exits on the cleared flag
                return;
            }
            if handle.join().is_err() {
                error!("Ultrasonic reader thread panicked");
            }
        }

        if was_running {
            info!("Ultrasonic link stopped: {}", self.config.port);
        }
    }

    /// Stop the link and refuse further starts
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// Whether the reader is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Device path of this link
    pub fn device_path(&self) -> &str {
        &self.config.port
    }

    /// Serial configuration of this link
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Decoder counters of the current (or last) run
    pub fn stats(&self) -> DecoderStats {
        *self.stats.lock()
    }
}

impl Drop for UltrasonicReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    mut stream: Box<dyn LinkStream>,
    running: &AtomicBool,
    stats: &Mutex<DecoderStats>,
    event_tx: &Sender<DistanceEvent>,
    port: &str,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];

    while running.load(Ordering::SeqCst) {
        let failure = match stream.read(&mut buf) {
            Ok(0) => "device closed".to_string(),
            Ok(n) => {
                decoder.push_with(&buf[..n], |event| {
                    let _ = event_tx.send(event);
                });
                *stats.lock() = decoder.stats();
                continue;
            }
            Err(ref e) if is_idle_error(e) => continue,
            Err(e) => e.to_string(),
        };

        // Only report if nobody asked us to stop in the meantime
        if running.swap(false, Ordering::SeqCst) {
            error!("Ultrasonic read failed on {}: {}", port, failure);
            let _ = event_tx.send(DistanceEvent::Error {
                message: format!("read failed: {}", failure),
            });
        }
        break;
    }

    drop(stream);
    debug!("Ultrasonic reader exited: {}", port);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::DistanceFrame;
    use crate::core::simulator::VirtualDevice;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn reader(device: &VirtualDevice) -> UltrasonicReader {
        UltrasonicReader::with_opener(
            SerialConfig::ultrasonic("/dev/ttyUSB0"),
            Arc::new(device.opener()),
        )
    }

    #[test]
    fn test_reads_frames_in_order() {
        let device = VirtualDevice::new();
        let reader = reader(&device);
        let rx = reader.subscribe();
        reader.start().unwrap();

        let mut data: Vec<u8> = DistanceFrame::encode(100).into();
        data.extend_from_slice(DistanceFrame::encode(101).as_bytes());
        device.feed(&data);

        assert_eq!(rx.recv_timeout(WAIT).unwrap().distance(), Some(100));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().distance(), Some(101));

        reader.stop();
        assert!(!reader.is_running());
        assert_eq!(device.open_streams(), 0);
        assert_eq!(device.opened()[0].baud_rate, 9600);
    }

    #[test]
    fn test_start_twice_fails() {
        let device = VirtualDevice::new();
        let reader = reader(&device);
        reader.start().unwrap();
        assert!(matches!(reader.start(), Err(TransportError::AlreadyRunning)));
        reader.stop();
        reader.stop();
    }

    #[test]
    fn test_open_failure_reports_error() {
        let device = VirtualDevice::new();
        device.set_fail_open(true);
        let reader = reader(&device);
        let rx = reader.subscribe();

        assert!(reader.start().is_err());
        assert!(!reader.is_running());
        assert!(matches!(rx.try_recv(), Ok(DistanceEvent::Error { .. })));
    }

    #[test]
    fn test_read_failure_is_terminal() {
        let device = VirtualDevice::new();
        let reader = reader(&device);
        let rx = reader.subscribe();
        reader.start().unwrap();

        device.set_fail_reads(true);
        let event = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(event, DistanceEvent::Error { .. }));

        // The stream is closed by the exiting thread
        let deadline = std::time::Instant::now() + WAIT;
        while device.open_streams() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!reader.is_running());
        assert_eq!(device.open_streams(), 0);

        // Restart after the failure is allowed
        device.set_fail_reads(false);
        reader.start().unwrap();
        assert!(reader.is_running());
    }

    #[test]
    fn test_destroy_refuses_restart() {
        let device = VirtualDevice::new();
        let reader = reader(&device);
        reader.start().unwrap();
        reader.destroy();
        reader.destroy();
        assert!(matches!(reader.start(), Err(TransportError::Destroyed)));
    }
}
