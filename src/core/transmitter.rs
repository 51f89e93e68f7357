//! Periodic trigger transmitter
//!
//! A single worker thread owns the trigger stream. It writes the current
//! payload on a fixed-delay schedule and serves out-of-band manual sends from
//! a command channel, so at most one write is ever in flight.
//!
//! The payload and interval live together in one [`TriggerConfig`] that is
//! replaced as a whole on every reconfiguration.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::codec::escape_display;
use super::transport::{LinkOpener, LinkStream, SerialConfig, SerialOpener, TransportError};

/// Default trigger payload
pub const DEFAULT_TRIGGER_DATA: &[u8] = b"8 18 13 \r\n";

/// Default transmission interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Payload and cadence of the trigger link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Bytes written on every tick
    pub payload: Vec<u8>,
    /// Delay between the end of one write and the next tick
    pub interval: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            payload: DEFAULT_TRIGGER_DATA.to_vec(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Event produced by the trigger link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// Payload written
    Sent {
        /// Payload text, surrounding whitespace trimmed
        data: String,
        /// Whether this was a manual send
        manual: bool,
    },
    /// Write failed, the link is stopping
    Error {
        /// Error description
        message: String,
    },
    /// Worker exited
    Stopped,
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent { data, manual: false } => write!(f, "sent: {}", data),
            Self::Sent { data, manual: true } => write!(f, "sent (manual): {}", data),
            Self::Error { message } => write!(f, "error: {}", message),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

enum Command {
    SendOnce { data: Vec<u8>, reply: Sender<bool> },
    Reschedule,
    Stop,
}

/// Trigger device transmitter
pub struct TriggerTransmitter {
    serial: SerialConfig,
    opener: Arc<dyn LinkOpener>,
    config: Arc<RwLock<Arc<TriggerConfig>>>,
    running: Arc<AtomicBool>,
    destroyed: AtomicBool,
    worker: Mutex<Option<Worker>>,
    event_tx: Sender<TriggerEvent>,
    event_rx: Receiver<TriggerEvent>,
}

struct Worker {
    commands: Sender<Command>,
    handle: thread::JoinHandle<()>,
}

impl TriggerTransmitter {
    /// Create a transmitter for a real serial port
    pub fn new(serial: SerialConfig) -> Self {
        Self::with_opener(serial, Arc::new(SerialOpener))
    }

    /// Create a transmitter that opens its stream through `opener`
    pub fn with_opener(serial: SerialConfig, opener: Arc<dyn LinkOpener>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            serial,
            opener,
            config: Arc::new(RwLock::new(Arc::new(TriggerConfig::default()))),
            running: Arc::new(AtomicBool::new(false)),
            destroyed: AtomicBool::new(false),
            worker: Mutex::new(None),
            event_tx,
            event_rx,
        }
    }

    /// Set the payload
    #[must_use]
    pub fn with_trigger_data(self, payload: impl Into<Vec<u8>>) -> Self {
        self.replace_config(|c| c.payload = payload.into());
        self
    }

    /// Set the interval
    #[must_use]
    pub fn with_interval(self, interval: Duration) -> Self {
        self.replace_config(|c| c.interval = interval);
        self
    }

    /// Route events into an existing channel instead of the built-in one
    #[must_use]
    pub fn with_events(mut self, event_tx: Sender<TriggerEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    /// Receiver for the built-in event channel
    pub fn subscribe(&self) -> Receiver<TriggerEvent> {
        self.event_rx.clone()
    }

    /// Open the port and start the periodic task; the first send is immediate
    pub fn start(&self) -> Result<(), TransportError> {
        let mut worker = self.worker.lock();

        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }
        if self.config.read().interval.is_zero() {
            return Err(TransportError::InvalidInterval(0));
        }

        if let Some(old) = worker.take() {
            join_worker(old);
        }

        let stream = match self.opener.open(&self.serial) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start trigger link {}: {}", self.serial.port, e);
                let _ = self.event_tx.send(TriggerEvent::Error {
                    message: format!("failed to open serial port: {}", e),
                });
                return Err(e);
            }
        };

        let (commands, command_rx) = unbounded();
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let port = self.serial.port.clone();

        let spawned = thread::Builder::new()
            .name("trigger-sender".to_string())
            .spawn(move || send_loop(stream, &running, &config, &command_rx, &event_tx, &port));

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { commands, handle });
                info!(
                    "Trigger link started: {}, interval {} ms",
                    self.serial.connection_info(),
                    self.interval().as_millis()
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                error!("Failed to spawn trigger sender: {}", e);
                Err(TransportError::Io(e))
            }
        }
    }

    /// Cancel the periodic task and close the port. Safe to call repeatedly.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = worker.commands.send(Command::Stop);
            join_worker(worker);
        }

        if was_running {
            info!("Trigger link stopped: {}", self.serial.port);
        }
    }

    /// Stop the link and refuse further starts
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// Change the interval.
    ///
    /// While running the periodic task is rescheduled, which fires one send
    /// immediately. While stopped the value is only recorded.
    pub fn update_interval(&self, interval_ms: u64) -> Result<(), TransportError> {
        if interval_ms == 0 {
            return Err(TransportError::InvalidInterval(interval_ms));
        }
        self.replace_config(|c| c.interval = Duration::from_millis(interval_ms));

        if self.is_running() {
            if let Some(worker) = self.worker.lock().as_ref() {
                let _ = worker.commands.send(Command::Reschedule);
            }
            info!("Trigger interval updated: {} ms", interval_ms);
        }
        Ok(())
    }

    /// Replace the payload; the next tick writes the new bytes
    pub fn update_trigger_data(&self, payload: impl Into<Vec<u8>>) {
        let payload = payload.into();
        info!("Trigger data updated: {}", escape_display(&payload));
        self.replace_config(|c| c.payload = payload);
    }

    /// Write `data` once, out of band.
    ///
    /// Returns `false` when the link is stopped or the write fails.
    pub fn send_once(&self, data: &[u8]) -> bool {
        if !self.is_running() {
            debug!("Manual send ignored, trigger link not running");
            return false;
        }

        let (reply, reply_rx) = bounded(1);
        let queued = match self.worker.lock().as_ref() {
            Some(worker) => worker
                .commands
                .send(Command::SendOnce {
                    data: data.to_vec(),
                    reply,
                })
                .is_ok(),
            None => false,
        };

        // A worker that exits drops the queued reply sender
        queued && reply_rx.recv().unwrap_or(false)
    }

    /// Whether the periodic task is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current payload
    pub fn trigger_data(&self) -> Vec<u8> {
        self.config.read().payload.clone()
    }

    /// Current interval
    pub fn interval(&self) -> Duration {
        self.config.read().interval
    }

    /// Device path of this link
    pub fn device_path(&self) -> &str {
        &self.serial.port
    }

    fn replace_config(&self, update: impl FnOnce(&mut TriggerConfig)) {
        let mut slot = self.config.write();
        let mut next = TriggerConfig::clone(&slot);
        update(&mut next);
        *slot = Arc::new(next);
    }
}

impl Drop for TriggerTransmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_worker(worker: Worker) {
    if worker.handle.join().is_err() {
        error!("Trigger sender thread panicked");
    }
}

fn display_payload(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}

fn write_payload(stream: &mut dyn LinkStream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(data)?;
    stream.flush()
}

fn send_loop(
    mut stream: Box<dyn LinkStream>,
    running: &AtomicBool,
    config: &RwLock<Arc<TriggerConfig>>,
    commands: &Receiver<Command>,
    event_tx: &Sender<TriggerEvent>,
    port: &str,
) {
    let mut next_tick = Instant::now();

    while running.load(Ordering::SeqCst) {
        let wait = next_tick.saturating_duration_since(Instant::now());

        let failure = match commands.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                let current = config.read().clone();
                match write_payload(stream.as_mut(), &current.payload) {
                    Ok(()) => {
                        let data = display_payload(&current.payload);
                        debug!("Trigger sent: {}", data);
                        let _ = event_tx.send(TriggerEvent::Sent { data, manual: false });
                        next_tick = Instant::now() + current.interval;
                        continue;
                    }
                    Err(e) => e,
                }
            }
            Ok(Command::SendOnce { data, reply }) => match write_payload(stream.as_mut(), &data) {
                Ok(()) => {
                    let data = display_payload(&data);
                    debug!("Manual trigger sent: {}", data);
                    let _ = event_tx.send(TriggerEvent::Sent { data, manual: true });
                    let _ = reply.send(true);
                    continue;
                }
                Err(e) => {
                    let _ = reply.send(false);
                    e
                }
            },
            Ok(Command::Reschedule) => {
                next_tick = Instant::now();
                continue;
            }
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        };

        // A failed write ends the link
        running.store(false, Ordering::SeqCst);
        error!("Trigger write failed on {}: {}", port, failure);
        let _ = event_tx.send(TriggerEvent::Error {
            message: format!("write failed: {}", failure),
        });
        break;
    }

    drop(stream);
    let _ = event_tx.send(TriggerEvent::Stopped);
    debug!("Trigger sender exited: {}", port);
}
