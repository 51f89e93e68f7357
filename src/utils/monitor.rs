//! Connection monitoring
//!
//! Periodically checks that watched device nodes still exist and reports
//! the moment one disappears. Each disappearance is reported once; the watch
//! re-arms when the node shows up again. Reconnection itself is left to the
//! caller.

use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::device::is_connected;

/// Default check period
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Connection monitor events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Watched node disappeared
    Disconnected {
        /// Watch name
        name: String,
        /// Device path
        path: PathBuf,
    },
    /// Watched node is present again
    Reconnected {
        /// Watch name
        name: String,
        /// Device path
        path: PathBuf,
    },
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected { name, path } => {
                write!(f, "{} disconnected: {}", name, path.display())
            }
            Self::Reconnected { name, path } => write!(f, "{} reconnected: {}", name, path.display()),
        }
    }
}

impl MonitorEvent {
    /// Watch name
    pub fn name(&self) -> &str {
        match self {
            Self::Disconnected { name, .. } | Self::Reconnected { name, .. } => name,
        }
    }
}

/// Callback run when a watched node disappears
pub type DisconnectCallback = Box<dyn FnMut(&Path) + Send>;

type Probe = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

struct Watch {
    name: String,
    path: PathBuf,
    generation: u64,
    connected: bool,
    on_disconnect: Option<DisconnectCallback>,
}

/// Callback taken out of its watch while it runs
struct Pending {
    generation: u64,
    path: PathBuf,
    callback: DisconnectCallback,
}

/// Watches device paths for disappearance
pub struct ConnectionMonitor {
    watches: Arc<Mutex<Vec<Watch>>>,
    generation: AtomicU64,
    probe: Probe,
    period: Duration,
    event_tx: mpsc::Sender<MonitorEvent>,
    cancel_tx: Option<mpsc::Sender<()>>,
}

impl ConnectionMonitor {
    /// Create a monitor checking every `period`
    pub fn new(period: Duration, event_tx: mpsc::Sender<MonitorEvent>) -> Self {
        Self {
            watches: Arc::new(Mutex::new(Vec::new())),
            generation: AtomicU64::new(0),
            probe: Arc::new(is_connected),
            period: period.max(Duration::from_millis(1)),
            event_tx,
            cancel_tx: None,
        }
    }

    /// Replace the presence check
    #[must_use]
    pub fn with_probe(mut self, probe: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Watch `path` under `name`, replacing any watch with the same name
    pub fn watch(&self, name: &str, path: impl Into<PathBuf>) {
        self.add(name, path.into(), None);
    }

    /// Watch `path` and run `on_disconnect` each time it disappears
    pub fn watch_with(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        on_disconnect: impl FnMut(&Path) + Send + 'static,
    ) {
        self.add(name, path.into(), Some(Box::new(on_disconnect)));
    }

    fn add(&self, name: &str, path: PathBuf, on_disconnect: Option<DisconnectCallback>) {
        let connected = (self.probe)(&path);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Watching {} at {} (present: {})",
            name,
            path.display(),
            connected
        );

        let mut watches = self.watches.lock();
        watches.retain(|w| w.name != name);
        watches.push(Watch {
            name: name.to_string(),
            path,
            generation,
            connected,
            on_disconnect,
        });
    }

    /// Stop watching `name`; returns whether a watch was removed
    pub fn unwatch(&self, name: &str) -> bool {
        let mut watches = self.watches.lock();
        let before = watches.len();
        watches.retain(|w| w.name != name);
        watches.len() != before
    }

    /// Names of current watches
    pub fn watched(&self) -> Vec<String> {
        self.watches.lock().iter().map(|w| w.name.clone()).collect()
    }

    /// Check every watch once and return the transitions found.
    ///
    /// Disconnect callbacks run on the calling thread before this returns.
    pub fn poll_once(&self) -> Vec<MonitorEvent> {
        let (events, pending) = detect(&self.watches, &self.probe);
        run_callbacks(&self.watches, pending);
        publish(&self.event_tx, &events);
        events
    }

    /// Start periodic checking on the tokio runtime
    pub fn start(&mut self) {
        if self.cancel_tx.is_some() {
            return;
        }

        let (cancel_tx, mut cancel_rx) = mpsc::channel::<()>(1);
        self.cancel_tx = Some(cancel_tx);

        let watches = self.watches.clone();
        let probe = self.probe.clone();
        let event_tx = self.event_tx.clone();
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        info!("Connection monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let (events, pending) = detect(&watches, &probe);
                        publish(&event_tx, &events);
                        if !pending.is_empty() {
                            // Callbacks typically stop a link and join its thread
                            let watches = watches.clone();
                            let done = tokio::task::spawn_blocking(move || {
                                run_callbacks(&watches, pending);
                            });
                            if let Err(e) = done.await {
                                warn!("Disconnect callback failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        info!("Connection monitor started, period {} ms", self.period.as_millis());
    }

    /// Stop periodic checking
    pub fn stop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.try_send(());
        }
    }

    /// Whether periodic checking is active
    pub fn is_running(&self) -> bool {
        self.cancel_tx.is_some()
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn detect(watches: &Mutex<Vec<Watch>>, probe: &Probe) -> (Vec<MonitorEvent>, Vec<Pending>) {
    let mut events = Vec::new();
    let mut pending = Vec::new();

    let mut watches = watches.lock();
    for watch in watches.iter_mut() {
        let present = probe(&watch.path);
        if present == watch.connected {
            continue;
        }
        watch.connected = present;

        if present {
            info!("Device reappeared: {} ({})", watch.name, watch.path.display());
            events.push(MonitorEvent::Reconnected {
                name: watch.name.clone(),
                path: watch.path.clone(),
            });
        } else {
            warn!("Device disconnected: {} ({})", watch.name, watch.path.display());
            events.push(MonitorEvent::Disconnected {
                name: watch.name.clone(),
                path: watch.path.clone(),
            });
            if let Some(callback) = watch.on_disconnect.take() {
                pending.push(Pending {
                    generation: watch.generation,
                    path: watch.path.clone(),
                    callback,
                });
            }
        }
    }

    (events, pending)
}

/// Run callbacks unlocked so they may call back into the monitor, then hand
/// each one back to its watch unless that watch was replaced meanwhile
fn run_callbacks(watches: &Mutex<Vec<Watch>>, pending: Vec<Pending>) {
    for Pending {
        generation,
        path,
        mut callback,
    } in pending
    {
        callback(&path);
        let mut watches = watches.lock();
        if let Some(watch) = watches.iter_mut().find(|w| w.generation == generation) {
            watch.on_disconnect = Some(callback);
        }
    }
}

fn publish(event_tx: &mpsc::Sender<MonitorEvent>, events: &[MonitorEvent]) {
    for event in events {
        if let Err(e) = event_tx.try_send(event.clone()) {
            warn!("Dropping monitor event: {}", e);
        }
    }
}
