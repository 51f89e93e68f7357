//! Utility services running beside the links

pub mod monitor;

pub use monitor::{ConnectionMonitor, DisconnectCallback, MonitorEvent};
