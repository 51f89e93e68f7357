//! # Rangelink Core Library
//!
//! Serial link plumbing for an ultrasonic distance sensor and a trigger device:
//! - Resynchronizing decoder for the sensor's 7-byte distance frames
//! - Fixed-delay trigger transmitter with live reconfiguration and manual sends
//! - Device resolution by USB vendor/product identity
//! - Connection monitoring for device disappearance
//!
//! ## Example
//!
//! ```rust,no_run
//! use rangelink_core::{DeviceResolver, DistanceEvent, SerialConfig, UltrasonicReader};
//!
//! fn main() -> anyhow::Result<()> {
//!     let resolver = DeviceResolver::system();
//!     let path = resolver.find_ultrasonic().ok_or_else(|| anyhow::anyhow!("no sensor"))?;
//!
//!     let reader = UltrasonicReader::new(SerialConfig::ultrasonic(&path.to_string_lossy()));
//!     let events = reader.subscribe();
//!     reader.start()?;
//!
//!     for event in events.iter() {
//!         if let DistanceEvent::Reading { distance_cm } = event {
//!             println!("{} cm", distance_cm);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::decoder::{DecoderStats, DistanceEvent, FrameDecoder};
pub use crate::core::device::{
    DeviceDescriptor, DeviceIdentity, DeviceResolver, DeviceSource, StatusReport,
};
pub use crate::core::frame::{DistanceFrame, InvalidReason};
pub use crate::core::transmitter::{TriggerConfig, TriggerEvent, TriggerTransmitter};
pub use crate::core::transport::{LinkOpener, LinkStream, SerialConfig, TransportError};
pub use crate::core::ultrasonic::UltrasonicReader;
pub use crate::utils::monitor::{ConnectionMonitor, MonitorEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
