//! Core module containing the link functionality
//!
//! This module provides:
//! - Distance frame layout and validation
//! - Resynchronizing frame decoder
//! - Serial transport with an injectable opener
//! - Ultrasonic reader and trigger transmitter links
//! - USB device discovery
//! - Hex and escape-sequence codecs
//! - Virtual serial device for tests and benches

pub mod codec;
pub mod decoder;
pub mod device;
pub mod frame;
pub mod simulator;
pub mod transmitter;
pub mod transport;
pub mod ultrasonic;
