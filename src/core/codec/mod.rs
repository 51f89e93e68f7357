//! Byte/text helpers shared by the links
//!
//! - Hex rendering for frame diagnostics
//! - Escape-sequence parsing for trigger payloads typed on a command line

mod hex;
mod text;

pub use self::hex::{frame_hex, parse_hex};
pub use text::{escape_display, parse_escapes};

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Invalid input format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Hex decode error
    #[error("Invalid hex: {0}")]
    Hex(#[from] ::hex::FromHexError),
}
