//! Interactive control lines for the trigger link
//!
//! Lines read from stdin either reconfigure the running link or are sent
//! once as a manual trigger:
//! - `:interval <ms>` changes the period
//! - `:payload <text>` replaces the periodic payload
//! - `:hex <bytes>` writes raw bytes once
//! - anything else is written once

use thiserror::Error;

use crate::core::codec::{parse_escapes, parse_hex, CodecError};

/// Line ending appended to manual sends that lack one
pub const MANUAL_LINE_ENDING: &[u8] = b"\r\n";

/// Parsed control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    /// Change the interval (ms)
    Interval(u64),
    /// Replace the payload
    Payload(Vec<u8>),
    /// Send bytes once
    Send(Vec<u8>),
}

/// Control line errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    /// Interval is not a positive integer
    #[error("Invalid interval: {0}")]
    BadInterval(String),

    /// Command given without its argument
    #[error("Missing argument for :{0}")]
    MissingArgument(&'static str),

    /// Malformed hex bytes
    #[error("Invalid hex: {0}")]
    BadHex(String),

    /// Unrecognised `:command`
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Parse one stdin line; `None` for blank lines
pub fn parse_line(line: &str) -> Result<Option<ControlLine>, ControlError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let Some(command) = line.strip_prefix(':') else {
        return Ok(Some(ControlLine::Send(manual_payload(line))));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim_start()),
        None => (command, ""),
    };

    match name {
        "interval" => {
            if arg.trim().is_empty() {
                return Err(ControlError::MissingArgument("interval"));
            }
            match arg.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Ok(Some(ControlLine::Interval(ms))),
                _ => Err(ControlError::BadInterval(arg.trim().to_string())),
            }
        }
        "payload" => {
            if arg.is_empty() {
                return Err(ControlError::MissingArgument("payload"));
            }
            Ok(Some(ControlLine::Payload(parse_escapes(arg))))
        }
        "hex" => parse_hex(arg)
            .map(|data| Some(ControlLine::Send(data)))
            .map_err(|e: CodecError| ControlError::BadHex(e.to_string())),
        other => Err(ControlError::UnknownCommand(other.to_string())),
    }
}

fn manual_payload(line: &str) -> Vec<u8> {
    let mut data = parse_escapes(line);
    if !data.ends_with(b"\n") {
        data.extend_from_slice(MANUAL_LINE_ENDING);
    }
    data
}
