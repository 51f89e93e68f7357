//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text and JSON output
//! - Interactive trigger control lines

pub mod control;
pub mod exit_codes;
pub mod output;

pub use control::{parse_line, ControlError, ControlLine};
pub use exit_codes::{CliResult, ExitCodes};
pub use output::{render, OutputFormat};
