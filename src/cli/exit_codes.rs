//! Process exit statuses
//!
//! Scripts driving the tool tell device problems apart from link failures
//! by the exit status alone, so every failure path maps to one of these.

use std::io::ErrorKind;
use std::process::ExitCode;

use crate::config::ConfigError;
use crate::core::transport::TransportError;

/// Exit status values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Finished normally (including Ctrl+C)
    pub const SUCCESS: u8 = 0;
    /// Anything without a more specific status
    pub const ERROR: u8 = 1;
    /// Rejected command-line input
    pub const INVALID_ARGS: u8 = 2;
    /// A link failed to open or died while running
    pub const LINK_FAILED: u8 = 3;
    /// Gave up waiting
    pub const TIMEOUT: u8 = 4;
    /// No access to the device node
    pub const PERMISSION_DENIED: u8 = 5;
    /// Unreadable or invalid configuration
    pub const CONFIG_ERROR: u8 = 6;
    /// No attached device has the requested identity
    pub const DEVICE_NOT_FOUND: u8 = 10;
    /// The device node does not exist
    pub const PORT_NOT_FOUND: u8 = 11;
    /// Misuse of a link by the tool itself
    pub const INTERNAL_ERROR: u8 = 70;

    /// Human-readable meaning of `code`
    pub fn describe(code: u8) -> &'static str {
        match code {
            Self::SUCCESS => "Success",
            Self::ERROR => "General error",
            Self::INVALID_ARGS => "Invalid arguments",
            Self::LINK_FAILED => "Link failed",
            Self::TIMEOUT => "Timed out",
            Self::PERMISSION_DENIED => "Permission denied",
            Self::CONFIG_ERROR => "Configuration error",
            Self::DEVICE_NOT_FOUND => "Device not found",
            Self::PORT_NOT_FOUND => "Port not found",
            Self::INTERNAL_ERROR => "Internal error",
            _ => "Unknown status",
        }
    }
}

/// Outcome of a command
#[derive(Debug)]
pub enum CliResult {
    /// Finished, with an optional note for stderr
    Success(Option<String>),
    /// Failed with an exit status and a message
    Error(u8, String),
}

impl CliResult {
    /// Finished without a note
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Failure with an explicit status
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Rejected input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::error(ExitCodes::INVALID_ARGS, msg)
    }

    /// A link stopped on its own
    pub fn link_failed(msg: impl Into<String>) -> Self {
        Self::error(ExitCodes::LINK_FAILED, msg)
    }

    /// Nothing attached matches `identity`
    pub fn device_not_found(identity: &str) -> Self {
        Self::error(
            ExitCodes::DEVICE_NOT_FOUND,
            format!("No device with identity {}", identity),
        )
    }

    /// Exit status
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Note or error message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(note) => note.as_deref(),
            Self::Error(_, msg) => Some(msg),
        }
    }

    /// Process exit code
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Pick the most specific status for an error chain
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<TransportError>() {
            Self::from(e)
        } else if let Some(e) = err.downcast_ref::<ConfigError>() {
            Self::from(e)
        } else if let Some(e) = err.downcast_ref::<std::io::Error>() {
            Self::from(e)
        } else {
            Self::error(ExitCodes::ERROR, format!("{:#}", err))
        }
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::ConnectionFailed(_) | TransportError::Io(_) => ExitCodes::LINK_FAILED,
            TransportError::InvalidInterval(_) => ExitCodes::INVALID_ARGS,
            TransportError::AlreadyRunning | TransportError::Destroyed => {
                ExitCodes::INTERNAL_ERROR
            }
        };
        Self::error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&std::io::Error> for CliResult {
    fn from(err: &std::io::Error) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::PORT_NOT_FOUND,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            ErrorKind::TimedOut => ExitCodes::TIMEOUT,
            _ => ExitCodes::ERROR,
        };
        Self::error(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure() {
        let ok = CliResult::success();
        assert!(ok.is_success());
        assert_eq!(ok.code(), ExitCodes::SUCCESS);
        assert_eq!(ok.message(), None);

        let failed = CliResult::link_failed("Trigger link stopped");
        assert!(!failed.is_success());
        assert_eq!(failed.code(), ExitCodes::LINK_FAILED);
        assert_eq!(failed.message(), Some("Trigger link stopped"));
    }

    #[test]
    fn test_transport_errors() {
        let missing = TransportError::PortNotFound("/dev/ttyUSB9".to_string());
        assert_eq!(CliResult::from(&missing).code(), ExitCodes::PORT_NOT_FOUND);

        let denied = TransportError::PermissionDenied("/dev/ttyUSB0".to_string());
        assert_eq!(CliResult::from(&denied).code(), ExitCodes::PERMISSION_DENIED);

        let interval = TransportError::InvalidInterval(0);
        assert_eq!(CliResult::from(&interval).code(), ExitCodes::INVALID_ARGS);
    }

    #[test]
    fn test_error_chain() {
        let err = anyhow::Error::new(ConfigError::NoConfigDir);
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::CONFIG_ERROR);

        let err = anyhow::Error::new(TransportError::Destroyed).context("starting reader");
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::INTERNAL_ERROR);

        let err = anyhow::anyhow!("something odd");
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_describe() {
        let missing = CliResult::device_not_found("10c4:ea60");
        assert_eq!(ExitCodes::describe(missing.code()), "Device not found");
        assert_eq!(missing.message(), Some("No device with identity 10c4:ea60"));
        assert_eq!(ExitCodes::describe(200), "Unknown status");
    }
}
