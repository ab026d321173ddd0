//! Dispatch error types

use std::path::PathBuf;
use thiserror::Error;

/// Exit code when the queue drained normally
pub const EXIT_OK: u8 = 0;

/// Exit code for errors that fit no other class
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for bad host specs or configuration
pub const EXIT_CONFIG: u8 = 2;

/// Exit code for command file I/O failures
pub const EXIT_IO: u8 = 3;

/// Exit code when the loop was cancelled by a signal
pub const EXIT_CANCELLED: u8 = 130;

/// Errors that can occur while dispatching commands
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Command file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Status query for {host} failed: {message}")]
    ExternalCommand { host: String, message: String },

    #[error("Launch on {host} failed: {message}")]
    Launch { host: String, message: String },
}

impl DispatchError {
    pub fn config(message: impl Into<String>) -> Self {
        DispatchError::Config(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DispatchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn external(host: &str, message: impl Into<String>) -> Self {
        DispatchError::ExternalCommand {
            host: host.to_string(),
            message: message.into(),
        }
    }

    pub fn launch(host: &str, message: impl Into<String>) -> Self {
        DispatchError::Launch {
            host: host.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchError::Config(_) => EXIT_CONFIG,
            DispatchError::Io { .. } => EXIT_IO,
            DispatchError::ExternalCommand { .. } | DispatchError::Launch { .. } => EXIT_FAILURE,
        }
    }
}

/// Pick the exit code for an application error
///
/// Falls back to [`EXIT_FAILURE`] when no [`DispatchError`] is in the chain.
pub fn exit_code_for(report: &eyre::Report) -> u8 {
    report
        .chain()
        .find_map(|cause| cause.downcast_ref::<DispatchError>())
        .map(DispatchError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
