//! Error taxonomy shared by every crate in the workspace.

use thiserror::Error;

/// Field control error types covering configuration, transport, and protocol faults.
///
/// No fault in this workspace is fatal: transport and protocol errors are
/// logged at the call site and the affected component retries on its next
/// scheduled tick with its prior confirmed state intact.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FcsError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connect/read/write failure on a device link.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected response from a device.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Convenience type alias for field control operations.
pub type FcsResult<T> = Result<T, FcsError>;
