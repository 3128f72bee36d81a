//! Error types for px100.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. The variants are grouped into the four
//! failure families reported by [`Error::kind()`]: transport, protocol,
//! verification, and discovery.

use crate::types::CommandKind;

/// The error type for all px100 operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/read/write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for bytes from the instrument.
    #[error("timeout waiting for response")]
    Timeout,

    /// The instrument sent nothing back for a request.
    ///
    /// Usually the load is switched off, the wrong port was opened, or the
    /// USB adapter was unplugged.
    #[error("no answer from device")]
    NoAnswer,

    /// A write was answered with something other than the single `0x6F`
    /// acknowledgement byte.
    #[error("write rejected: response {response:02X?}")]
    WriteRejected {
        /// The raw bytes the instrument returned instead of the ACK.
        response: Vec<u8>,
    },

    /// A read response had the wrong length or corrupted marker bytes.
    #[error("frame error: {0}")]
    Frame(String),

    /// A protocol-level error not tied to a single response frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command was accepted but the instrument never reported the
    /// requested value back.
    #[error("{command} not verified after {attempts} attempts")]
    Verification {
        /// The command that failed to verify.
        command: CommandKind,
        /// How many write/read-back cycles were made.
        attempts: u32,
    },

    /// No instrument was found on any candidate port.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// An invalid parameter was passed to a command or codec.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the instrument has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The link did not deliver an answer (timeouts, I/O, no answer).
    Transport,
    /// The instrument answered, but not with a well-formed response.
    Protocol,
    /// A command never reached its requested value.
    Verification,
    /// No instrument could be found.
    Discovery,
    /// The caller passed something the protocol cannot express.
    Usage,
}

impl Error {
    /// Classify this error into its failure family.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Transport(_)
            | Error::Timeout
            | Error::NoAnswer
            | Error::NotConnected
            | Error::ConnectionLost
            | Error::Io(_) => FailureKind::Transport,
            Error::WriteRejected { .. } | Error::Frame(_) | Error::Protocol(_) => {
                FailureKind::Protocol
            }
            Error::Verification { .. } => FailureKind::Verification,
            Error::Discovery(_) => FailureKind::Discovery,
            Error::InvalidParameter(_) => FailureKind::Usage,
        }
    }

    /// Returns `true` if the link itself is unusable and the session
    /// should be torn down rather than retried.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::NotConnected | Error::ConnectionLost | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
