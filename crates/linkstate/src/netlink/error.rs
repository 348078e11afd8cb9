//! Error types for netlink operations.

use std::io;
use std::time::Duration;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking netlink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be decoded. The message is dropped, the stream
    /// continues.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Buffer ended before a fixed-size structure was complete.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Attribute payload does not match its schema.
    #[error("invalid attribute {kind}: {reason}")]
    InvalidAttribute {
        /// Attribute type (flags masked).
        kind: u16,
        /// What was wrong with it.
        reason: String,
    },

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Socket creation, bind, subscription or receive failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A dump request did not complete in time.
    #[error("dump of {table} timed out after {timeout:?}")]
    DumpTimeout {
        /// Table being dumped.
        table: &'static str,
        /// Configured limit.
        timeout: Duration,
    },

    /// The kernel flagged the dump as inconsistent (NLM_F_DUMP_INTR).
    #[error("dump of {table} interrupted by concurrent change")]
    DumpInterrupted {
        /// Table being dumped.
        table: &'static str,
    },

    /// Notifications were skipped between two sequenced messages.
    #[error("sequence gap: expected {expected}, got {actual}")]
    SequenceGap {
        /// Next sequence number that was expected.
        expected: u32,
        /// Sequence number actually received.
        actual: u32,
    },

    /// The socket was closed through its close handle.
    #[error("event source closed")]
    Closed,
}

impl Error {
    /// Create a kernel error from a (negative) errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Wrap an I/O failure of socket setup or receive.
    pub fn connection(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Connection(format!("{}: {}", context, err))
    }

    /// True for codec-level failures (the message is dropped and logged).
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_) | Self::Truncated { .. } | Self::InvalidAttribute { .. }
        )
    }

    /// True for errors that mean kernel state may have been missed.
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            Self::SequenceGap { .. } | Self::DumpInterrupted { .. }
        )
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Fold any codec error into `MalformedMessage`.
    pub(crate) fn into_malformed(self) -> Self {
        match self {
            Self::MalformedMessage(_) => self,
            other if other.is_malformed() => Self::MalformedMessage(other.to_string()),
            other => other,
        }
    }
}
