//! Crate-level error type.

use std::path::PathBuf;

/// Result type for daemon-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors outside the netlink layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Netlink(#[from] crate::netlink::Error),

    /// The config file could not be read or is invalid.
    #[error("config {}: {reason}", display_path(.path))]
    Config {
        path: Option<PathBuf>,
        reason: String,
    },

    /// D-Bus connection, name claim or dispatch failed.
    #[error("D-Bus: {0}")]
    Bus(String),
}

impl Error {
    pub(crate) fn config(path: Option<&std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::Config {
            path: path.map(|p| p.to_path_buf()),
            reason: reason.to_string(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<inline>".into(),
    }
}

impl From<dbus::Error> for Error {
    fn from(err: dbus::Error) -> Self {
        Self::Bus(err.message().unwrap_or("unknown error").to_string())
    }
}
