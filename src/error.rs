use std::path::PathBuf;
use std::time::Duration;

use panel_hal::HalError;
use thiserror::Error;

use crate::events::PinRole;

/// Library error type for status-panel operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line in the configuration file is not `KEY=VALUE`.
    #[error("config line {line}: expected KEY=VALUE, found {content:?}")]
    ConfigSyntax { line: usize, content: String },

    /// A pin named by the configuration could not be acquired.
    #[error("failed to bind {role} to {pin}")]
    Bind {
        role: PinRole,
        pin: String,
        #[source]
        source: HalError,
    },

    /// The panel rejected a frame.
    #[error("display error")]
    Display(#[source] HalError),

    /// Button watchers kept running past the stop deadline.
    #[error("button watchers did not stop within {0:?}")]
    WatcherStop(Duration),

    /// File-change notifications could not be set up.
    #[error(transparent)]
    Watch(#[from] notify::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
