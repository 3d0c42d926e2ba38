use sluice_streams::{Cursor, ErrorKind, StreamCommandsError, StreamId};
use thiserror::Error;

use crate::Operation;

/// Errors that can occur in the in-memory stream log.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The consumer group already exists.
    #[error("BUSYGROUP consumer group '{group}' already exists on '{stream}'")]
    GroupExists {
        /// The stream name.
        stream: String,
        /// The group name.
        group: String,
    },

    /// An explicit id was not greater than the stream's last id.
    #[error("id {id} is equal or smaller than the stream's last id {last}")]
    IdTooSmall {
        /// The rejected id.
        id: StreamId,
        /// The stream's last id.
        last: StreamId,
    },

    /// The cursor is not valid for the command.
    #[error("cursor '{0}' is not valid here")]
    InvalidCursor(Cursor),

    /// The stream or consumer group does not exist.
    #[error("NOGROUP no consumer group '{group}' for stream '{stream}'")]
    NoGroup {
        /// The stream name.
        stream: String,
        /// The group name.
        group: String,
    },

    /// A failure injected for the operation.
    #[error("log unavailable during {0:?}")]
    Unavailable(Operation),
}

impl StreamCommandsError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::GroupExists { .. } => ErrorKind::GroupExists,
            Self::Unavailable(_) => ErrorKind::Transport,
            Self::IdTooSmall { .. } | Self::InvalidCursor(_) | Self::NoGroup { .. } => {
                ErrorKind::Protocol
            }
        }
    }
}
