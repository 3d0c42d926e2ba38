use std::error::Error;
use std::fmt::Debug;

use thiserror::Error;

/// Classification of a failed stream command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection loss or timeout. The caller may retry.
    Transport,

    /// Malformed or unexpected reply, or a command the server rejected.
    Protocol,

    /// The consumer group already exists.
    GroupExists,
}

/// Marker trait for `StreamCommands` errors.
pub trait StreamCommandsError: Debug + Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> ErrorKind;

    /// Whether the failure came from the transport rather than the protocol.
    fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Errors parsing ids and cursors from their textual form.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Not a valid cursor literal or id.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Not a valid `<timestamp>-<sequence>` id.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),
}
