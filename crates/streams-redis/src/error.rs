use std::time::Duration;

use redis::RedisError;
use sluice_streams::{ErrorKind, StreamCommandsError};
use thiserror::Error;

/// Errors that can occur when using the Redis stream client.
#[derive(Debug, Error)]
pub enum Error {
    /// The client could not connect.
    #[error("failed to connect to redis: {0}")]
    Connect(#[source] RedisError),

    /// The reply did not have the expected shape.
    #[error("malformed {command} reply: {reason}")]
    MalformedReply {
        /// The command whose reply was malformed.
        command: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The server returned an error, or the connection failed.
    #[error(transparent)]
    Redis(#[from] RedisError),

    /// The command did not complete in time.
    #[error("{command} timed out after {after:?}")]
    Timeout {
        /// The command that timed out.
        command: &'static str,
        /// How long it was given.
        after: Duration,
    },
}

impl Error {
    pub(crate) fn malformed(command: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedReply {
            command,
            reason: reason.into(),
        }
    }
}

fn is_transport(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_timeout()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
}

impl StreamCommandsError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(_) | Self::Timeout { .. } => ErrorKind::Transport,
            Self::MalformedReply { .. } => ErrorKind::Protocol,
            Self::Redis(e) if e.code() == Some("BUSYGROUP") => ErrorKind::GroupExists,
            Self::Redis(e) if is_transport(e) => ErrorKind::Transport,
            Self::Redis(_) => ErrorKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use redis::ErrorKind as RedisErrorKind;

    #[test]
    fn test_classifies_errors() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert_eq!(Error::Redis(io).kind(), ErrorKind::Transport);

        let rejected = RedisError::from((RedisErrorKind::TypeError, "wrong type"));
        assert_eq!(Error::Redis(rejected).kind(), ErrorKind::Protocol);

        let timeout = Error::Timeout {
            command: "XACK",
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.kind(), ErrorKind::Transport);
        assert!(timeout.is_transport());

        assert_eq!(
            Error::malformed("XPENDING", "not an array").kind(),
            ErrorKind::Protocol
        );
    }
}
