use sluice_streams::{StreamCommandsError, StreamId};
use thiserror::Error;

/// Errors that can occur reading from a consumer group.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: StreamCommandsError,
{
    /// The delivery was already completed.
    #[error("delivery {0} was already completed")]
    AlreadyCompleted(StreamId),

    /// A stream command failed while reading.
    #[error("{operation} failed: {source}")]
    Command {
        /// The command that failed.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: E,
    },

    /// The reader options are invalid.
    #[error(transparent)]
    InvalidOptions(#[from] InvalidOptions),

    /// The consumer group could not be ensured at startup.
    #[error("failed to ensure consumer group '{group}' on '{stream}': {source}")]
    Startup {
        /// The stream name.
        stream: String,
        /// The group name.
        group: String,
        /// The underlying error.
        #[source]
        source: E,
    },
}

impl<E> Error<E>
where
    E: StreamCommandsError,
{
    /// Returns the underlying command error, if any.
    pub const fn command_error(&self) -> Option<&E> {
        match self {
            Self::Command { source, .. } | Self::Startup { source, .. } => Some(source),
            Self::AlreadyCompleted(_) | Self::InvalidOptions(_) => None,
        }
    }
}

/// Reader options that failed validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid reader options: {0}")]
pub struct InvalidOptions(pub String);
