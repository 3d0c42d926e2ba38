use sluice_streams::{Cursor, Entry, ReadWait, StreamCommands};
use tracing::trace;

use crate::constants::DEFAULT_READ_WAIT;
use crate::error::Error;

/// Follows a stream without a consumer group.
///
/// Nothing is tracked on the server: there is no pending list and nothing to
/// acknowledge. While positioned at [`Cursor::Latest`], entries appended
/// between two timed-out waits are not seen; start from an explicit id to
/// read without gaps.
#[derive(Clone, Debug)]
pub struct StreamTail<C>
where
    C: StreamCommands,
{
    commands: C,
    position: Cursor,
    stream: String,
    wait: ReadWait,
}

impl<C> StreamTail<C>
where
    C: StreamCommands,
{
    /// Creates a tail that starts with entries appended from now on.
    pub fn new(commands: C, stream: impl Into<String>) -> Self {
        Self {
            commands,
            position: Cursor::Latest,
            stream: stream.into(),
            wait: ReadWait::Timeout(DEFAULT_READ_WAIT),
        }
    }

    /// Starts reading after the given cursor instead.
    #[must_use]
    pub const fn starting_at(mut self, position: Cursor) -> Self {
        self.position = position;
        self
    }

    /// Sets how long each read waits.
    #[must_use]
    pub const fn with_wait(mut self, wait: ReadWait) -> Self {
        self.wait = wait;
        self
    }

    /// The cursor the next read starts from.
    #[must_use]
    pub const fn position(&self) -> Cursor {
        self.position
    }

    /// Reads the next entry, or `None` if nothing arrived within the wait.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the read fails. The position is left
    /// unchanged.
    pub async fn next(&mut self) -> Result<Option<Entry>, Error<C::Error>> {
        let entry = self
            .commands
            .read_new(&self.stream, self.position, self.wait)
            .await
            .map_err(|source| Error::Command {
                operation: "read_new",
                source,
            })?;

        if let Some(entry) = &entry {
            trace!(stream = %self.stream, id = %entry.id, "tail advanced");
            self.position = Cursor::After(entry.id);
        }

        Ok(entry)
    }
}
