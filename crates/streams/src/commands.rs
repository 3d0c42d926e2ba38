use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::entry::{ConsumerId, Entry, PendingEntry};
use crate::error::StreamCommandsError;
use crate::id::{Cursor, StreamId};

/// How long a read may wait for new entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadWait {
    /// Return immediately, possibly with nothing.
    Immediate,

    /// Wait up to the given duration.
    Timeout(Duration),

    /// Wait until an entry arrives.
    Indefinite,
}

/// Outcome of ensuring a consumer group exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupCreation {
    /// The group (and possibly the stream) was created.
    Created,

    /// The group already existed and the collision was suppressed.
    AlreadyExisted,
}

/// The primitive consumer-group commands of a stream log.
///
/// Implementations translate each call into exactly one command and never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait StreamCommands
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for commands.
    type Error: StreamCommandsError;

    /// Creates the consumer group, and the stream if it does not exist.
    ///
    /// `start` is the group's initial cursor and only applies on first
    /// creation. If the group exists and `suppress_exists` is false, fails
    /// with an error of kind [`crate::ErrorKind::GroupExists`].
    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start: Cursor,
        suppress_exists: bool,
    ) -> Result<GroupCreation, Self::Error>;

    /// Reads the next entry after `from` without group semantics.
    ///
    /// Returns `None` if nothing arrived within `wait`.
    async fn read_new(
        &self,
        stream: &str,
        from: Cursor,
        wait: ReadWait,
    ) -> Result<Option<Entry>, Self::Error>;

    /// Reads up to `count` entries as `consumer` of `group`.
    ///
    /// With [`Cursor::Undelivered`] the entries are new deliveries and join
    /// the pending entries list under `consumer`. With [`Cursor::After`] the
    /// consumer's own pending entries with greater ids are returned again,
    /// each counting as a delivery, and `wait` is ignored.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        cursor: Cursor,
        count: usize,
        wait: ReadWait,
    ) -> Result<Vec<Entry>, Self::Error>;

    /// Lists up to `count` pending entries of the group in ascending id order.
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, Self::Error>;

    /// Transfers ownership of a pending entry to `consumer` if it has been
    /// idle for at least `min_idle`.
    ///
    /// Returns `None` if the entry is no longer pending or was not idle long
    /// enough.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        min_idle: Duration,
        id: StreamId,
    ) -> Result<Option<Entry>, Self::Error>;

    /// Acknowledges an entry, removing it from the pending entries list.
    ///
    /// Returns the number of entries acknowledged (0 or 1).
    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, Self::Error>;
}
