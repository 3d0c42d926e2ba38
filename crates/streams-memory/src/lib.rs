//! In-memory (single node) implementation of a stream log with consumer
//! groups, for tests and local development.
//!
//! Idle times are measured on the tokio clock, so tests can drive them with
//! `tokio::time::pause` and `tokio::time::advance`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use sluice_streams::{
    ConsumerId, Cursor, Entry, GroupCreation, PendingEntry, ReadWait, StreamCommands, StreamId,
};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

type Fields = Vec<(Bytes, Bytes)>;

/// Commands that can be made to fail with [`MemoryStreamLog::inject_failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `ensure_group`.
    EnsureGroup,
    /// `read_new`.
    ReadNew,
    /// `read_group`.
    ReadGroup,
    /// `list_pending`.
    ListPending,
    /// `claim`.
    Claim,
    /// `ack`.
    Ack,
}

#[derive(Debug)]
struct Pending {
    consumer: ConsumerId,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: StreamId,
    pending: BTreeMap<StreamId, Pending>,
}

#[derive(Debug, Default)]
struct Log {
    entries: BTreeMap<StreamId, Fields>,
    last_id: StreamId,
    groups: HashMap<String, Group>,
}

#[derive(Debug, Default)]
struct State {
    failures: HashSet<Operation>,
    logs: HashMap<String, Log>,
}

impl State {
    fn take_failure(&mut self, operation: Operation) -> Result<(), Error> {
        if self.failures.remove(&operation) {
            Err(Error::Unavailable(operation))
        } else {
            Ok(())
        }
    }

    fn group_mut(
        &mut self,
        stream: &str,
        group_name: &str,
    ) -> Result<(&BTreeMap<StreamId, Fields>, &mut Group), Error> {
        let no_group = || Error::NoGroup {
            stream: stream.to_string(),
            group: group_name.to_string(),
        };

        let Log {
            entries, groups, ..
        } = self.logs.get_mut(stream).ok_or_else(no_group)?;
        let group = groups.get_mut(group_name).ok_or_else(no_group)?;

        Ok((&*entries, group))
    }
}

fn entry_at(entries: &BTreeMap<StreamId, Fields>, id: StreamId) -> Entry {
    Entry::new(id, entries.get(&id).cloned().unwrap_or_default())
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// In-memory stream log.
#[derive(Clone, Debug, Default)]
pub struct MemoryStreamLog {
    appended: Arc<Notify>,
    state: Arc<Mutex<State>>,
}

impl MemoryStreamLog {
    /// Creates a new, empty `MemoryStreamLog`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry with an auto-generated id and returns the id.
    pub async fn append<I, K, V>(&self, stream: &str, fields: I) -> StreamId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        let id = {
            let mut state = self.state.lock().await;
            let log = state.logs.entry(stream.to_string()).or_default();

            let now_ms = unix_now_ms();
            let id = if now_ms > log.last_id.timestamp_ms {
                StreamId::new(now_ms, 0)
            } else {
                log.last_id.successor()
            };

            log.entries.insert(id, fields);
            log.last_id = id;
            id
        };

        self.appended.notify_waiters();
        debug!(stream, %id, "appended entry");

        id
    }

    /// Appends an entry with an explicit id, which must be greater than the
    /// stream's last id.
    pub async fn append_with_id<I, K, V>(
        &self,
        stream: &str,
        id: StreamId,
        fields: I,
    ) -> Result<StreamId, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        {
            let mut state = self.state.lock().await;
            let log = state.logs.entry(stream.to_string()).or_default();

            if id <= log.last_id || id == StreamId::MIN {
                return Err(Error::IdTooSmall {
                    id,
                    last: log.last_id,
                });
            }

            log.entries.insert(id, fields);
            log.last_id = id;
        }

        self.appended.notify_waiters();
        debug!(stream, %id, "appended entry");

        Ok(id)
    }

    /// Makes the next call of `operation` fail with a transport error.
    pub async fn inject_failure(&self, operation: Operation) {
        self.state.lock().await.failures.insert(operation);
    }

    /// Returns the number of entries in a stream.
    pub async fn len(&self, stream: &str) -> usize {
        self.state
            .lock()
            .await
            .logs
            .get(stream)
            .map_or(0, |log| log.entries.len())
    }

    /// Returns the number of pending entries in a consumer group.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.state
            .lock()
            .await
            .logs
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |group| group.pending.len())
    }

    /// Runs `attempt` until it yields a value or `wait` runs out.
    async fn wait_for<T, F>(&self, wait: ReadWait, mut attempt: F) -> Result<Option<T>, Error>
    where
        F: FnMut(&mut State) -> Result<Option<T>, Error> + Send,
        T: Send,
    {
        let deadline = match wait {
            ReadWait::Timeout(timeout) => Some(Instant::now() + timeout),
            ReadWait::Immediate | ReadWait::Indefinite => None,
        };

        loop {
            // Registered before checking so an append in between still wakes us.
            let notified = self.appended.notified();

            let found = {
                let mut state = self.state.lock().await;
                attempt(&mut state)?
            };
            if found.is_some() {
                return Ok(found);
            }

            match (wait, deadline) {
                (ReadWait::Indefinite, _) => notified.await,
                (ReadWait::Timeout(_), Some(deadline)) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                _ => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl StreamCommands for MemoryStreamLog {
    type Error = Error;

    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start: Cursor,
        suppress_exists: bool,
    ) -> Result<GroupCreation, Self::Error> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::EnsureGroup)?;

        if start == Cursor::Undelivered {
            return Err(Error::InvalidCursor(start));
        }

        let log = state.logs.entry(stream.to_string()).or_default();

        if log.groups.contains_key(group) {
            return if suppress_exists {
                Ok(GroupCreation::AlreadyExisted)
            } else {
                Err(Error::GroupExists {
                    stream: stream.to_string(),
                    group: group.to_string(),
                })
            };
        }

        let last_delivered = match start {
            Cursor::After(id) => id,
            Cursor::Latest | Cursor::Undelivered => log.last_id,
        };

        log.groups.insert(
            group.to_string(),
            Group {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        debug!(stream, group, %last_delivered, "created consumer group");

        Ok(GroupCreation::Created)
    }

    async fn read_new(
        &self,
        stream: &str,
        from: Cursor,
        wait: ReadWait,
    ) -> Result<Option<Entry>, Self::Error> {
        let after = {
            let mut state = self.state.lock().await;
            state.take_failure(Operation::ReadNew)?;

            match from {
                Cursor::After(id) => id,
                Cursor::Latest => state.logs.get(stream).map_or(StreamId::MIN, |log| log.last_id),
                Cursor::Undelivered => return Err(Error::InvalidCursor(from)),
            }
        };

        self.wait_for(wait, |state| {
            Ok(state.logs.get(stream).and_then(|log| {
                log.entries
                    .range((Excluded(after), Unbounded))
                    .next()
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
            }))
        })
        .await
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        cursor: Cursor,
        count: usize,
        wait: ReadWait,
    ) -> Result<Vec<Entry>, Self::Error> {
        {
            let mut state = self.state.lock().await;
            state.take_failure(Operation::ReadGroup)?;

            let (entries, group_state) = state.group_mut(stream, group)?;

            match cursor {
                // Reading history is a delivery: idle time resets and the count grows.
                Cursor::After(after) => {
                    let now = Instant::now();

                    return Ok(group_state
                        .pending
                        .range_mut((Excluded(after), Unbounded))
                        .filter(|(_, pending)| pending.consumer == *consumer)
                        .take(count)
                        .map(|(id, pending)| {
                            pending.delivered_at = now;
                            pending.delivery_count += 1;
                            entry_at(entries, *id)
                        })
                        .collect());
                }
                Cursor::Latest => return Err(Error::InvalidCursor(cursor)),
                Cursor::Undelivered => {}
            }
        }

        let delivered = self
            .wait_for(wait, |state| {
                let (entries, group_state) = state.group_mut(stream, group)?;

                let batch: Vec<Entry> = entries
                    .range((Excluded(group_state.last_delivered), Unbounded))
                    .take(count)
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
                    .collect();

                let Some(last) = batch.last() else {
                    return Ok(None);
                };

                let now = Instant::now();
                group_state.last_delivered = last.id;
                for entry in &batch {
                    group_state.pending.insert(
                        entry.id,
                        Pending {
                            consumer: consumer.clone(),
                            delivered_at: now,
                            delivery_count: 1,
                        },
                    );
                }

                Ok(Some(batch))
            })
            .await?;

        Ok(delivered.unwrap_or_default())
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, Self::Error> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::ListPending)?;

        let (_, group_state) = state.group_mut(stream, group)?;
        let now = Instant::now();

        Ok(group_state
            .pending
            .iter()
            .take(count)
            .map(|(id, pending)| PendingEntry {
                id: *id,
                consumer: pending.consumer.clone(),
                idle: now.saturating_duration_since(pending.delivered_at),
                delivery_count: pending.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        min_idle: Duration,
        id: StreamId,
    ) -> Result<Option<Entry>, Self::Error> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Claim)?;

        let (entries, group_state) = state.group_mut(stream, group)?;
        let now = Instant::now();

        let Some(pending) = group_state.pending.get_mut(&id) else {
            return Ok(None);
        };

        if now.saturating_duration_since(pending.delivered_at) < min_idle {
            return Ok(None);
        }

        pending.consumer = consumer.clone();
        pending.delivered_at = now;
        pending.delivery_count += 1;

        Ok(Some(entry_at(entries, id)))
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, Self::Error> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Ack)?;

        let removed = state
            .logs
            .get_mut(stream)
            .and_then(|log| log.groups.get_mut(group))
            .is_some_and(|group_state| group_state.pending.remove(&id).is_some());

        Ok(u64::from(removed))
    }
}
