use std::sync::Arc;
use std::time::Duration;

use sluice_streams::{ConsumerId, Entry, StreamCommands, StreamId};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::Error;

/// How an entry came to be delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOrigin {
    /// Re-delivered from this consumer's own pending entries after a restart.
    /// The read does not report idle time or delivery count.
    Recovered,

    /// Delivered for the first time.
    New,

    /// Reclaimed from another consumer that left it idle.
    Claimed {
        /// The consumer that owned the entry before the claim.
        previous_owner: ConsumerId,
        /// How long the entry had been idle before the claim.
        idle: Duration,
        /// Deliveries before the claim.
        delivery_count: u64,
    },
}

/// Metadata describing a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryInfo {
    /// The stream the entry was read from.
    pub stream: Arc<str>,

    /// The consumer group.
    pub group: Arc<str>,

    /// The consumer the entry is now pending under.
    pub consumer_id: ConsumerId,

    /// The entry id.
    pub id: StreamId,

    /// How the entry was delivered.
    pub origin: DeliveryOrigin,
}

impl DeliveryInfo {
    /// Number of times the entry has been delivered, counting this delivery.
    ///
    /// `None` for recovered entries.
    #[must_use]
    pub const fn delivery_count(&self) -> Option<u64> {
        match &self.origin {
            DeliveryOrigin::Recovered => None,
            DeliveryOrigin::New => Some(1),
            DeliveryOrigin::Claimed { delivery_count, .. } => Some(delivery_count.saturating_add(1)),
        }
    }

    /// How long the entry was idle before this delivery.
    ///
    /// `None` for recovered entries.
    #[must_use]
    pub const fn idle(&self) -> Option<Duration> {
        match &self.origin {
            DeliveryOrigin::Recovered => None,
            DeliveryOrigin::New => Some(Duration::ZERO),
            DeliveryOrigin::Claimed { idle, .. } => Some(*idle),
        }
    }
}

/// Issues acknowledgments for a reader on its task tracker.
///
/// Acknowledgments run on the runtime the reader was started on, so a
/// completion may fire from any thread.
#[derive(Clone, Debug)]
pub(crate) struct Acknowledger<C>
where
    C: StreamCommands,
{
    commands: C,
    stream: Arc<str>,
    group: Arc<str>,
    runtime: Handle,
    tracker: TaskTracker,
}

impl<C> Acknowledger<C>
where
    C: StreamCommands,
{
    pub(crate) const fn new(
        commands: C,
        stream: Arc<str>,
        group: Arc<str>,
        runtime: Handle,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            commands,
            stream,
            group,
            runtime,
            tracker,
        }
    }

    pub(crate) fn stream(&self) -> &Arc<str> {
        &self.stream
    }

    pub(crate) fn group(&self) -> &Arc<str> {
        &self.group
    }

    fn spawn_ack(&self, id: StreamId) {
        let commands = self.commands.clone();
        let stream = self.stream.clone();
        let group = self.group.clone();

        self.tracker.spawn_on(
            async move {
                match commands.ack(&stream, &group, id).await {
                    Ok(0) => debug!(%stream, %group, %id, "entry was no longer pending"),
                    Ok(_) => debug!(%stream, %group, %id, "acknowledged entry"),
                    Err(e) => warn!(
                        %stream,
                        %group,
                        %id,
                        error = %e,
                        "failed to acknowledge entry; it stays pending"
                    ),
                }
            },
            &self.runtime,
        );
    }
}

/// One-shot completion signal of a delivery.
///
/// Firing it acknowledges the entry. Dropping it unfired leaves the entry
/// pending, so it is redelivered after a restart or reclaimed by another
/// consumer.
#[derive(Debug)]
pub struct Completion<C>
where
    C: StreamCommands,
{
    id: StreamId,
    acknowledger: Option<Acknowledger<C>>,
}

impl<C> Completion<C>
where
    C: StreamCommands,
{
    pub(crate) const fn new(id: StreamId, acknowledger: Acknowledger<C>) -> Self {
        Self {
            id,
            acknowledger: Some(acknowledger),
        }
    }

    /// The id of the entry this signal acknowledges.
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    /// Whether the signal has fired.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.acknowledger.is_none()
    }

    /// Fires the signal, acknowledging the entry in the background.
    pub fn complete(mut self) {
        self.fire();
    }

    fn fire(&mut self) -> bool {
        self.acknowledger.take().is_some_and(|acknowledger| {
            acknowledger.spawn_ack(self.id);
            true
        })
    }
}

impl<C> Drop for Completion<C>
where
    C: StreamCommands,
{
    fn drop(&mut self) {
        if let Some(acknowledger) = &self.acknowledger {
            debug!(
                stream = %acknowledger.stream(),
                group = %acknowledger.group(),
                id = %self.id,
                "delivery dropped without completion; entry stays pending"
            );
        }
    }
}

/// An entry handed to the caller by a [`crate::GroupReader`].
///
/// The entry stays pending under this reader's consumer until
/// [`Delivery::complete`] is called.
#[derive(Debug)]
pub struct Delivery<C>
where
    C: StreamCommands,
{
    entry: Entry,
    info: DeliveryInfo,
    completion: Completion<C>,
}

impl<C> Delivery<C>
where
    C: StreamCommands,
{
    pub(crate) fn new(
        entry: Entry,
        consumer_id: ConsumerId,
        origin: DeliveryOrigin,
        acknowledger: Acknowledger<C>,
    ) -> Self {
        let info = DeliveryInfo {
            stream: acknowledger.stream().clone(),
            group: acknowledger.group().clone(),
            consumer_id,
            id: entry.id,
            origin,
        };

        Self {
            completion: Completion::new(entry.id, acknowledger),
            entry,
            info,
        }
    }

    /// The delivered entry.
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Metadata about the delivery.
    #[must_use]
    pub const fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    /// The entry id.
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.entry.id
    }

    /// Whether the delivery has been completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    /// Signals that processing finished, acknowledging the entry in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCompleted`] if the delivery was already
    /// completed. No second acknowledgment is issued.
    pub fn complete(&mut self) -> Result<(), Error<C::Error>> {
        if self.completion.fire() {
            Ok(())
        } else {
            Err(Error::AlreadyCompleted(self.entry.id))
        }
    }

    /// Splits the delivery so the completion can be fired elsewhere.
    #[must_use]
    pub fn into_parts(self) -> (Entry, DeliveryInfo, Completion<C>) {
        (self.entry, self.info, self.completion)
    }
}
