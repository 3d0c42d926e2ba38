use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use sluice_streams::{
    ConsumerId, Cursor, Entry, PendingEntry, ReadWait, StreamCommands, StreamId,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::delivery::{Acknowledger, Delivery, DeliveryOrigin};
use crate::error::Error;
use crate::options::ReaderOptions;

type ReaderResult<T, C> = Result<T, Error<<C as StreamCommands>::Error>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Re-reading this consumer's own pending entries with ids after `after`.
    CatchUp { after: StreamId },

    /// Reclaiming entries other consumers abandoned and reading new ones.
    Live,

    Done,
}

/// Controls a running [`GroupReader`] from elsewhere.
#[derive(Clone, Debug)]
pub struct ReaderHandle {
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl ReaderHandle {
    /// Asks the reader to stop.
    ///
    /// The reader observes the request on its next pull and ends. A read
    /// already blocked is not interrupted, yielded deliveries are left as they
    /// are, and entries fetched but not yet yielded stay pending.
    pub fn stop(&self) {
        self.shutdown_token.cancel();
    }

    /// Whether stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Waits for every acknowledgment spawned so far to finish.
    ///
    /// Concurrent callers may miss the wake-up of one another; call it from a
    /// single task.
    pub async fn settle(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
        self.task_tracker.reopen();
    }
}

/// Reads a stream as one consumer of a consumer group.
///
/// The reader first re-delivers entries this consumer received but never
/// acknowledged, then alternates between reclaiming entries other consumers
/// left idle for longer than the idle timeout and reading new entries.
/// Reclaimed entries always come before new ones. One command is in flight at
/// a time, and only while the caller is pulling.
#[derive(Debug)]
pub struct GroupReader<C>
where
    C: StreamCommands,
{
    acknowledger: Acknowledger<C>,
    commands: C,
    consumer_id: ConsumerId,
    handle: ReaderHandle,
    options: ReaderOptions,
    phase: Phase,
    ready: VecDeque<(Entry, DeliveryOrigin)>,
    reclaim: VecDeque<PendingEntry>,
}

impl<C> GroupReader<C>
where
    C: StreamCommands,
{
    /// Validates the options and ensures the consumer group exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if the options are invalid and
    /// [`Error::Startup`] if the group could not be ensured. Startup is not
    /// retried.
    pub async fn start(commands: C, options: ReaderOptions) -> ReaderResult<Self, C> {
        options.validate()?;

        let creation = commands
            .ensure_group(&options.stream, &options.group, options.start, true)
            .await
            .map_err(|source| Error::Startup {
                stream: options.stream.clone(),
                group: options.group.clone(),
                source,
            })?;

        let consumer_id = options
            .consumer_id
            .clone()
            .unwrap_or_else(ConsumerId::generate);

        info!(
            stream = %options.stream,
            group = %options.group,
            consumer = %consumer_id,
            ?creation,
            "consumer group reader started"
        );

        let handle = ReaderHandle {
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        };

        let acknowledger = Acknowledger::new(
            commands.clone(),
            Arc::from(options.stream.as_str()),
            Arc::from(options.group.as_str()),
            Handle::current(),
            handle.task_tracker.clone(),
        );

        Ok(Self {
            acknowledger,
            commands,
            consumer_id,
            handle,
            options,
            phase: Phase::CatchUp {
                after: StreamId::MIN,
            },
            ready: VecDeque::new(),
            reclaim: VecDeque::new(),
        })
    }

    /// The consumer id this reader reads as.
    #[must_use]
    pub const fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    /// The options the reader was started with.
    #[must_use]
    pub const fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// A handle for stopping the reader and settling acknowledgments.
    #[must_use]
    pub fn handle(&self) -> ReaderHandle {
        self.handle.clone()
    }

    /// Pulls the next delivery.
    ///
    /// Returns `Ok(None)` once the reader is stopped. Waits while the stream
    /// has nothing to deliver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if a stream command fails. The failed step
    /// is retried on the next call.
    pub async fn next(&mut self) -> ReaderResult<Option<Delivery<C>>, C> {
        loop {
            if self.phase != Phase::Done && self.handle.is_stopped() {
                self.finish();
            }

            if let Some((entry, origin)) = self.ready.pop_front() {
                return Ok(Some(Delivery::new(
                    entry,
                    self.consumer_id.clone(),
                    origin,
                    self.acknowledger.clone(),
                )));
            }

            match self.phase {
                Phase::CatchUp { after } => self.catch_up(after).await?,
                Phase::Live => {
                    if let Some(pending) = self.reclaim.front().cloned() {
                        self.claim(pending).await?;
                    } else {
                        self.scan_or_read().await?;
                    }
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    /// Turns the reader into a stream of deliveries.
    ///
    /// The stream ends when the reader is stopped, or right after yielding
    /// the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = ReaderResult<Delivery<C>, C>> + Send {
        async_stream::stream! {
            loop {
                match self.next().await {
                    Ok(Some(delivery)) => yield Ok(delivery),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    async fn catch_up(&mut self, after: StreamId) -> ReaderResult<(), C> {
        let batch = self.options.read_batch;
        let entries = self
            .commands
            .read_group(
                &self.options.stream,
                &self.options.group,
                &self.consumer_id,
                Cursor::After(after),
                batch,
                ReadWait::Immediate,
            )
            .await
            .map_err(|source| Error::Command {
                operation: "read_group",
                source,
            })?;

        match entries.last() {
            Some(last) if entries.len() >= batch => {
                self.phase = Phase::CatchUp { after: last.id };
            }
            _ => {
                debug!(
                    stream = %self.options.stream,
                    group = %self.options.group,
                    consumer = %self.consumer_id,
                    "caught up on pending entries; reading live"
                );
                self.phase = Phase::Live;
            }
        }

        self.ready.extend(
            entries
                .into_iter()
                .map(|entry| (entry, DeliveryOrigin::Recovered)),
        );

        Ok(())
    }

    async fn scan_or_read(&mut self) -> ReaderResult<(), C> {
        let idle_timeout = self.options.idle_timeout;
        let pending = self
            .commands
            .list_pending(
                &self.options.stream,
                &self.options.group,
                self.options.reclaim_batch,
            )
            .await
            .map_err(|source| Error::Command {
                operation: "list_pending",
                source,
            })?;

        let consumer_id = &self.consumer_id;
        self.reclaim.extend(
            pending
                .into_iter()
                .filter(|entry| entry.idle > idle_timeout && entry.consumer != *consumer_id),
        );

        if !self.reclaim.is_empty() {
            debug!(
                stream = %self.options.stream,
                group = %self.options.group,
                count = self.reclaim.len(),
                "found abandoned entries"
            );
            return Ok(());
        }

        let entries = self
            .commands
            .read_group(
                &self.options.stream,
                &self.options.group,
                &self.consumer_id,
                Cursor::Undelivered,
                self.options.read_batch,
                self.options.wait,
            )
            .await
            .map_err(|source| Error::Command {
                operation: "read_group",
                source,
            })?;

        if entries.is_empty() {
            debug!(
                stream = %self.options.stream,
                group = %self.options.group,
                "no new entries"
            );
        }

        self.ready
            .extend(entries.into_iter().map(|entry| (entry, DeliveryOrigin::New)));

        Ok(())
    }

    async fn claim(&mut self, pending: PendingEntry) -> ReaderResult<(), C> {
        let claimed = self
            .commands
            .claim(
                &self.options.stream,
                &self.options.group,
                &self.consumer_id,
                self.options.idle_timeout,
                pending.id,
            )
            .await
            .map_err(|source| Error::Command {
                operation: "claim",
                source,
            })?;

        self.reclaim.pop_front();

        match claimed {
            Some(entry) => {
                debug!(
                    stream = %self.options.stream,
                    group = %self.options.group,
                    id = %pending.id,
                    previous_owner = %pending.consumer,
                    "claimed abandoned entry"
                );
                self.ready.push_back((
                    entry,
                    DeliveryOrigin::Claimed {
                        previous_owner: pending.consumer,
                        idle: pending.idle,
                        delivery_count: pending.delivery_count,
                    },
                ));
            }
            None => debug!(
                stream = %self.options.stream,
                group = %self.options.group,
                id = %pending.id,
                "entry no longer claimable; skipping"
            ),
        }

        Ok(())
    }

    fn finish(&mut self) {
        info!(
            stream = %self.options.stream,
            group = %self.options.group,
            consumer = %self.consumer_id,
            unyielded = self.ready.len(),
            "consumer group reader stopped"
        );

        self.phase = Phase::Done;
        self.ready.clear();
        self.reclaim.clear();
    }
}
