//! CLI binary to drain a Redis stream through a consumer group.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::{Parser, Subcommand};
use sluice_consumer_group::{Error as ReaderError, GroupReader, ReaderOptions, StreamTail};
use sluice_streams::{Cursor, Entry, ParseError, ReadWait, StreamCommands};
use sluice_streams_redis::{RedisStreams, RedisStreamsConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid command-line value
    #[error(transparent)]
    Argument(#[from] ParseError),

    /// Consumer group reader error
    #[error(transparent)]
    Reader(#[from] ReaderError<sluice_streams_redis::Error>),

    /// Redis client error
    #[error(transparent)]
    Redis(#[from] sluice_streams_redis::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Redis connection URL
    #[arg(
        long,
        default_value = "redis://127.0.0.1:6379",
        env = "SLUICE_REDIS_URL"
    )]
    redis_url: String,

    /// Timeout for individual Redis commands in milliseconds
    #[arg(
        long,
        default_value_t = 10_000,
        env = "SLUICE_OPERATION_TIMEOUT_MS"
    )]
    operation_timeout_ms: u64,

    /// Stream to read
    #[arg(long, env = "SLUICE_STREAM")]
    stream: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Read as a member of a consumer group, acknowledging every entry
    Consume {
        /// Consumer group name
        #[arg(long, env = "SLUICE_GROUP")]
        group: String,

        /// Consumer id (generated if not set)
        #[arg(long, env = "SLUICE_CONSUMER")]
        consumer: Option<String>,

        /// Where a newly created group starts: `$` for new entries only, `0` for
        /// the whole stream, or an explicit id
        #[arg(long, default_value = "$", env = "SLUICE_START")]
        start: String,

        /// Idle time in milliseconds after which another consumer's entry is
        /// reclaimed
        #[arg(long, default_value_t = 30_000, env = "SLUICE_IDLE_TIMEOUT_MS")]
        idle_timeout_ms: u64,

        /// Pending entries inspected per reclaim scan
        #[arg(long, default_value_t = 10, env = "SLUICE_RECLAIM_BATCH")]
        reclaim_batch: usize,

        /// Entries fetched per read
        #[arg(long, default_value_t = 1, env = "SLUICE_READ_BATCH")]
        read_batch: usize,

        /// How long each read blocks waiting for new entries, in milliseconds
        #[arg(long, default_value_t = 5_000, env = "SLUICE_BLOCK_MS")]
        block_ms: u64,
    },

    /// Follow the stream without a consumer group
    Tail {
        /// Cursor to start after: `$` for new entries only, `0` for the whole
        /// stream, or an explicit id
        #[arg(long, default_value = "$", env = "SLUICE_START")]
        start: String,

        /// How long each read blocks waiting for new entries, in milliseconds
        #[arg(long, default_value_t = 5_000, env = "SLUICE_BLOCK_MS")]
        block_ms: u64,
    },
}

fn describe(entry: &Entry) -> String {
    entry
        .fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_signal_handler(shutdown_token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt signal"),
            Err(e) => warn!(error = %e, "failed to listen for interrupt signal"),
        }

        info!("Shutting down");
        shutdown_token.cancel();
    });
}

async fn consume<C>(
    commands: C,
    options: ReaderOptions,
    shutdown_token: CancellationToken,
) -> Result<u64, ReaderError<C::Error>>
where
    C: StreamCommands,
{
    let mut reader = GroupReader::start(commands, options).await?;
    let handle = reader.handle();

    let stop_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_token.cancelled().await;
        stop_handle.stop();
    });

    let mut processed = 0_u64;
    let drained = drain(&mut reader, &mut processed).await;

    // Acknowledgments already spawned finish even when the reader failed.
    handle.settle().await;
    info!(processed, "consumer stopped");

    drained.map(|()| processed)
}

async fn drain<C>(
    reader: &mut GroupReader<C>,
    processed: &mut u64,
) -> Result<(), ReaderError<C::Error>>
where
    C: StreamCommands,
{
    while let Some(mut delivery) = reader.next().await? {
        let info = delivery.info();
        info!(
            id = %info.id,
            origin = ?info.origin,
            deliveries = ?info.delivery_count(),
            fields = %describe(delivery.entry()),
            "received entry"
        );

        delivery.complete()?;
        *processed += 1;
    }

    Ok(())
}

async fn tail(
    streams: RedisStreams,
    stream: String,
    start: Cursor,
    wait: ReadWait,
    shutdown_token: CancellationToken,
) -> Result<(), Error> {
    let mut tail = StreamTail::new(streams, stream).starting_at(start).with_wait(wait);

    while !shutdown_token.is_cancelled() {
        if let Some(entry) = tail.next().await? {
            info!(id = %entry.id, fields = %describe(&entry), "received entry");
        }
    }

    info!(position = %tail.position(), "tail stopped");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let streams = RedisStreams::connect(RedisStreamsConfig {
        url: args.redis_url,
        operation_timeout: Some(Duration::from_millis(args.operation_timeout_ms)),
    })
    .await?;

    let shutdown_token = CancellationToken::new();
    spawn_signal_handler(shutdown_token.clone());

    match args.command {
        Command::Consume {
            group,
            consumer,
            start,
            idle_timeout_ms,
            reclaim_batch,
            read_batch,
            block_ms,
        } => {
            let mut options = ReaderOptions::new(args.stream, group)
                .with_start(start.parse()?)
                .with_idle_timeout(Duration::from_millis(idle_timeout_ms))
                .with_reclaim_batch(reclaim_batch)
                .with_read_batch(read_batch)
                .with_wait(ReadWait::Timeout(Duration::from_millis(block_ms)));

            if let Some(consumer) = consumer {
                options = options.with_consumer_id(consumer);
            }

            consume(streams, options, shutdown_token).await?;
            Ok(())
        }
        Command::Tail { start, block_ms } => {
            let wait = ReadWait::Timeout(Duration::from_millis(block_ms));
            tail(streams, args.stream, start.parse()?, wait, shutdown_token).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use sluice_streams::{ConsumerId, GroupCreation, PendingEntry, StreamId};
    use sluice_streams_memory::{MemoryStreamLog, Operation};

    /// Memory log whose second reclaim scan fails.
    #[derive(Clone, Debug, Default)]
    struct FlakyLog {
        inner: MemoryStreamLog,
        scans: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StreamCommands for FlakyLog {
        type Error = sluice_streams_memory::Error;

        async fn ensure_group(
            &self,
            stream: &str,
            group: &str,
            start: Cursor,
            suppress_exists: bool,
        ) -> Result<GroupCreation, Self::Error> {
            self.inner
                .ensure_group(stream, group, start, suppress_exists)
                .await
        }

        async fn read_new(
            &self,
            stream: &str,
            from: Cursor,
            wait: ReadWait,
        ) -> Result<Option<Entry>, Self::Error> {
            self.inner.read_new(stream, from, wait).await
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
            self.inner
                .read_group(stream, group, consumer, cursor, count, wait)
                .await
        }

        async fn list_pending(
            &self,
            stream: &str,
            group: &str,
            count: usize,
        ) -> Result<Vec<PendingEntry>, Self::Error> {
            if self.scans.fetch_add(1, Ordering::SeqCst) == 1 {
                self.inner.inject_failure(Operation::ListPending).await;
            }

            self.inner.list_pending(stream, group, count).await
        }

        async fn claim(
            &self,
            stream: &str,
            group: &str,
            consumer: &ConsumerId,
            min_idle: Duration,
            id: StreamId,
        ) -> Result<Option<Entry>, Self::Error> {
            self.inner
                .claim(stream, group, consumer, min_idle, id)
                .await
        }

        async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<u64, Self::Error> {
            self.inner.ack(stream, group, id).await
        }
    }

    #[test]
    fn test_parses_consume_arguments() {
        let args = Args::try_parse_from([
            "sluice",
            "--stream",
            "orders",
            "consume",
            "--group",
            "workers",
            "--start",
            "0",
            "--idle-timeout-ms",
            "5000",
        ])
        .unwrap();

        assert_eq!(args.stream, "orders");
        assert_matches!(
            args.command,
            Command::Consume {
                group,
                consumer: None,
                start,
                idle_timeout_ms: 5_000,
                read_batch: 1,
                ..
            } => {
                assert_eq!(group, "workers");
                assert_eq!(start.parse::<Cursor>().unwrap(), Cursor::BEGINNING);
            }
        );
    }

    #[tokio::test]
    async fn test_consume_settles_acknowledgments_before_failing() {
        let log = FlakyLog::default();
        let options = ReaderOptions::new("orders", "workers")
            .with_consumer_id("a")
            .with_start(Cursor::BEGINNING);
        log.inner.append("orders", [("order", "1")]).await;

        let result = consume(log.clone(), options, CancellationToken::new()).await;

        assert_matches!(result, Err(ReaderError::Command { operation: "list_pending", .. }));
        assert_eq!(log.inner.pending_count("orders", "workers").await, 0);
    }

    #[test]
    fn test_describes_entry_fields() {
        let entry = Entry::new(
            StreamId::new(1, 0),
            vec![("sku".into(), "a".into()), ("qty".into(), "2".into())],
        );

        assert_eq!(describe(&entry), "sku=a qty=2");
    }
}
