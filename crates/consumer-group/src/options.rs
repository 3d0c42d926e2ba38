use std::time::Duration;

use sluice_streams::{ConsumerId, Cursor, ReadWait};

use crate::constants::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_READ_BATCH, DEFAULT_READ_WAIT, DEFAULT_RECLAIM_BATCH,
    MAX_BATCH_SIZE,
};
use crate::error::InvalidOptions;

/// Options for a [`crate::GroupReader`].
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    /// The stream to read.
    pub stream: String,

    /// The consumer group to read as.
    pub group: String,

    /// The consumer id. Generated once per reader if not set.
    pub consumer_id: Option<ConsumerId>,

    /// Where a newly created group starts. Ignored if the group exists.
    pub start: Cursor,

    /// How long an entry must sit idle before it is reclaimed from its owner.
    ///
    /// Only entries owned by other consumers are reclaimed. An entry this
    /// reader yielded stays with it however long processing takes.
    pub idle_timeout: Duration,

    /// How many pending entries each reclaim scan inspects.
    pub reclaim_batch: usize,

    /// How many entries each read fetches.
    pub read_batch: usize,

    /// How long a live read waits for new entries.
    pub wait: ReadWait,
}

impl ReaderOptions {
    /// Creates options for reading `stream` as `group` with default settings.
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer_id: None,
            start: Cursor::Latest,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reclaim_batch: DEFAULT_RECLAIM_BATCH,
            read_batch: DEFAULT_READ_BATCH,
            wait: ReadWait::Timeout(DEFAULT_READ_WAIT),
        }
    }

    /// Sets the consumer id.
    #[must_use]
    pub fn with_consumer_id(mut self, consumer_id: impl Into<ConsumerId>) -> Self {
        self.consumer_id = Some(consumer_id.into());
        self
    }

    /// Sets the start cursor for a newly created group.
    #[must_use]
    pub const fn with_start(mut self, start: Cursor) -> Self {
        self.start = start;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the reclaim scan size.
    #[must_use]
    pub const fn with_reclaim_batch(mut self, reclaim_batch: usize) -> Self {
        self.reclaim_batch = reclaim_batch;
        self
    }

    /// Sets the read batch size.
    #[must_use]
    pub const fn with_read_batch(mut self, read_batch: usize) -> Self {
        self.read_batch = read_batch;
        self
    }

    /// Sets the live read wait.
    #[must_use]
    pub const fn with_wait(mut self, wait: ReadWait) -> Self {
        self.wait = wait;
        self
    }

    /// Checks the options for values the reader cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid option.
    pub fn validate(&self) -> Result<(), InvalidOptions> {
        if self.stream.is_empty() {
            return Err(InvalidOptions("stream name is empty".to_string()));
        }

        if self.group.is_empty() {
            return Err(InvalidOptions("group name is empty".to_string()));
        }

        if self
            .consumer_id
            .as_ref()
            .is_some_and(|id| id.as_str().is_empty())
        {
            return Err(InvalidOptions("consumer id is empty".to_string()));
        }

        if self.start == Cursor::Undelivered {
            return Err(InvalidOptions(format!(
                "'{}' is not a valid start cursor",
                Cursor::Undelivered
            )));
        }

        if self.idle_timeout.is_zero() {
            return Err(InvalidOptions("idle timeout must be positive".to_string()));
        }

        for (name, value) in [
            ("reclaim batch", self.reclaim_batch),
            ("read batch", self.read_batch),
        ] {
            if value == 0 || value > MAX_BATCH_SIZE {
                return Err(InvalidOptions(format!(
                    "{name} must be between 1 and {MAX_BATCH_SIZE}, got {value}"
                )));
            }
        }

        match self.wait {
            ReadWait::Immediate => Err(InvalidOptions(
                "live reads must wait for new entries".to_string(),
            )),
            ReadWait::Timeout(wait) if wait.is_zero() => {
                Err(InvalidOptions("read wait must be positive".to_string()))
            }
            ReadWait::Timeout(_) | ReadWait::Indefinite => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use sluice_streams::StreamId;

    #[test]
    fn test_defaults_are_valid() {
        let options = ReaderOptions::new("orders", "workers");

        assert_eq!(options.start, Cursor::Latest);
        assert_eq!(options.idle_timeout, Duration::from_secs(30));
        assert_eq!(options.reclaim_batch, 10);
        assert_eq!(options.read_batch, 1);
        assert_eq!(options.wait, ReadWait::Timeout(Duration::from_secs(5)));
        assert!(options.consumer_id.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_fields() {
        let options = ReaderOptions::new("orders", "workers")
            .with_consumer_id("worker-1")
            .with_start(Cursor::After(StreamId::MIN))
            .with_idle_timeout(Duration::from_millis(5_000))
            .with_reclaim_batch(50)
            .with_read_batch(20)
            .with_wait(ReadWait::Indefinite);

        assert_eq!(options.consumer_id, Some(ConsumerId::new("worker-1")));
        assert_eq!(options.start, Cursor::BEGINNING);
        assert_eq!(options.idle_timeout, Duration::from_millis(5_000));
        assert_eq!(options.reclaim_batch, 50);
        assert_eq!(options.read_batch, 20);
        assert_eq!(options.wait, ReadWait::Indefinite);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_rejects_invalid_options() {
        let base = || ReaderOptions::new("orders", "workers");

        assert_matches!(ReaderOptions::new("", "workers").validate(), Err(_));
        assert_matches!(ReaderOptions::new("orders", "").validate(), Err(_));
        assert_matches!(base().with_consumer_id("").validate(), Err(_));
        assert_matches!(base().with_start(Cursor::Undelivered).validate(), Err(_));
        assert_matches!(base().with_idle_timeout(Duration::ZERO).validate(), Err(_));
        assert_matches!(base().with_reclaim_batch(0).validate(), Err(_));
        assert_matches!(base().with_read_batch(0).validate(), Err(_));
        assert_matches!(
            base().with_read_batch(MAX_BATCH_SIZE + 1).validate(),
            Err(_)
        );
        assert_matches!(base().with_wait(ReadWait::Immediate).validate(), Err(_));
        assert_matches!(
            base().with_wait(ReadWait::Timeout(Duration::ZERO)).validate(),
            Err(_)
        );
    }
}
