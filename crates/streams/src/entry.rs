use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use crate::id::StreamId;

/// An immutable record read from a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// The entry id.
    pub id: StreamId,

    /// Ordered field/value pairs.
    pub fields: Vec<(Bytes, Bytes)>,
}

impl Entry {
    /// Creates a new entry.
    #[must_use]
    pub const fn new(id: StreamId, fields: Vec<(Bytes, Bytes)>) -> Self {
        Self { id, fields }
    }

    /// Returns the value of the first field with the given name.
    #[must_use]
    pub fn field(&self, name: impl AsRef<[u8]>) -> Option<&Bytes> {
        let name = name.as_ref();

        self.fields
            .iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value)
    }
}

/// Name of a consumer within a consumer group.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Creates a consumer id from a caller-supplied name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a fresh, random consumer id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("consumer-{}", Uuid::new_v4().simple()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ConsumerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A delivered-but-unacknowledged entry in a group's pending entries list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEntry {
    /// The pending entry id.
    pub id: StreamId,

    /// The consumer currently owning the entry.
    pub consumer: ConsumerId,

    /// Time since the entry was last delivered or claimed.
    pub idle: Duration,

    /// Number of times the entry has been delivered or claimed.
    pub delivery_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_returns_first_match() {
        let entry = Entry::new(
            StreamId::new(1, 0),
            vec![
                (Bytes::from_static(b"type"), Bytes::from_static(b"order")),
                (Bytes::from_static(b"body"), Bytes::from_static(b"one")),
                (Bytes::from_static(b"body"), Bytes::from_static(b"two")),
            ],
        );

        assert_eq!(entry.field("body"), Some(&Bytes::from_static(b"one")));
        assert_eq!(entry.field(b"type"), Some(&Bytes::from_static(b"order")));
        assert_eq!(entry.field("missing"), None);
    }

    #[test]
    fn test_generated_consumer_ids_are_unique() {
        let first = ConsumerId::generate();
        let second = ConsumerId::generate();

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("consumer-"));
    }
}
