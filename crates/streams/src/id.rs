use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Identifier of an entry within a stream.
///
/// Ordered first by millisecond timestamp, then by sequence number. The
/// textual form is `<timestamp>-<sequence>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    /// Millisecond timestamp part.
    pub timestamp_ms: u64,

    /// Sequence number within the millisecond.
    pub sequence: u64,
}

impl StreamId {
    /// The smallest possible id (`0-0`).
    pub const MIN: Self = Self::new(0, 0);

    /// Creates a new stream id.
    #[must_use]
    pub const fn new(timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            timestamp_ms,
            sequence,
        }
    }

    /// Returns the id that immediately follows this one.
    #[must_use]
    pub const fn successor(self) -> Self {
        if self.sequence == u64::MAX {
            Self::new(self.timestamp_ms.saturating_add(1), 0)
        } else {
            Self::new(self.timestamp_ms, self.sequence + 1)
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_ms, self.sequence)
    }
}

impl FromStr for StreamId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidStreamId(s.to_string());

        match s.split_once('-') {
            Some((timestamp, sequence)) => Ok(Self::new(
                timestamp.parse().map_err(|_| invalid())?,
                sequence.parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::new(s.parse().map_err(|_| invalid())?, 0)),
        }
    }
}

/// A read or start position understood by the stream log.
///
/// These are the literal cursors of the protocol, not entry ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// `$`: only entries appended after now.
    #[default]
    Latest,

    /// `>`: only entries never delivered to the group.
    Undelivered,

    /// An explicit id; reads return entries strictly after it.
    After(StreamId),
}

impl Cursor {
    /// The cursor positioned before every entry (`0-0`).
    pub const BEGINNING: Self = Self::After(StreamId::MIN);
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("$"),
            Self::Undelivered => f.write_str(">"),
            Self::After(id) => id.fmt(f),
        }
    }
}

impl FromStr for Cursor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "$" => Ok(Self::Latest),
            ">" => Ok(Self::Undelivered),
            other => other
                .parse()
                .map(Self::After)
                .map_err(|_| ParseError::InvalidCursor(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_parse_full_and_short_ids() {
        assert_eq!(
            "1526919030474-55".parse::<StreamId>().unwrap(),
            StreamId::new(1_526_919_030_474, 55)
        );
        assert_eq!("7".parse::<StreamId>().unwrap(), StreamId::new(7, 0));
        assert_eq!("0".parse::<StreamId>().unwrap(), StreamId::MIN);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_matches!("abc".parse::<StreamId>(), Err(ParseError::InvalidStreamId(_)));
        assert_matches!("1-".parse::<StreamId>(), Err(ParseError::InvalidStreamId(_)));
        assert_matches!("-1".parse::<StreamId>(), Err(ParseError::InvalidStreamId(_)));
    }

    #[test]
    fn test_ordering_is_timestamp_then_sequence() {
        let mut ids = vec![
            StreamId::new(2, 0),
            StreamId::new(1, 10),
            StreamId::new(1, 2),
        ];
        ids.sort();

        assert_eq!(
            ids,
            vec![StreamId::new(1, 2), StreamId::new(1, 10), StreamId::new(2, 0)]
        );
    }

    #[test]
    fn test_successor_rolls_over_sequence() {
        assert_eq!(StreamId::new(1, 0).successor(), StreamId::new(1, 1));
        assert_eq!(StreamId::new(1, u64::MAX).successor(), StreamId::new(2, 0));
    }

    #[test]
    fn test_cursor_literals() {
        assert_eq!(Cursor::Latest.to_string(), "$");
        assert_eq!(Cursor::Undelivered.to_string(), ">");
        assert_eq!(Cursor::BEGINNING.to_string(), "0-0");

        assert_eq!("$".parse::<Cursor>().unwrap(), Cursor::Latest);
        assert_eq!(">".parse::<Cursor>().unwrap(), Cursor::Undelivered);
        assert_eq!("0".parse::<Cursor>().unwrap(), Cursor::BEGINNING);
        assert_matches!("<".parse::<Cursor>(), Err(ParseError::InvalidCursor(_)));
    }
}
