//! Decoding of stream command replies in both RESP2 and RESP3 shapes.

use std::time::Duration;

use bytes::Bytes;
use redis::Value;
use sluice_streams::{ConsumerId, Entry, PendingEntry, StreamId};

use crate::error::Error;

/// Decodes an `XREAD`/`XREADGROUP` reply into the entries of all streams.
///
/// A timed-out blocking read replies with nil.
pub fn stream_entries(command: &'static str, value: Value) -> Result<Vec<Entry>, Error> {
    let per_stream = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(streams) => streams
            .into_iter()
            .map(|stream| match stream {
                Value::Array(pair) if pair.len() == 2 => pair
                    .into_iter()
                    .nth(1)
                    .ok_or_else(|| Error::malformed(command, "stream without entries")),
                other => Err(Error::malformed(
                    command,
                    format!("expected [name, entries], got {other:?}"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Map(streams) => streams.into_iter().map(|(_, entries)| entries).collect(),
        other => {
            return Err(Error::malformed(
                command,
                format!("expected streams, got {other:?}"),
            ));
        }
    };

    let mut entries = Vec::new();
    for value in per_stream {
        entries.extend(entry_list(command, value)?.into_iter().flatten());
    }

    Ok(entries)
}

/// Decodes a list of entries. Entries deleted from the stream may be nil.
pub fn entry_list(command: &'static str, value: Value) -> Result<Vec<Option<Entry>>, Error> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(|item| entry(command, item)).collect(),
        other => Err(Error::malformed(
            command,
            format!("expected entries, got {other:?}"),
        )),
    }
}

fn entry(command: &'static str, value: Value) -> Result<Option<Entry>, Error> {
    let mut parts = match value {
        Value::Nil => return Ok(None),
        Value::Array(parts) if parts.len() == 2 => parts.into_iter(),
        other => {
            return Err(Error::malformed(
                command,
                format!("expected [id, fields], got {other:?}"),
            ));
        }
    };

    let id = parts
        .next()
        .ok_or_else(|| Error::malformed(command, "entry without id"))
        .and_then(|id| stream_id(command, &id))?;

    // Pending entries trimmed from the stream come back with nil fields.
    let fields = match parts.next() {
        None | Some(Value::Nil) => Vec::new(),
        Some(Value::Array(flat)) => {
            if flat.len() % 2 != 0 {
                return Err(Error::malformed(command, "odd number of field values"));
            }
            let mut fields = Vec::with_capacity(flat.len() / 2);
            let mut flat = flat.into_iter();
            while let (Some(name), Some(value)) = (flat.next(), flat.next()) {
                fields.push((bytes(command, name)?, bytes(command, value)?));
            }
            fields
        }
        Some(Value::Map(pairs)) => pairs
            .into_iter()
            .map(|(name, value)| Ok((bytes(command, name)?, bytes(command, value)?)))
            .collect::<Result<_, Error>>()?,
        Some(other) => {
            return Err(Error::malformed(
                command,
                format!("expected fields, got {other:?}"),
            ));
        }
    };

    Ok(Some(Entry::new(id, fields)))
}

/// Decodes an extended `XPENDING` reply.
pub fn pending_entries(command: &'static str, value: Value) -> Result<Vec<PendingEntry>, Error> {
    let Value::Array(items) = value else {
        return Err(Error::malformed(
            command,
            format!("expected pending entries, got {value:?}"),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Array(parts) if parts.len() == 4 => Ok(PendingEntry {
                id: stream_id(command, &parts[0])?,
                consumer: ConsumerId::new(text(command, &parts[1])?),
                idle: Duration::from_millis(integer(command, &parts[2])?),
                delivery_count: integer(command, &parts[3])?,
            }),
            other => Err(Error::malformed(
                command,
                format!("expected [id, consumer, idle, deliveries], got {other:?}"),
            )),
        })
        .collect()
}

/// Decodes an integer reply.
pub fn integer(command: &'static str, value: &Value) -> Result<u64, Error> {
    match value {
        Value::Int(n) => u64::try_from(*n)
            .map_err(|_| Error::malformed(command, format!("negative integer {n}"))),
        other => Err(Error::malformed(
            command,
            format!("expected integer, got {other:?}"),
        )),
    }
}

/// Whether a reply is the simple `OK` status.
pub fn is_ok(value: &Value) -> bool {
    match value {
        Value::Okay => true,
        Value::SimpleString(status) => status == "OK",
        _ => false,
    }
}

fn text(command: &'static str, value: &Value) -> Result<String, Error> {
    match value {
        Value::BulkString(raw) => String::from_utf8(raw.clone())
            .map_err(|_| Error::malformed(command, "text is not valid UTF-8")),
        Value::SimpleString(text) => Ok(text.clone()),
        Value::VerbatimString { text, .. } => Ok(text.clone()),
        other => Err(Error::malformed(
            command,
            format!("expected text, got {other:?}"),
        )),
    }
}

fn stream_id(command: &'static str, value: &Value) -> Result<StreamId, Error> {
    let raw = text(command, value)?;
    raw.parse()
        .map_err(|_| Error::malformed(command, format!("invalid stream id '{raw}'")))
}

fn bytes(command: &'static str, value: Value) -> Result<Bytes, Error> {
    match value {
        Value::BulkString(raw) => Ok(Bytes::from(raw)),
        Value::SimpleString(text) | Value::VerbatimString { text, .. } => Ok(Bytes::from(text)),
        Value::Int(n) => Ok(Bytes::from(n.to_string())),
        other => Err(Error::malformed(
            command,
            format!("expected bytes, got {other:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    fn bulk(text: &str) -> Value {
        Value::BulkString(text.as_bytes().to_vec())
    }

    fn raw_entry(id: &str, fields: &[&str]) -> Value {
        Value::Array(vec![
            bulk(id),
            Value::Array(fields.iter().map(|field| bulk(field)).collect()),
        ])
    }

    #[test]
    fn test_parses_resp2_read_reply() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("orders"),
            Value::Array(vec![
                raw_entry("1-0", &["sku", "a", "qty", "2"]),
                raw_entry("1-1", &["sku", "b"]),
            ]),
        ])]);

        let entries = stream_entries("XREADGROUP", reply).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, StreamId::new(1, 0));
        assert_eq!(entries[0].field("qty"), Some(&Bytes::from("2")));
        assert_eq!(entries[1].id, StreamId::new(1, 1));
        assert_eq!(entries[1].fields.len(), 1);
    }

    #[test]
    fn test_parses_resp3_read_reply() {
        let reply = Value::Map(vec![(
            bulk("orders"),
            Value::Array(vec![raw_entry("5-3", &["sku", "c"])]),
        )]);

        let entries = stream_entries("XREAD", reply).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, StreamId::new(5, 3));
        assert_eq!(entries[0].field("sku"), Some(&Bytes::from("c")));
    }

    #[test]
    fn test_timed_out_read_is_empty() {
        assert!(stream_entries("XREAD", Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_trimmed_pending_entry_has_no_fields() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("orders"),
            Value::Array(vec![Value::Array(vec![bulk("7-0"), Value::Nil])]),
        ])]);

        let entries = stream_entries("XREADGROUP", reply).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, StreamId::new(7, 0));
        assert!(entries[0].fields.is_empty());
    }

    #[test]
    fn test_claim_reply_skips_deleted_entries() {
        let reply = Value::Array(vec![Value::Nil, raw_entry("2-0", &["sku", "d"])]);

        let entries = entry_list("XCLAIM", reply).unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_none());
        assert_eq!(entries[1].as_ref().map(|entry| entry.id), Some(StreamId::new(2, 0)));
    }

    #[test]
    fn test_parses_pending_reply() {
        let reply = Value::Array(vec![
            Value::Array(vec![bulk("1-0"), bulk("a"), Value::Int(5_001), Value::Int(1)]),
            Value::Array(vec![bulk("1-1"), bulk("b"), Value::Int(12), Value::Int(3)]),
        ]);

        let pending = pending_entries("XPENDING", reply).unwrap();

        assert_eq!(
            pending[0],
            PendingEntry {
                id: StreamId::new(1, 0),
                consumer: ConsumerId::new("a"),
                idle: Duration::from_millis(5_001),
                delivery_count: 1,
            }
        );
        assert_eq!(pending[1].consumer, ConsumerId::new("b"));
        assert_eq!(pending[1].delivery_count, 3);
    }

    #[test]
    fn test_rejects_malformed_replies() {
        assert_matches!(
            stream_entries("XREAD", Value::Int(1)),
            Err(Error::MalformedReply { command: "XREAD", .. })
        );
        assert_matches!(
            entry_list("XCLAIM", Value::Array(vec![raw_entry("not-an-id", &[])])),
            Err(Error::MalformedReply { .. })
        );
        assert_matches!(
            entry_list("XCLAIM", Value::Array(vec![raw_entry("1-0", &["lonely"])])),
            Err(Error::MalformedReply { .. })
        );
        assert_matches!(
            pending_entries("XPENDING", Value::Array(vec![Value::Array(vec![bulk("1-0")])])),
            Err(Error::MalformedReply { .. })
        );
        assert_matches!(integer("XACK", &Value::Int(-1)), Err(Error::MalformedReply { .. }));
    }

    #[test]
    fn test_recognizes_ok_status() {
        assert!(is_ok(&Value::Okay));
        assert!(is_ok(&Value::SimpleString("OK".to_string())));
        assert!(!is_ok(&Value::Nil));
    }
}
