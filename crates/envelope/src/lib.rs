//! Typed payloads carried in stream entry fields.
//!
//! Payloads are encoded as CBOR and optionally wrapped in base64 so they can
//! be stored by logs that expect text-safe values. An entry produced by
//! [`EnvelopeCodec::to_fields`] holds two fields: `type` with the payload's
//! type tag, and `body` with the encoded payload.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sluice_streams::Entry;

/// Name of the field holding the payload type tag.
pub const TYPE_FIELD: &str = "type";

/// Name of the field holding the encoded payload.
pub const BODY_FIELD: &str = "body";

/// A type that can travel in an envelope.
pub trait Payload: Serialize + DeserializeOwned {
    /// Stable tag identifying the type on the wire.
    const TYPE_TAG: &'static str;
}

/// How encoded payload bytes are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportEncoding {
    /// Raw CBOR bytes.
    #[default]
    Binary,

    /// CBOR bytes wrapped in standard base64.
    Base64,
}

/// Encodes and decodes typed payloads.
///
/// Both sides of a stream must agree on the transport encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvelopeCodec {
    transport: TransportEncoding,
}

impl EnvelopeCodec {
    /// Creates a codec with the given transport encoding.
    #[must_use]
    pub const fn new(transport: TransportEncoding) -> Self {
        Self { transport }
    }

    /// Returns the transport encoding.
    #[must_use]
    pub const fn transport(&self) -> TransportEncoding {
        self.transport
    }

    /// Encodes a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode<T: Payload>(&self, value: &T) -> Result<Bytes, Error> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(value, &mut writer)?;

        Ok(match self.transport {
            TransportEncoding::Binary => Bytes::from(writer),
            TransportEncoding::Base64 => Bytes::from(STANDARD.encode(writer)),
        })
    }

    /// Decodes a payload produced by [`Self::encode`] with the same transport
    /// encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of `T`.
    pub fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T, Error> {
        match self.transport {
            TransportEncoding::Binary => Ok(ciborium::de::from_reader(bytes)?),
            TransportEncoding::Base64 => {
                let raw = STANDARD.decode(bytes)?;
                Ok(ciborium::de::from_reader(raw.as_slice())?)
            }
        }
    }

    /// Encodes a payload into the `type`/`body` fields of a stream entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_fields<T: Payload>(&self, value: &T) -> Result<Vec<(Bytes, Bytes)>, Error> {
        Ok(vec![
            (
                Bytes::from_static(TYPE_FIELD.as_bytes()),
                Bytes::from_static(T::TYPE_TAG.as_bytes()),
            ),
            (Bytes::from_static(BODY_FIELD.as_bytes()), self.encode(value)?),
        ])
    }

    /// Returns the type tag carried by an entry, if any.
    #[must_use]
    pub fn type_tag(entry: &Entry) -> Option<&str> {
        entry
            .field(TYPE_FIELD)
            .and_then(|tag| std::str::from_utf8(tag).ok())
    }

    /// Decodes the payload of an entry, checking its type tag.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is missing, the tag does not match `T`, or
    /// the body cannot be decoded.
    pub fn decode_entry<T: Payload>(&self, entry: &Entry) -> Result<T, Error> {
        let tag = entry
            .field(TYPE_FIELD)
            .ok_or(Error::MissingField(TYPE_FIELD))?;

        if tag.as_ref() != T::TYPE_TAG.as_bytes() {
            return Err(Error::TypeMismatch {
                expected: T::TYPE_TAG,
                found: String::from_utf8_lossy(tag).into_owned(),
            });
        }

        let body = entry
            .field(BODY_FIELD)
            .ok_or(Error::MissingField(BODY_FIELD))?;

        self.decode(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use serde::Deserialize;
    use sluice_streams::StreamId;

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct OrderPlaced {
        order_id: u64,
        sku: String,
        quantity: u32,
        note: Option<String>,
    }

    impl Payload for OrderPlaced {
        const TYPE_TAG: &'static str = "order.placed";
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct OrderCancelled {
        order_id: u64,
    }

    impl Payload for OrderCancelled {
        const TYPE_TAG: &'static str = "order.cancelled";
    }

    fn order() -> OrderPlaced {
        OrderPlaced {
            order_id: 42,
            sku: "sku-7".to_string(),
            quantity: 3,
            note: Some("leave at door".to_string()),
        }
    }

    #[test]
    fn test_round_trip_under_both_transports() {
        for transport in [TransportEncoding::Binary, TransportEncoding::Base64] {
            let codec = EnvelopeCodec::new(transport);

            let encoded = codec.encode(&order()).unwrap();
            let decoded: OrderPlaced = codec.decode(&encoded).unwrap();

            assert_eq!(decoded, order(), "transport {transport:?}");
        }
    }

    #[test]
    fn test_base64_transport_is_text_safe() {
        let codec = EnvelopeCodec::new(TransportEncoding::Base64);

        let encoded = codec.encode(&order()).unwrap();

        assert!(std::str::from_utf8(&encoded).is_ok());
        assert!(encoded.iter().all(u8::is_ascii_graphic));
    }

    #[test]
    fn test_mismatched_transport_fails() {
        let binary = EnvelopeCodec::new(TransportEncoding::Binary);
        let base64 = EnvelopeCodec::new(TransportEncoding::Base64);

        let encoded = binary.encode(&order()).unwrap();

        assert_matches!(base64.decode::<OrderPlaced>(&encoded), Err(Error::Transport(_)));
    }

    #[test]
    fn test_entry_round_trip_checks_type_tag() {
        let codec = EnvelopeCodec::default();
        let entry = Entry::new(StreamId::new(1, 0), codec.to_fields(&order()).unwrap());

        assert_eq!(EnvelopeCodec::type_tag(&entry), Some("order.placed"));
        assert_eq!(codec.decode_entry::<OrderPlaced>(&entry).unwrap(), order());
        assert_matches!(
            codec.decode_entry::<OrderCancelled>(&entry),
            Err(Error::TypeMismatch { expected: "order.cancelled", .. })
        );
    }

    #[test]
    fn test_missing_body_is_reported() {
        let codec = EnvelopeCodec::default();
        let entry = Entry::new(
            StreamId::new(1, 0),
            vec![(Bytes::from_static(b"type"), Bytes::from_static(b"order.placed"))],
        );

        assert_matches!(
            codec.decode_entry::<OrderPlaced>(&entry),
            Err(Error::MissingField(BODY_FIELD))
        );
    }
}
