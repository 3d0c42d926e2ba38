use thiserror::Error;

/// Errors that can occur encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum Error {
    /// CBOR deserialization error.
    #[error(transparent)]
    Deserialize(#[from] ciborium::de::Error<std::io::Error>),

    /// A required field is missing from the entry.
    #[error("entry has no '{0}' field")]
    MissingField(&'static str),

    /// CBOR serialization error.
    #[error(transparent)]
    Serialize(#[from] ciborium::ser::Error<std::io::Error>),

    /// The text-safe transport encoding could not be reversed.
    #[error("failed to decode transport encoding: {0}")]
    Transport(#[from] base64::DecodeError),

    /// The entry carries a different payload type.
    #[error("expected payload type '{expected}', found '{found}'")]
    TypeMismatch {
        /// The tag of the requested type.
        expected: &'static str,
        /// The tag found on the entry.
        found: String,
    },
}
