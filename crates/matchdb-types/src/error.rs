/// Errors from record encoding and decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record was decoded against the wrong type tag.
    #[error("type tag mismatch: expected {expected}, got {actual}")]
    WrongType { expected: String, actual: String },
}
