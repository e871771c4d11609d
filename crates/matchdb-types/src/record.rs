use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque category identifier for stored records.
///
/// Scans and counts address records by tag; the store and the backing engine
/// never interpret it beyond equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a tag from a type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A stored record: type tag + serialized payload + cached size.
///
/// `StoredRecord` is the explicit (identity, payload) pair handed between the
/// cache, the store, and the backing engine. Neither ever interprets the
/// payload bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The category of this record.
    pub tag: TypeTag,
    /// The serialized bytes of the record.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredRecord {
    /// Create a stored record from tag and payload bytes.
    pub fn new(tag: TypeTag, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { tag, data, size }
    }
}

/// Encode/decode boundary for serializable record types.
///
/// Implementors declare the tag their records are stored under and expose
/// the application-level string key the long key is derived from.
pub trait MatchRecord: Serialize + DeserializeOwned {
    /// Type tag name under which records of this type are stored.
    const TAG: &'static str;

    /// The application-level string key identifying this record.
    fn key(&self) -> &str;

    /// The tag for this record type.
    fn tag() -> TypeTag {
        TypeTag::new(Self::TAG)
    }

    /// Serialize into a [`StoredRecord`].
    fn encode(&self) -> Result<StoredRecord, TypeError> {
        let data =
            bincode::serialize(self).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(StoredRecord::new(TypeTag::new(Self::TAG), data))
    }

    /// Deserialize from a [`StoredRecord`], checking the tag.
    fn decode(record: &StoredRecord) -> Result<Self, TypeError> {
        if record.tag.as_str() != Self::TAG {
            return Err(TypeError::WrongType {
                expected: Self::TAG.to_string(),
                actual: record.tag.as_str().to_string(),
            });
        }
        bincode::deserialize(&record.data).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}
