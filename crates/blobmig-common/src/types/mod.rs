//! Common types used across blobmig

use serde::{Deserialize, Serialize};

/// Column type of a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Integer,
    Text,
}

impl KeyType {
    /// The lowest cursor for this key type; every stored id sorts after it.
    ///
    /// Integer tables use positive ids and text tables use non-empty ids, so
    /// `0` and `""` act as "nothing committed yet".
    pub fn origin(self) -> RecordId {
        match self {
            KeyType::Integer => RecordId::Int(0),
            KeyType::Text => RecordId::Text(String::new()),
        }
    }

    /// Parse a user-supplied id (e.g. from the command line) for this key type
    pub fn parse_id(self, raw: &str) -> crate::Result<RecordId> {
        match self {
            KeyType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(RecordId::Int)
                .map_err(|e| crate::BlobmigError::Config(format!("Invalid integer id '{}': {}", raw, e))),
            KeyType::Text => Ok(RecordId::Text(raw.to_string())),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Integer => write!(f, "integer"),
            KeyType::Text => write!(f, "text"),
        }
    }
}

/// Primary key of a stored record.
///
/// Serializes as a bare JSON number or string, which keeps the progress file
/// readable (`{"tv_drawings": 6, "tv_study_templates": "a9f1"}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    pub fn key_type(&self) -> KeyType {
        match self {
            RecordId::Int(_) => KeyType::Integer,
            RecordId::Text(_) => KeyType::Text,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordId::Int(v) => Some(*v),
            RecordId::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RecordId::Int(_) => None,
            RecordId::Text(v) => Some(v),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(v) => write!(f, "{}", v),
            RecordId::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId::Int(v)
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId::Text(v.to_string())
    }
}

impl From<String> for RecordId {
    fn from(v: String) -> Self {
        RecordId::Text(v)
    }
}

/// A stored row: identifier, owning user and the compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Primary key, unique within its table
    pub id: RecordId,

    /// Owning user (`user_id` in the stores)
    pub owner_id: i64,

    /// Compressed JSON document; `None` when the column is NULL
    pub content: Option<Vec<u8>>,

    /// Normalized JSON text, present once a record has been augmented
    pub parsed_content: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, owner_id: i64, content: Option<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            owner_id,
            content,
            parsed_content: None,
        }
    }
}
