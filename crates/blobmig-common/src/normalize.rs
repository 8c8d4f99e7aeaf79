//! Recursive re-parsing of JSON embedded in strings
//!
//! Chart documents store whole sub-documents as JSON text inside string
//! fields, sometimes several levels deep. Normalization walks a parsed value
//! and replaces every string that parses as a JSON object or array with the
//! parsed (and itself normalized) value:
//!
//! ```
//! use blobmig_common::normalize::normalize;
//! use serde_json::json;
//!
//! let value = json!({"a": "[1,2,3]", "b": 5});
//! assert_eq!(normalize(&value).unwrap(), json!({"a": [1, 2, 3], "b": 5}));
//! ```
//!
//! Strings that merely start with `{` or `[` but do not parse are kept as
//! they are. The walk is pure, so it can be retried freely, and applying it
//! twice gives the same result as applying it once.

use crate::error::{BlobmigError, Result};
use serde_json::{Map, Value};

/// Default ceiling on nesting (containers plus re-parsed strings).
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Normalize with the default depth ceiling
pub fn normalize(value: &Value) -> Result<Value> {
    Normalizer::default().normalize(value)
}

/// Returns true when a string is a candidate for re-parsing
pub fn looks_like_json(s: &str) -> bool {
    s.starts_with('{') || s.starts_with('[')
}

/// JSON normalizer with a configurable depth ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    max_depth: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Normalizer {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return a normalized copy of `value`
    ///
    /// Fails with [`BlobmigError::NormalizationDepthExceeded`] when the value
    /// (counting each re-parsed string as one more level) nests deeper than
    /// the configured ceiling.
    pub fn normalize(&self, value: &Value) -> Result<Value> {
        self.walk(value, 0)
    }

    fn walk(&self, value: &Value, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(BlobmigError::NormalizationDepthExceeded {
                limit: self.max_depth,
            });
        }

        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.walk(child, depth + 1)?);
                }
                Ok(Value::Object(out))
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::String(s) if looks_like_json(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed) => self.walk(&parsed, depth + 1),
                Err(_) => Ok(value.clone()),
            },
            _ => Ok(value.clone()),
        }
    }
}
