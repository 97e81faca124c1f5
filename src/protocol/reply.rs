//! Decoded reply records from the evaluation service.
//!
//! A reply is whatever JSON the service sends back for a submission. The
//! field set is not validated here: accessors return defaults for missing
//! or mistyped fields, mirroring how the collaborating presentation layer
//! consumes the record.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// EvalReply
// ============================================================================

/// A decoded reply from the evaluation service.
///
/// # Format
///
/// Typically a record such as:
///
/// ```json
/// {
///   "result": "2",
///   "status": "success"
/// }
/// ```
///
/// but any well-formed JSON value is accepted; the schema belongs to the
/// service, not to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvalReply(Value);

impl EvalReply {
    /// Decodes a reply from an inbound message body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) if the body is not
    /// well-formed JSON.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(text)?))
    }

    /// Returns the underlying JSON value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consumes the reply, returning the underlying JSON value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Gets a field of the record, if present.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Gets a string field.
    ///
    /// Returns empty string if the field is missing or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 field.
    ///
    /// Returns 0 if the field is missing or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.0.get(key).and_then(|v| v.as_u64()).unwrap_or_default()
    }

    /// Gets a boolean field.
    ///
    /// Returns false if the field is missing or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.0
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

impl From<Value> for EvalReply {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for EvalReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ============================================================================
// Tests
// ============================================================================
