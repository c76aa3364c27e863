//! Response-shape normalization at the ingestion boundary.
//!
//! The provider answers list endpoints either with a bare JSON array or with an
//! envelope object carrying a `results` array. Anything else is unrecognized.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Classified provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// A bare array of records.
    Records(Vec<Value>),
    /// An object whose `results` member is an array of records.
    Envelope(Vec<Value>),
    /// Neither shape.
    Unrecognized,
}

impl ResponseShape {
    pub fn classify(payload: Value) -> Self {
        match payload {
            Value::Array(items) => ResponseShape::Records(items),
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => ResponseShape::Envelope(items),
                _ => ResponseShape::Unrecognized,
            },
            _ => ResponseShape::Unrecognized,
        }
    }

    /// Flat record list, or `None` for an unrecognized payload.
    pub fn into_records(self) -> Option<Vec<Value>> {
        match self {
            ResponseShape::Records(items) | ResponseShape::Envelope(items) => Some(items),
            ResponseShape::Unrecognized => None,
        }
    }
}

/// Classify and flatten in one step.
pub fn normalize(payload: Value) -> Option<Vec<Value>> {
    ResponseShape::classify(payload).into_records()
}

/// Accept a string or a number where the provider is inconsistent about types.
/// Anything else (null, bool, object, array) reads as absent.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
