//! Payload envelope - how a page of items is laid out in a response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FetchError, SyncItem};

/// Layout of a collection page in the response body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// The body is a bare JSON array of items.
    #[default]
    Array,
    /// The body is an object whose `field` holds the array of items.
    Envelope {
        /// Name of the field carrying the items
        field: String,
    },
}

impl PayloadShape {
    /// Shorthand for an enveloped payload.
    pub fn envelope(field: impl Into<String>) -> Self {
        PayloadShape::Envelope {
            field: field.into(),
        }
    }
}

/// Decode one page of items from a raw response body.
///
/// A body that is empty or whitespace is an empty page. Anything that does not
/// match `shape` is a [`FetchError::Decode`].
pub fn decode_page<T: SyncItem>(body: &[u8], shape: &PayloadShape) -> Result<Vec<T>, FetchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match shape {
        PayloadShape::Array => {
            serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))
        }
        PayloadShape::Envelope { field } => {
            let mut value: Value =
                serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
            let items = value
                .get_mut(field.as_str())
                .map(Value::take)
                .ok_or_else(|| FetchError::Decode(format!("missing field `{}`", field)))?;
            serde_json::from_value(items).map_err(|e| FetchError::Decode(e.to_string()))
        }
    }
}
