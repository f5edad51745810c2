//! JSON text framing for the `{action, data}` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// The only wire unit in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Action name; selects the handlers on the receiving side.
    pub action: String,
    /// Action-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from parts.
    pub fn new(action: &str, data: Value) -> Self {
        Self {
            action: action.to_string(),
            data,
        }
    }

    /// Encode to a JSON text frame.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the text is not JSON or lacks an
    /// `action` string.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
