//! Opaque action configuration payloads.
//!
//! The supervisor never interprets an action's `config` block; it captures the
//! node as-is and hands it to the action, which decodes it into its own typed
//! struct. The carrier is format-blind: it deserializes transparently under
//! both the JSON and YAML deserializers, so actions never learn which format
//! the outer file used.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(serde_yaml::Value);

impl Default for RawPayload {
    fn default() -> Self {
        RawPayload(serde_yaml::Value::Null)
    }
}

impl RawPayload {
    pub fn from_value(value: serde_yaml::Value) -> Self {
        RawPayload(value)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Decode the payload into the action's own configuration type.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_yaml::Error> {
        serde_yaml::from_value(self.0.clone())
    }
}
