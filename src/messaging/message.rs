//! # Notification Messages
//!
//! Inbound "item ready" notifications arrive as one JSON object per message in
//! one of two shapes:
//!
//! - `{"sha1": "<hash>", "img_info": {...}, ...}` names a single item and carries
//!   the auxiliary fields to persist with it
//! - `{"list_sha1s": ["<hash>", ...]}` names many items without auxiliary fields
//!
//! Anything else is reported as [`Notification::Unknown`] and skipped by the loop.

use serde_json::{Map, Value};
use tracing::warn;

use super::errors::{MessagingError, MessagingResult};
use crate::checker::types::{ItemKey, PendingInfoRecord};

pub const SINGLE_KEY_FIELD: &str = "sha1";
pub const MULTI_KEY_FIELD: &str = "list_sha1s";
/// Stored as its JSON text rather than field by field
pub const IMAGE_INFO_FIELD: &str = "img_info";

/// Undecoded message as read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// Stream-assigned id, when the backend has one
    pub message_id: Option<i64>,
    pub payload: String,
}

impl RawNotification {
    pub fn new(message_id: Option<i64>, payload: impl Into<String>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }
}

/// Decoded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Single {
        key: ItemKey,
        info: PendingInfoRecord,
    },
    Aggregate {
        keys: Vec<ItemKey>,
    },
    Unknown {
        fields: Vec<String>,
    },
}

impl Notification {
    pub fn parse(payload: &str) -> MessagingResult<Self> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> MessagingResult<Self> {
        let Value::Object(fields) = value else {
            return Ok(Self::Unknown { fields: Vec::new() });
        };

        if let Some(key) = fields.get(SINGLE_KEY_FIELD) {
            let key = ItemKey::new(cell_text(key));
            let info = Self::info_record(&fields);
            return Ok(Self::Single { key, info });
        }

        if let Some(keys) = fields.get(MULTI_KEY_FIELD) {
            let Value::Array(keys) = keys else {
                return Err(MessagingError::message_deserialization(format!(
                    "'{MULTI_KEY_FIELD}' must be an array of keys"
                )));
            };
            let keys = keys.iter().map(|key| ItemKey::new(cell_text(key))).collect();
            return Ok(Self::Aggregate { keys });
        }

        Ok(Self::Unknown {
            fields: fields.keys().cloned().collect(),
        })
    }

    /// Every field except the key itself, in persisted text form
    ///
    /// Fields that cannot name an `info:` qualifier are dropped.
    fn info_record(fields: &Map<String, Value>) -> PendingInfoRecord {
        fields
            .iter()
            .filter(|(name, _)| name.as_str() != SINGLE_KEY_FIELD)
            .filter(|(name, _)| {
                let usable = is_storable_field(name);
                if !usable {
                    warn!(field = %name, "Dropping notification field with unusable name");
                }
                usable
            })
            .map(|(name, value)| {
                let text = if name == IMAGE_INFO_FIELD {
                    value.to_string()
                } else {
                    cell_text(value)
                };
                (name.clone(), text)
            })
            .collect()
    }
}

/// Field names become column qualifiers, so they must be non-empty and colon-free
fn is_storable_field(name: &str) -> bool {
    !name.is_empty() && !name.contains(':')
}

/// Strings are stored verbatim, anything else as JSON text
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
