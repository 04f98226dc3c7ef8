//! Bus event types
//!
//! A [`BusEvent`] is the unit delivered by the cross-context bus. Its JSON
//! shape is the wire format shared by every context:
//!
//! ```text
//! {"type":"permissions-updated","data":{"userId":"u1"},"timestamp":1700000000000,"id":"permissions-updated-1700000000000-k3j9x0q2a"}
//! ```

use crate::constants::{EVENT_ID_SUFFIX_LEN, SUBJECT_ID_FIELDS};
use crate::error::BusError;
use crate::{now_millis, EpochMillis};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// EVENT TYPE
// ============================================================================

/// Event type discriminator.
///
/// The named variants are the events the dashboard publishes today. Any
/// other name round-trips through [`BusEventType::Other`], so contexts
/// running newer builds never fail to decode an unknown event.
///
/// Equality and hashing go through the wire name, so an `Other` spelling a
/// known name equals the named variant. [`BusEventType::normalized`] turns
/// it into that variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusEventType {
    /// A user's permission set changed.
    PermissionsUpdated,
    /// A user's client mapping changed.
    ClientMappingUpdated,
    /// A user was activated, deactivated or otherwise changed status.
    UserStatusUpdated,
    /// Any other event name.
    Other(String),
}

impl BusEventType {
    pub fn as_str(&self) -> &str {
        match self {
            BusEventType::PermissionsUpdated => "permissions-updated",
            BusEventType::ClientMappingUpdated => "client-mapping-updated",
            BusEventType::UserStatusUpdated => "user-status-updated",
            BusEventType::Other(name) => name,
        }
    }

    /// The named variant for a known name carried in `Other`.
    pub fn normalized(self) -> Self {
        match self {
            BusEventType::Other(name) => BusEventType::from(name),
            known => known,
        }
    }
}

impl PartialEq for BusEventType {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for BusEventType {}

impl Hash for BusEventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<&str> for BusEventType {
    fn from(name: &str) -> Self {
        match name {
            "permissions-updated" => BusEventType::PermissionsUpdated,
            "client-mapping-updated" => BusEventType::ClientMappingUpdated,
            "user-status-updated" => BusEventType::UserStatusUpdated,
            other => BusEventType::Other(other.to_string()),
        }
    }
}

impl From<String> for BusEventType {
    fn from(name: String) -> Self {
        match BusEventType::from(name.as_str()) {
            BusEventType::Other(_) => BusEventType::Other(name),
            known => known,
        }
    }
}

impl From<BusEventType> for String {
    fn from(event_type: BusEventType) -> Self {
        match event_type {
            BusEventType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BusEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// A typed event broadcast to every attached context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub event_type: BusEventType,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Milliseconds since the Unix epoch, set at publish time.
    pub timestamp: EpochMillis,
    /// `{type}-{timestamp}-{suffix}`; unique enough for subscriber-side dedup.
    pub id: String,
}

impl BusEvent {
    /// Build an event stamped with the current time and a fresh id.
    pub fn new(event_type: impl Into<BusEventType>, data: Map<String, Value>) -> Self {
        let event_type = event_type.into().normalized();
        let timestamp = now_millis();
        let id = generate_event_id(&event_type, timestamp);
        Self {
            event_type,
            data,
            timestamp,
            id,
        }
    }

    /// The entity this event is about, read from `userId` then `subjectId`.
    pub fn subject_id(&self) -> Option<&str> {
        SUBJECT_ID_FIELDS
            .iter()
            .find_map(|field| self.data.get(*field).and_then(Value::as_str))
    }

    /// Whether this event concerns the given subject.
    pub fn concerns(&self, subject_id: &str) -> bool {
        self.subject_id() == Some(subject_id)
    }

    pub fn to_json(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(BusError::Encode)
    }

    pub fn from_json(payload: &str) -> Result<Self, BusError> {
        serde_json::from_str(payload).map_err(BusError::Decode)
    }
}

/// Build an event id from its type, timestamp and a random lowercase suffix.
pub fn generate_event_id(event_type: &BusEventType, timestamp: EpochMillis) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(EVENT_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", event_type, timestamp, suffix)
}

/// Normalize a JSON value into event data.
///
/// Objects pass through unchanged, `null` becomes empty data and any other
/// value is wrapped under a `value` field.
pub fn event_data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
