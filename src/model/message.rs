use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DashboardError;

/// Event-style frames, discriminated by their `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedEvent {
    /// `{ "type": "vehicle_count", "lane": "Lane 1", "vehicle_count": 12 }`
    VehicleCount { lane: String, vehicle_count: u32 },

    /// `{ "type": "attack", "category": "DoS", "description": "..." }`
    Attack {
        category: String,
        description: String,
        // not sent by the reference sensors, but honoured when present
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lane: Option<String>,
    },
}

/// `type` values that must decode as a [`TypedEvent`].
const TYPED_EVENTS: [&str; 2] = ["vehicle_count", "attack"];

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Event(TypedEvent),

    /// Any other JSON object: a partial state update whose top-level keys
    /// overwrite the snapshot's (e.g. `{ lane1: {count, secure}, lane2: ..., timestamp }`).
    Update(Map<String, Value>),
}

impl InboundMessage {
    /// Decode one text frame.
    ///
    /// Non-JSON, non-object JSON and typed events with missing or ill-typed
    /// fields are all rejected; the caller logs and drops them.
    pub fn parse(raw: &str) -> Result<Self, DashboardError> {
        let value: Value = serde_json::from_str(raw)?;

        let Value::Object(map) = value else {
            return Err(DashboardError::MalformedFrame(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };

        let typed = map
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| TYPED_EVENTS.contains(&t));

        if typed {
            let event = serde_json::from_value(Value::Object(map))
                .map_err(|e| DashboardError::MalformedFrame(e.to_string()))?;
            Ok(Self::Event(event))
        } else {
            Ok(Self::Update(map))
        }
    }
}

/// Per-lane payload inside a bulk update: `{ "count": 17, "secure": true }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LaneReport {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub secure: Option<bool>,
}

impl LaneReport {
    /// Read a lane entry out of a bulk update; `None` if it carries nothing usable.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value::<Self>(value.clone())
            .ok()
            .filter(|report| report.count.is_some() || report.secure.is_some())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
