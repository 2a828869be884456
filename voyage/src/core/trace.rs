//! Event traces returned by the world worker.
//!
//! A trace is a JSON array of `[event_type, payload]` pairs. Only the final
//! `observe` event is interpreted structurally; the rest are kept verbatim for
//! prompts and iteration logs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::TraceError;
use crate::core::items::{PLACED_ITEMS, normalize_item};
use crate::plan::Inventory;

pub const OBSERVE: &str = "observe";
pub const ON_ERROR: &str = "onError";
pub const ON_CHAT: &str = "onChat";

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    events: Vec<Event>,
}

/// Contents of a chest as observed or remembered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChestState {
    Contents(BTreeMap<String, u32>),
    /// `"Unknown"` (not opened yet) or `"Invalid"` (no chest there anymore).
    Marker(String),
}

impl ChestState {
    pub const UNKNOWN: &'static str = "Unknown";
    pub const INVALID: &'static str = "Invalid";

    pub fn is_invalid(&self) -> bool {
        matches!(self, ChestState::Marker(marker) if marker == Self::INVALID)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Agent status carried by the terminal observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentStatus {
    pub health: f64,
    pub food: f64,
    pub biome: String,
    pub time_of_day: String,
    pub position: Position,
    pub equipment: Vec<Option<String>>,
    pub inventory_used: u32,
    /// Entity name → distance.
    pub entities: BTreeMap<String, f64>,
}

/// Terminal `observe` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Observation {
    pub voxels: Vec<String>,
    pub status: AgentStatus,
    pub inventory: BTreeMap<String, u32>,
    pub nearby_chests: BTreeMap<String, ChestState>,
}

impl Observation {
    /// Inventory keyed by normalized item names, counts summed across aliases.
    pub fn normalized_inventory(&self) -> Inventory {
        let mut inventory = Inventory::new();
        for (item, count) in &self.inventory {
            *inventory.entry(normalize_item(item)).or_default() += count;
        }
        inventory
    }

    /// Placeable tools (crafting table, furnace) among the nearby blocks.
    pub fn placed_items(&self) -> BTreeSet<String> {
        self.voxels
            .iter()
            .map(|block| normalize_item(block))
            .filter(|name| PLACED_ITEMS.contains(&name.as_str()))
            .collect()
    }
}

impl Trace {
    /// Parse a decoded JSON reply body.
    pub fn from_value(value: Value) -> Result<Self, TraceError> {
        let Value::Array(items) = value else {
            return Err(TraceError::Malformed(format!("expected array, got {value}")));
        };
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let Value::Array(mut pair) = item else {
                return Err(TraceError::Malformed(format!("expected pair, got {item}")));
            };
            if pair.len() != 2 {
                return Err(TraceError::Malformed(format!(
                    "expected 2 elements, got {}",
                    pair.len()
                )));
            }
            let payload = pair.pop().unwrap_or(Value::Null);
            let kind = match pair.pop() {
                Some(Value::String(kind)) => kind,
                other => {
                    return Err(TraceError::Malformed(format!(
                        "event type must be a string, got {other:?}"
                    )));
                }
            };
            events.push(Event { kind, payload });
        }
        Ok(Self { events })
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.events
                .iter()
                .map(|event| Value::Array(vec![Value::String(event.kind.clone()), event.payload.clone()]))
                .collect(),
        )
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The terminal observation; errors unless the last event is `observe`.
    pub fn observation(&self) -> Result<Observation, TraceError> {
        let last = self.events.last().ok_or(TraceError::Empty)?;
        if last.kind != OBSERVE {
            return Err(TraceError::NotTerminated(last.kind.clone()));
        }
        serde_json::from_value(last.payload.clone())
            .map_err(|err| TraceError::Observation(err.to_string()))
    }

    pub fn has_error(&self) -> bool {
        self.events.iter().any(|event| event.kind == ON_ERROR)
    }

    /// Text of every event of `kind`, read from the payload field of the same name.
    pub fn messages(&self, kind: &str) -> Vec<String> {
        self.events
            .iter()
            .filter(|event| event.kind == kind)
            .filter_map(|event| match &event.payload {
                Value::String(text) => Some(text.clone()),
                Value::Object(map) => map.get(kind).and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observe() -> Value {
        json!(["observe", {
            "voxels": ["grass_block", "oak_log"],
            "status": {
                "health": 20.0,
                "food": 18.0,
                "biome": "plains",
                "timeOfDay": "day",
                "position": {"x": 1.25, "y": 64.0, "z": -3.5},
                "equipment": [null, "wooden_pickaxe"],
                "inventoryUsed": 2,
                "entities": {"cow": 7.5}
            },
            "inventory": {"oak_log": 3, "oak_planks": 2, "birch_planks": 2},
            "nearbyChests": {"(1, 64, 2)": {"stick": 4}, "(5, 64, 2)": "Unknown"}
        }])
    }

    #[test]
    fn parses_terminal_observation() {
        let trace = Trace::from_value(json!([["onChat", {"onChat": "hello"}], observe()]))
            .expect("trace");
        let observation = trace.observation().expect("observation");

        assert_eq!(observation.status.biome, "plains");
        assert_eq!(observation.status.position.z, -3.5);
        assert_eq!(
            observation.nearby_chests.get("(5, 64, 2)"),
            Some(&ChestState::Marker("Unknown".to_string()))
        );
        let inventory = observation.normalized_inventory();
        assert_eq!(inventory.get("wood log"), Some(&3));
        assert_eq!(inventory.get("wood plank"), Some(&4));
        assert_eq!(trace.messages(ON_CHAT), vec!["hello"]);
        assert!(!trace.has_error());
    }

    #[test]
    fn placed_items_come_from_nearby_blocks() {
        let observation = Observation {
            voxels: vec![
                "grass_block".to_string(),
                "crafting_table".to_string(),
                "Furnace".to_string(),
                "oak_log".to_string(),
            ],
            ..Observation::default()
        };
        assert_eq!(
            observation.placed_items(),
            BTreeSet::from(["crafting table".to_string(), "furnace".to_string()])
        );
        assert!(observation.normalized_inventory().is_empty());
    }

    #[test]
    fn rejects_non_observe_terminal_event() {
        let trace = Trace::from_value(json!([observe(), ["onError", {"onError": "boom"}]]))
            .expect("trace");
        assert_eq!(
            trace.observation(),
            Err(TraceError::NotTerminated("onError".to_string()))
        );
        assert!(trace.has_error());
    }

    #[test]
    fn rejects_empty_and_malformed_traces() {
        let empty = Trace::from_value(json!([])).expect("trace");
        assert_eq!(empty.observation(), Err(TraceError::Empty));
        assert!(Trace::from_value(json!({"observe": {}})).is_err());
        assert!(Trace::from_value(json!([["observe"]])).is_err());
        assert!(Trace::from_value(json!([[1, {}]])).is_err());
    }

    #[test]
    fn round_trips_through_json_value() {
        let value = json!([["onChat", {"onChat": "hi"}], observe()]);
        let trace = Trace::from_value(value.clone()).expect("trace");
        assert_eq!(trace.to_value(), value);
    }
}
