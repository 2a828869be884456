//! Test-only doubles for the world worker, its transport and the language models.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};

use crate::core::trace::{OBSERVE, ON_CHAT, ON_ERROR};
use crate::io::llm::LanguageModel;
use crate::io::process::WorkerProcess;
use crate::io::transport::{Endpoint, ProtocolError, WorkerReply, WorldTransport};

/// Transport that answers from a queue of canned replies and records requests.
///
/// With `auto_pause`, pause toggles are answered with an empty 200 without
/// consuming the queue, so scripts only need the `/start` and `/step` bodies.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: RefCell<VecDeque<Result<WorkerReply, ProtocolError>>>,
    requests: RefCell<Vec<(Endpoint, Value)>>,
    auto_pause: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_pause() -> Self {
        Self {
            auto_pause: true,
            ..Self::default()
        }
    }

    pub fn push_ok(&self, body: impl Into<String>) {
        self.push_reply(200, body);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push_reply(status, body);
    }

    pub fn push_error(&self, err: ProtocolError) {
        self.replies.borrow_mut().push_back(Err(err));
    }

    fn push_reply(&self, status: u16, body: impl Into<String>) {
        self.replies.borrow_mut().push_back(Ok(WorkerReply {
            status,
            body: body.into(),
        }));
    }

    pub fn requests(&self) -> Vec<(Endpoint, Value)> {
        self.requests.borrow().clone()
    }

    /// Bodies sent to `endpoint`, in order.
    pub fn calls(&self, endpoint: Endpoint) -> Vec<Value> {
        self.requests
            .borrow()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl WorldTransport for ScriptedTransport {
    fn post(
        &self,
        endpoint: Endpoint,
        body: &Value,
        _timeout: Duration,
    ) -> Result<WorkerReply, ProtocolError> {
        self.requests.borrow_mut().push((endpoint, body.clone()));
        if self.auto_pause && endpoint == Endpoint::Pause {
            return Ok(WorkerReply {
                status: 200,
                body: String::new(),
            });
        }
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProtocolError::Transport {
                    endpoint,
                    message: "no scripted reply left".to_string(),
                })
            })
    }
}

/// Worker process double that counts starts.
#[derive(Debug, Default)]
pub struct FakeWorker {
    running: bool,
    starts: u32,
    failing_starts: u32,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` starts return Ok but leave the process not running.
    pub fn failing_starts(mut self, n: u32) -> Self {
        self.failing_starts = n;
        self
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn running(&self) -> bool {
        self.running
    }
}

impl WorkerProcess for FakeWorker {
    fn start(&mut self) -> Result<()> {
        self.starts += 1;
        self.running = self.starts > self.failing_starts;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.running
    }

    fn ready_line(&self) -> Option<&str> {
        self.running.then_some("Server started on port 3000")
    }
}

/// Language model double that returns canned responses in order.
#[derive(Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<(String, String)>>,
    calls: Cell<usize>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, response: impl Into<String>) {
        self.responses.borrow_mut().push_back(response.into());
    }

    /// `(system, user)` pairs received so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.requests
            .borrow_mut()
            .push((system.to_string(), user.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response left"))
    }
}

/// Builder for worker trace bodies ending in an `observe` event.
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    events: Vec<(String, String)>,
    voxels: Vec<String>,
    inventory: BTreeMap<String, u32>,
    inventory_used: u32,
    chests: Map<String, Value>,
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            voxels: vec!["grass_block".to_string(), "oak_log".to_string()],
            inventory: BTreeMap::from([("oak_log".to_string(), 3)]),
            inventory_used: 2,
            chests: Map::new(),
        }
    }
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an empty inventory.
    pub fn empty() -> Self {
        Self {
            inventory: BTreeMap::new(),
            inventory_used: 0,
            ..Self::default()
        }
    }

    pub fn event(mut self, kind: &str, text: &str) -> Self {
        self.events.push((kind.to_string(), text.to_string()));
        self
    }

    pub fn chat(self, text: &str) -> Self {
        self.event(ON_CHAT, text)
    }

    pub fn error(self, text: &str) -> Self {
        self.event(ON_ERROR, text)
    }

    pub fn item(mut self, name: &str, count: u32) -> Self {
        if self.inventory.insert(name.to_string(), count).is_none() {
            self.inventory_used += 1;
        }
        self
    }

    /// Add a block to the nearby `voxels`.
    pub fn block(mut self, name: &str) -> Self {
        self.voxels.push(name.to_string());
        self
    }

    pub fn chest(mut self, position: &str, state: Value) -> Self {
        self.chests.insert(position.to_string(), state);
        self
    }

    pub fn value(&self) -> Value {
        let mut items: Vec<Value> = self
            .events
            .iter()
            .map(|(kind, text)| {
                let mut payload = Map::new();
                payload.insert(kind.clone(), Value::String(text.clone()));
                json!([kind, payload])
            })
            .collect();
        items.push(json!([
            OBSERVE,
            {
                "voxels": self.voxels,
                "status": {
                    "health": 20.0,
                    "food": 18.0,
                    "biome": "plains",
                    "timeOfDay": "day",
                    "position": {"x": 1.3, "y": 64.0, "z": -3.5},
                    "equipment": [null, null, null, null, null, null],
                    "inventoryUsed": self.inventory_used,
                    "entities": {"cow": 7.5, "pig": 2.0},
                },
                "inventory": self.inventory,
                "nearbyChests": self.chests,
            }
        ]));
        Value::Array(items)
    }

    pub fn body(&self) -> String {
        self.value().to_string()
    }
}

/// Trace with the given `(kind, text)` events followed by the default observation.
pub fn observe_trace_value(events: &[(&str, &str)]) -> Value {
    events
        .iter()
        .fold(TraceBuilder::new(), |builder, (kind, text)| builder.event(kind, text))
        .value()
}

pub fn observe_trace(events: &[(&str, &str)]) -> String {
    observe_trace_value(events).to_string()
}
