//! Synchronous session protocol against the world worker.
//!
//! The bridge owns the worker process (and optionally a world instance) and
//! tracks three flags that gate every request: whether a reset has succeeded,
//! whether the worker is connected to the world, and whether the world is
//! paused. `pause`/`unpause` are a toggle on the worker side, so the flag is
//! the only source of truth and is flipped only on a 200 reply.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::trace::{Position, Trace};
use crate::io::config::WorldConfig;
use crate::io::process::WorkerProcess;
use crate::io::transport::{Endpoint, ProtocolError, WorldTransport};

/// Session lifecycle, derived from the bridge flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Paused,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    #[default]
    Hard,
    Soft,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetOptions {
    pub mode: ResetMode,
    /// Only honored on a hard reset.
    pub inventory: BTreeMap<String, u32>,
    pub equipment: Vec<String>,
    pub spread: bool,
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// World port the worker's bot connects to.
    pub world_port: u16,
    pub request_timeout: Duration,
    pub wait_ticks: u32,
    /// Pause between stopping and restarting the worker on reset.
    pub settle: Duration,
    pub start_attempts: u32,
}

impl BridgeSettings {
    pub fn from_config(cfg: &WorldConfig) -> Self {
        Self {
            world_port: cfg.world_port,
            request_timeout: cfg.request_timeout(),
            wait_ticks: cfg.wait_ticks,
            settle: Duration::from_millis(cfg.settle_millis),
            start_attempts: cfg.start_attempts,
        }
    }
}

pub struct WorldBridge<T: WorldTransport, P: WorkerProcess> {
    transport: T,
    worker: P,
    instance: Option<P>,
    settings: BridgeSettings,
    has_reset: bool,
    connected: bool,
    paused: bool,
    closed: bool,
}

impl<T: WorldTransport, P: WorkerProcess> WorldBridge<T, P> {
    pub fn new(transport: T, worker: P, settings: BridgeSettings) -> Self {
        Self {
            transport,
            worker,
            instance: None,
            settings,
            has_reset: false,
            connected: false,
            paused: false,
            closed: false,
        }
    }

    /// Supervise a world instance alongside the worker.
    pub fn with_instance(mut self, instance: P) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if !self.has_reset {
            SessionState::Uninitialized
        } else if self.paused {
            SessionState::Paused
        } else {
            SessionState::Ready
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn worker(&self) -> &P {
        &self.worker
    }

    /// Restart the worker, start a session and return the initial trace paused.
    #[instrument(skip_all, fields(mode = ?options.mode))]
    pub fn reset(&mut self, options: &ResetOptions) -> Result<Trace, ProtocolError> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        if !options.inventory.is_empty() && options.mode != ResetMode::Hard {
            return Err(ProtocolError::InventoryRequiresHardReset);
        }

        self.ensure_instance()?;
        if let Err(e) = self.unpause() {
            warn!(err = %e, "unpause before reset failed; restarting worker anyway");
            self.paused = false;
        }
        self.worker.stop().map_err(|e| worker_error("mineflayer", "stop", &e))?;
        self.has_reset = false;
        self.connected = false;
        thread::sleep(self.settings.settle);
        self.start_worker()?;

        let body = json!({
            "port": self.settings.world_port,
            "reset": options.mode,
            "inventory": options.inventory,
            "equipment": options.equipment,
            "spread": options.spread,
            "waitTicks": self.settings.wait_ticks,
            "position": options.position,
        });
        let reply = match self.request(Endpoint::Start, &body) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(err = %e, "start request failed, stopping worker");
                if let Err(stop_err) = self.worker.stop() {
                    warn!(err = %stop_err, "failed to stop worker after start failure");
                }
                return Err(e);
            }
        };

        self.has_reset = true;
        self.connected = true;
        self.paused = false;
        let trace = parse_trace(Endpoint::Start, &reply)?;
        self.pause()?;
        info!(events = trace.events().len(), "world reset");
        Ok(trace)
    }

    /// Execute `code` with the supporting `programs` and return the resulting trace.
    #[instrument(skip_all, fields(code_bytes = code.len()))]
    pub fn step(&mut self, code: &str, programs: &str) -> Result<Trace, ProtocolError> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        if !self.has_reset {
            return Err(ProtocolError::NotReset);
        }
        self.unpause()?;
        let reply = self.request(
            Endpoint::Step,
            &json!({ "code": code, "programs": programs }),
        )?;
        self.pause()?;
        parse_trace(Endpoint::Step, &reply)
    }

    pub fn pause(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        if !self.has_reset {
            return Err(ProtocolError::NotReset);
        }
        if self.paused {
            return Ok(());
        }
        self.request(Endpoint::Pause, &json!({}))?;
        self.paused = true;
        debug!("world paused");
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        if !self.paused {
            return Ok(());
        }
        self.request(Endpoint::Pause, &json!({}))?;
        self.paused = false;
        debug!("world unpaused");
        Ok(())
    }

    /// Tear everything down, best effort; returns the first failure.
    #[instrument(skip_all)]
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        let mut first: Option<ProtocolError> = None;

        if !self.closed && self.paused {
            if let Err(e) = self.unpause() {
                warn!(err = %e, "unpause on close failed");
                first.get_or_insert(e);
            }
            self.paused = false;
        }
        if !self.closed && self.connected {
            if let Err(e) = self.request(Endpoint::Stop, &json!({})) {
                warn!(err = %e, "stop request on close failed");
                first.get_or_insert(e);
            }
            self.connected = false;
        }
        if let Some(instance) = self.instance.as_mut() {
            if let Err(e) = instance.stop() {
                warn!(err = %e, "failed to stop world instance");
                first.get_or_insert(worker_error("minecraft", "stop", &e));
            }
        }
        if let Err(e) = self.worker.stop() {
            warn!(err = %e, "failed to stop worker");
            first.get_or_insert(worker_error("mineflayer", "stop", &e));
        }

        if !self.closed {
            info!("world session closed");
        }
        self.closed = true;
        first.map_or(Ok(()), Err)
    }

    fn ensure_instance(&mut self) -> Result<(), ProtocolError> {
        let Some(instance) = self.instance.as_mut() else {
            return Ok(());
        };
        if instance.is_running() {
            return Ok(());
        }
        instance
            .start()
            .map_err(|e| worker_error("minecraft", "start", &e))?;
        if !instance.is_running() {
            return Err(ProtocolError::Worker {
                process: "minecraft".to_string(),
                action: "start",
                message: "exited before becoming ready".to_string(),
            });
        }
        Ok(())
    }

    fn start_worker(&mut self) -> Result<(), ProtocolError> {
        for attempt in 1..=self.settings.start_attempts {
            match self.worker.start() {
                Ok(()) if self.worker.is_running() => {
                    debug!(attempt, ready = ?self.worker.ready_line(), "worker started");
                    return Ok(());
                }
                Ok(()) => warn!(attempt, "worker exited during startup"),
                Err(e) => warn!(attempt, err = %e, "worker start failed"),
            }
        }
        Err(ProtocolError::WorkerStart {
            attempts: self.settings.start_attempts,
        })
    }

    fn request(&self, endpoint: Endpoint, body: &Value) -> Result<String, ProtocolError> {
        let reply = self
            .transport
            .post(endpoint, body, self.settings.request_timeout)?;
        if reply.status != 200 {
            warn!(endpoint = %endpoint, status = reply.status, "worker rejected request");
            return Err(ProtocolError::Status {
                endpoint,
                status: reply.status,
                body: reply.body,
            });
        }
        Ok(reply.body)
    }
}

fn worker_error(process: &str, action: &'static str, err: &anyhow::Error) -> ProtocolError {
    ProtocolError::Worker {
        process: process.to_string(),
        action,
        message: format!("{err:#}"),
    }
}

/// Decode a trace body; the worker may double-encode it as a JSON string.
pub fn parse_trace(endpoint: Endpoint, body: &str) -> Result<Trace, ProtocolError> {
    let malformed = |message: String| ProtocolError::MalformedReply { endpoint, message };
    let mut value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|e| malformed(e.to_string()))?;
    }
    Trace::from_value(value).map_err(|e| malformed(e.to_string()))
}
