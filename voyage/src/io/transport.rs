//! Request/response transport to the world worker.

use std::error::Error as _;
use std::fmt;
use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Worker endpoints; every request is a JSON POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Step,
    Pause,
    Stop,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Start => "/start",
            Endpoint::Step => "/step",
            Endpoint::Pause => "/pause",
            Endpoint::Stop => "/stop",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Raw reply from the worker, before status checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReply {
    pub status: u16,
    pub body: String,
}

/// Failure talking to the world worker. Retried by the outer loop.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("world has not been reset; call reset before step")]
    NotReset,
    #[error("world session is closed")]
    Closed,
    #[error("inventory can only be set when reset mode is hard")]
    InventoryRequiresHardReset,
    #[error("{process} failed to {action}: {message}")]
    Worker {
        process: String,
        action: &'static str,
        message: String,
    },
    #[error("worker did not come up after {attempts} start attempts")]
    WorkerStart { attempts: u32 },
    #[error("{endpoint} timed out after {}s", .timeout.as_secs())]
    Timeout { endpoint: Endpoint, timeout: Duration },
    #[error("{endpoint} transport failure: {message}")]
    Transport { endpoint: Endpoint, message: String },
    #[error("{endpoint} replied with status {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: u16,
        body: String,
    },
    #[error("{endpoint} reply is malformed: {message}")]
    MalformedReply { endpoint: Endpoint, message: String },
}

/// Carries one JSON request to the worker and returns its reply.
pub trait WorldTransport {
    fn post(
        &self,
        endpoint: Endpoint,
        body: &Value,
        timeout: Duration,
    ) -> Result<WorkerReply, ProtocolError>;
}

/// HTTP transport over `ureq`.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl WorldTransport for HttpTransport {
    fn post(
        &self,
        endpoint: Endpoint,
        body: &Value,
        timeout: Duration,
    ) -> Result<WorkerReply, ProtocolError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(url = %url, "posting to worker");
        let result = self
            .agent
            .post(&url)
            .timeout(timeout)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());

        match result {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| ProtocolError::MalformedReply {
                        endpoint,
                        message: e.to_string(),
                    })?;
                Ok(WorkerReply { status, body })
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Ok(WorkerReply { status, body })
            }
            Err(ureq::Error::Transport(transport)) => {
                let message = transport.to_string();
                warn!(endpoint = %endpoint, err = %message, "worker transport failure");
                if is_timeout(&transport) {
                    Err(ProtocolError::Timeout { endpoint, timeout })
                } else {
                    Err(ProtocolError::Transport { endpoint, message })
                }
            }
        }
    }
}

/// An I/O transport error whose underlying cause is a read or connect timeout.
fn is_timeout(transport: &ureq::Transport) -> bool {
    matches!(transport.kind(), ureq::ErrorKind::Io)
        && transport
            .source()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .is_some_and(|err| {
                matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
            })
}
