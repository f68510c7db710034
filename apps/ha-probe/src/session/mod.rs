//! One-shot sessions against the Home Assistant API.
//!
//! Both transports walk the same lifecycle:
//! `Disconnected -> Connecting -> AwaitingAuth -> Authenticated -> Closed`,
//! with any failure before `Authenticated` going straight to `Closed`.
//! There is no reconnect; a closed session stays closed.

mod rest;
mod websocket;

pub use rest::{RestOutcome, RestSession};
pub use websocket::{HandshakeTranscript, WsSession};

use ha_wire::{EntityState, ErrorInfo, LogEntry, RequestKind, ResultPayload};
use std::fmt;
use std::time::Duration;

/// Bound on opening the transport and completing the auth exchange.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Authenticated,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingAuth => "awaiting auth",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        })
    }
}

/// Reply to one WebSocket request, matched by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub kind: RequestKind,
    pub success: bool,
    pub payload: ResultPayload,
    pub error: Option<ErrorInfo>,
}

impl Response {
    /// Short description of a `success: false` reply for the console.
    pub fn failure_summary(&self) -> String {
        match &self.error {
            Some(error) => format!("{} failed: {error}", self.kind),
            None => format!("{} failed", self.kind),
        }
    }

    /// Log entries of a successful reply; a failed reply yields none.
    pub fn into_logs(self) -> Vec<LogEntry> {
        if !self.success {
            return Vec::new();
        }
        self.payload.into_logs()
    }

    pub fn into_states(self) -> Vec<EntityState> {
        if !self.success {
            return Vec::new();
        }
        self.payload.into_states()
    }
}
