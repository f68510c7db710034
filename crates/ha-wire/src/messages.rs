use crate::model::{EntityState, LogEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Kinds of requests the diagnostic client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Auth,
    ListLogs,
    GetStates,
    CallService,
}

impl RequestKind {
    /// Value of the `type` field on the wire.
    pub fn wire_type(self) -> &'static str {
        match self {
            RequestKind::Auth => "auth",
            RequestKind::ListLogs => "system_log/list",
            RequestKind::GetStates => "get_states",
            RequestKind::CallService => "call_service",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_type())
    }
}

/// Messages sent from the client to the WebSocket endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        access_token: String,
    },
    #[serde(rename = "system_log/list")]
    SystemLogList {
        id: u64,
    },
    GetStates {
        id: u64,
    },
    CallService {
        id: u64,
        domain: String,
        service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_data: Option<Value>,
    },
}

impl ClientMessage {
    pub fn id(&self) -> Option<u64> {
        match self {
            ClientMessage::Auth { .. } => None,
            ClientMessage::SystemLogList { id }
            | ClientMessage::GetStates { id }
            | ClientMessage::CallService { id, .. } => Some(*id),
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            ClientMessage::Auth { .. } => RequestKind::Auth,
            ClientMessage::SystemLogList { .. } => RequestKind::ListLogs,
            ClientMessage::GetStates { .. } => RequestKind::GetStates,
            ClientMessage::CallService { .. } => RequestKind::CallService,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Hand-written so the access token never ends up in a log line.
impl fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Auth { .. } => f
                .debug_struct("Auth")
                .field("access_token", &"<redacted>")
                .finish(),
            ClientMessage::SystemLogList { id } => {
                f.debug_struct("SystemLogList").field("id", id).finish()
            }
            ClientMessage::GetStates { id } => f.debug_struct("GetStates").field("id", id).finish(),
            ClientMessage::CallService {
                id,
                domain,
                service,
                service_data,
            } => f
                .debug_struct("CallService")
                .field("id", id)
                .field("domain", domain)
                .field("service", service)
                .field("service_data", service_data)
                .finish(),
        }
    }
}

/// Error object attached to a failed `result` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (true, true) => f.write_str("unknown error"),
            (false, true) => f.write_str(&self.code),
            (true, false) => f.write_str(&self.message),
            (false, false) => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Messages sent by the server over the WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    Event {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(default)]
        event: Value,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
}

impl ServerMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::AuthRequired { .. } => "auth_required",
            ServerMessage::AuthOk { .. } => "auth_ok",
            ServerMessage::AuthInvalid { .. } => "auth_invalid",
            ServerMessage::Result { .. } => "result",
            ServerMessage::Event { .. } => "event",
            ServerMessage::Pong { .. } => "pong",
        }
    }
}

/// A decoded inbound frame. Frames whose `type` we do not model are kept as
/// raw JSON instead of failing the session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Known(ServerMessage),
    Unknown(Value),
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Inbound::Known(message) => message.type_name(),
            Inbound::Unknown(raw) => raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("<untyped>"),
        }
    }
}

/// A data request, before it is assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    ListLogs,
    GetStates,
    CallService {
        domain: String,
        service: String,
        service_data: Option<Value>,
    },
}

impl Query {
    pub fn kind(&self) -> RequestKind {
        match self {
            Query::ListLogs => RequestKind::ListLogs,
            Query::GetStates => RequestKind::GetStates,
            Query::CallService { .. } => RequestKind::CallService,
        }
    }

    pub fn into_message(self, id: u64) -> ClientMessage {
        match self {
            Query::ListLogs => ClientMessage::SystemLogList { id },
            Query::GetStates => ClientMessage::GetStates { id },
            Query::CallService {
                domain,
                service,
                service_data,
            } => ClientMessage::CallService {
                id,
                domain,
                service,
                service_data,
            },
        }
    }
}

/// The `result` field of a response, decoded according to the request kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Logs(Vec<LogEntry>),
    States(Vec<EntityState>),
    Empty,
    /// Well-formed JSON in a shape this client does not understand.
    Opaque(Value),
}

impl ResultPayload {
    pub fn decode(kind: RequestKind, result: Option<Value>) -> Self {
        let value = match result {
            None | Some(Value::Null) => return ResultPayload::Empty,
            Some(value) => value,
        };

        match kind {
            RequestKind::ListLogs => match decode_items::<LogEntry>(kind, value) {
                Ok(entries) => ResultPayload::Logs(entries),
                Err(value) => ResultPayload::Opaque(value),
            },
            RequestKind::GetStates => match decode_items::<EntityState>(kind, value) {
                Ok(states) => ResultPayload::States(states),
                Err(value) => ResultPayload::Opaque(value),
            },
            RequestKind::Auth | RequestKind::CallService => ResultPayload::Opaque(value),
        }
    }

    pub fn into_logs(self) -> Vec<LogEntry> {
        match self {
            ResultPayload::Logs(entries) => entries,
            _ => Vec::new(),
        }
    }

    pub fn into_states(self) -> Vec<EntityState> {
        match self {
            ResultPayload::States(states) => states,
            _ => Vec::new(),
        }
    }
}

/// Decodes a JSON array element by element. Entries that do not fit `T` are
/// dropped with a warning; anything other than an array is handed back.
fn decode_items<T: DeserializeOwned>(kind: RequestKind, value: Value) -> Result<Vec<T>, Value> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(other),
    };
    let total = items.len();
    let mut decoded = Vec::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(entry) => decoded.push(entry),
            Err(err) => debug!(%kind, index, error = %err, "dropping undecodable entry"),
        }
    }
    let rejected = total - decoded.len();
    if rejected > 0 {
        warn!(%kind, rejected, total, "result entries not understood");
    }
    Ok(decoded)
}
