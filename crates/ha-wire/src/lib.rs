//! Shared message definitions for talking to a Home Assistant instance.
//! Keeping them in a dedicated crate lets the diagnostic client and the
//! in-process test doubles agree on one set of shapes.

pub mod messages;
pub mod model;

pub use messages::{ClientMessage, ErrorInfo, Inbound, Query, RequestKind, ResultPayload, ServerMessage};
pub use model::{ApiConfig, EntityState, LogEntry, LogLevel};

/// Path of the WebSocket endpoint relative to the server root.
pub const WEBSOCKET_PATH: &str = "/api/websocket";
