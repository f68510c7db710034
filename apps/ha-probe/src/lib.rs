//! Remote diagnostics for a Home Assistant server backing the ESP32-P4 voice
//! assistant, plus thin wrappers around the ESP-IDF build and flash steps.
//!
//! Credentials come from three tiers (environment, ESPHome secrets file,
//! firmware `config.h`); see [`credentials::CredentialResolver`]. Sessions
//! are one-shot: connect, authenticate, issue requests one at a time, close.

pub mod cli;
pub mod commands;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod header;
pub mod report;
pub mod session;
pub mod telemetry;
pub mod toolchain;

pub use credentials::{ConnectionParameters, CredentialResolver, EnvOverrides, SecretsFile};
pub use error::DiagError;
pub use session::{RestSession, SessionState, WsSession};

/// Completes on the first Ctrl-C. If the handler cannot be installed it
/// never completes.
pub async fn user_interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::debug!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
