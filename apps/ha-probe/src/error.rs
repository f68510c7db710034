use crate::session::SessionState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagError {
    #[error("required file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("missing Home Assistant credentials ({})", missing.join(", "))]
    MissingCredentials { missing: Vec<&'static str> },
    #[error("authentication failed: {payload}")]
    AuthenticationFailed { payload: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("{message}")]
    Toolchain { message: String, exit_code: u8 },
}

impl DiagError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        DiagError::Transport(err.to_string())
    }

    /// Process exit status the binary reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DiagError::FileNotFound { .. }
            | DiagError::MissingCredentials { .. }
            | DiagError::Config(_) => 2,
            DiagError::Toolchain { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }

    /// Operator-facing hint printed under the error, if there is one.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            DiagError::MissingCredentials { .. } => Some(
                "Set HOME_ASSISTANT_BASE_URL and HOME_ASSISTANT_TOKEN, fill esphome/secrets.yaml, \
                 or define HA_HOST/HA_TOKEN in main/config.h.",
            ),
            DiagError::AuthenticationFailed { .. } => {
                Some("Check that the long-lived access token is valid for this server.")
            }
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DiagError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        DiagError::Transport(value.to_string())
    }
}

impl From<reqwest::Error> for DiagError {
    fn from(value: reqwest::Error) -> Self {
        DiagError::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for DiagError {
    fn from(value: serde_json::Error) -> Self {
        DiagError::Protocol(value.to_string())
    }
}

impl From<serde_yaml::Error> for DiagError {
    fn from(value: serde_yaml::Error) -> Self {
        DiagError::Config(format!("invalid secrets file: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failures_exit_with_two() {
        assert_eq!(
            DiagError::MissingCredentials {
                missing: vec!["host"]
            }
            .exit_code(),
            2
        );
        assert_eq!(
            DiagError::FileNotFound {
                path: PathBuf::from("main/config.h")
            }
            .exit_code(),
            2
        );
        assert_eq!(DiagError::Transport("reset".into()).exit_code(), 1);
        assert_eq!(
            DiagError::Toolchain {
                message: "no export script".into(),
                exit_code: 1
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn missing_credentials_lists_fields() {
        let err = DiagError::MissingCredentials {
            missing: vec!["host", "token"],
        };
        assert_eq!(
            err.to_string(),
            "missing Home Assistant credentials (host, token)"
        );
        assert!(err.guidance().is_some());
    }
}
