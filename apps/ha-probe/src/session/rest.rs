use super::{SessionState, CONNECT_TIMEOUT};
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use ha_wire::{ApiConfig, EntityState};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// Result of one REST call. Non-2xx statuses are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RestOutcome<T> {
    Success(T),
    NotFound,
    Failed { status: StatusCode, body: String },
}

impl<T> RestOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RestOutcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            RestOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Status line for a non-success outcome, e.g. `HTTP 500: boom`.
    pub fn describe_failure(&self) -> Option<String> {
        match self {
            RestOutcome::Success(_) => None,
            RestOutcome::NotFound => Some(format!("HTTP {}", StatusCode::NOT_FOUND)),
            RestOutcome::Failed { status, body } if body.is_empty() => {
                Some(format!("HTTP {status}"))
            }
            RestOutcome::Failed { status, body } => Some(format!("HTTP {status}: {body}")),
        }
    }
}

/// Bearer-token client for the REST API, validated with `GET /api/`.
pub struct RestSession {
    http: Client,
    base_url: Url,
    token: String,
    state: SessionState,
    api_message: Option<String>,
}

impl RestSession {
    pub fn new(params: &ConnectionParameters) -> Result<Self, DiagError> {
        let base_url = Url::parse(&params.http_base_url())
            .map_err(|err| DiagError::Config(format!("invalid server address: {err}")))?;
        let verify = !params.use_tls() || params.verify_tls();
        if !verify {
            warn!(
                target: "ha_probe::session",
                host = params.host(),
                "TLS certificate verification disabled"
            );
        }
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(!verify)
            .danger_accept_invalid_hostnames(!verify)
            .build()
            .map_err(|err| DiagError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base_url,
            token: params.token().to_string(),
            state: SessionState::Disconnected,
            api_message: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Body of the `GET /api/` probe, typically `API running.`.
    pub fn api_message(&self) -> Option<&str> {
        self.api_message.as_deref()
    }

    /// Checks reachability and the token. 401/403 close the session with
    /// `AuthenticationFailed`.
    pub async fn connect(&mut self) -> Result<(), DiagError> {
        if self.state != SessionState::Disconnected {
            return Err(DiagError::InvalidState {
                expected: SessionState::Disconnected,
                actual: self.state,
            });
        }
        self.state = SessionState::Connecting;

        let response = match self.send_get("api/").await {
            Ok(response) => response,
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        };
        self.state = SessionState::AwaitingAuth;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.state = SessionState::Closed;
            return Err(DiagError::AuthenticationFailed {
                payload: format!("HTTP {status}: {}", body.trim()),
            });
        }
        if !status.is_success() {
            self.state = SessionState::Closed;
            return Err(DiagError::Transport(format!(
                "GET /api/ returned HTTP {status}: {}",
                body.trim()
            )));
        }

        self.api_message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string));
        self.state = SessionState::Authenticated;
        info!(target: "ha_probe::session", url = %self.base_url, "rest api reachable");
        Ok(())
    }

    pub async fn config(&self) -> Result<RestOutcome<ApiConfig>, DiagError> {
        self.get_json("api/config").await
    }

    pub async fn states(&self) -> Result<RestOutcome<Vec<EntityState>>, DiagError> {
        self.get_json("api/states").await
    }

    /// A single entity; an unknown id is `NotFound` rather than a failure.
    pub async fn state(&self, entity_id: &str) -> Result<RestOutcome<EntityState>, DiagError> {
        self.get_json(&format!("api/states/{entity_id}")).await
    }

    /// Plain-text server log.
    pub async fn error_log(&self) -> Result<RestOutcome<String>, DiagError> {
        self.ensure_authenticated()?;
        let response = self.send_get("api/error_log").await?;
        let status = response.status();
        if status.is_success() {
            return Ok(RestOutcome::Success(response.text().await?));
        }
        Ok(failure(status, response).await)
    }

    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &Value,
    ) -> Result<RestOutcome<Value>, DiagError> {
        self.ensure_authenticated()?;
        let url = self.url(&format!("api/services/{domain}/{service}"))?;
        debug!(target: "ha_probe::session", %url, "POST");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(data)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            let value = if body.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&body)?
            };
            return Ok(RestOutcome::Success(value));
        }
        Ok(failure(status, response).await)
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    async fn get_json<T>(&self, path: &str) -> Result<RestOutcome<T>, DiagError>
    where
        T: DeserializeOwned,
    {
        self.ensure_authenticated()?;
        let response = self.send_get(path).await?;
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            return Ok(RestOutcome::Success(serde_json::from_str(&body)?));
        }
        Ok(failure(status, response).await)
    }

    async fn send_get(&self, path: &str) -> Result<Response, DiagError> {
        let url = self.url(path)?;
        debug!(target: "ha_probe::session", %url, "GET");
        Ok(self.http.get(url).bearer_auth(&self.token).send().await?)
    }

    fn ensure_authenticated(&self) -> Result<(), DiagError> {
        if self.state == SessionState::Authenticated {
            Ok(())
        } else {
            Err(DiagError::InvalidState {
                expected: SessionState::Authenticated,
                actual: self.state,
            })
        }
    }

    fn url(&self, path: &str) -> Result<Url, DiagError> {
        self.base_url
            .join(path)
            .map_err(|err| DiagError::Config(format!("invalid api path '{path}': {err}")))
    }
}

async fn failure<T>(status: StatusCode, response: Response) -> RestOutcome<T> {
    if status == StatusCode::NOT_FOUND {
        return RestOutcome::NotFound;
    }
    let body = response.text().await.unwrap_or_default();
    RestOutcome::Failed {
        status,
        body: body.trim().to_string(),
    }
}
