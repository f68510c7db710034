use super::{Response, SessionState, CONNECT_TIMEOUT};
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use futures_util::{SinkExt, StreamExt};
use ha_wire::{ClientMessage, Inbound, Query, ResultPayload, ServerMessage};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Raw frames exchanged during authentication, kept for `ws-check` output.
/// The client's own `auth` frame is not recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandshakeTranscript {
    pub greeting: String,
    pub verdict: String,
}

/// Single-request-in-flight client for `/api/websocket`.
pub struct WsSession {
    state: SessionState,
    stream: Option<WsStream>,
    next_id: u64,
    server_version: Option<String>,
    transcript: HandshakeTranscript,
    opened: bool,
}

impl Default for WsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WsSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            stream: None,
            next_id: 1,
            server_version: None,
            transcript: HandshakeTranscript::default(),
            opened: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Version reported in `auth_ok` (or `auth_required` if `auth_ok` omits it).
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn transcript(&self) -> &HandshakeTranscript {
        &self.transcript
    }

    /// Whether a socket was ever established, even if the handshake then failed.
    pub fn was_opened(&self) -> bool {
        self.opened
    }

    /// Opens the socket and runs the auth exchange. On any failure the session
    /// ends up `Closed` with the transport released.
    pub async fn connect(&mut self, params: &ConnectionParameters) -> Result<(), DiagError> {
        if self.state != SessionState::Disconnected {
            return Err(DiagError::InvalidState {
                expected: SessionState::Disconnected,
                actual: self.state,
            });
        }
        self.state = SessionState::Connecting;

        let outcome = match timeout(CONNECT_TIMEOUT, self.establish(params)).await {
            Ok(result) => result,
            Err(_) => Err(DiagError::Transport(format!(
                "no authentication result within {}s",
                CONNECT_TIMEOUT.as_secs()
            ))),
        };

        if let Err(err) = outcome {
            self.close().await;
            return Err(err);
        }
        info!(
            target: "ha_probe::session",
            url = %params.websocket_url(),
            version = self.server_version.as_deref().unwrap_or("unknown"),
            "websocket authenticated"
        );
        Ok(())
    }

    async fn establish(&mut self, params: &ConnectionParameters) -> Result<(), DiagError> {
        let url = params.websocket_url();
        debug!(target: "ha_probe::session", %url, "opening websocket");
        let (stream, _) =
            connect_async_tls_with_config(url.as_str(), None, false, tls_connector(params)?)
                .await?;
        self.stream = Some(stream);
        self.opened = true;
        self.state = SessionState::AwaitingAuth;

        let greeting = self.recv_text().await?;
        self.transcript.greeting = greeting.clone();
        match Inbound::parse(&greeting) {
            Ok(Inbound::Known(ServerMessage::AuthRequired { ha_version })) => {
                self.server_version = ha_version;
            }
            _ => return Err(DiagError::AuthenticationFailed { payload: greeting }),
        }

        self.send(&ClientMessage::Auth {
            access_token: params.token().to_string(),
        })
        .await?;

        let verdict = self.recv_text().await?;
        self.transcript.verdict = verdict.clone();
        match Inbound::parse(&verdict) {
            Ok(Inbound::Known(ServerMessage::AuthOk { ha_version })) => {
                if ha_version.is_some() {
                    self.server_version = ha_version;
                }
                self.state = SessionState::Authenticated;
                Ok(())
            }
            _ => Err(DiagError::AuthenticationFailed { payload: verdict }),
        }
    }

    /// Sends one query and waits for the `result` carrying its id. Frames for
    /// other ids, events and unknown message types are skipped. A reply with
    /// `success: false` is returned as a failed [`Response`], not an error.
    pub async fn request(&mut self, query: Query) -> Result<Response, DiagError> {
        if self.state != SessionState::Authenticated {
            return Err(DiagError::InvalidState {
                expected: SessionState::Authenticated,
                actual: self.state,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let kind = query.kind();
        let message = query.into_message(id);
        debug!(target: "ha_probe::session", ?message, "sending request");

        match self.exchange(&message, id).await {
            Ok((success, result, error)) => {
                let payload = if success {
                    ResultPayload::decode(kind, result)
                } else {
                    ResultPayload::Empty
                };
                Ok(Response {
                    id,
                    kind,
                    success,
                    payload,
                    error,
                })
            }
            Err(err) => {
                self.close().await;
                Err(err)
            }
        }
    }

    async fn exchange(
        &mut self,
        message: &ClientMessage,
        id: u64,
    ) -> Result<(bool, Option<Value>, Option<ha_wire::ErrorInfo>), DiagError> {
        self.send(message).await?;
        loop {
            let text = self.recv_text().await?;
            match Inbound::parse(&text) {
                Ok(Inbound::Known(ServerMessage::Result {
                    id: reply_id,
                    success,
                    result,
                    error,
                })) if reply_id == id => return Ok((success, result, error)),
                Ok(other) => {
                    debug!(
                        target: "ha_probe::session",
                        frame = other.type_name(),
                        waiting_for = id,
                        "skipping unrelated frame"
                    );
                }
                Err(err) => {
                    warn!(target: "ha_probe::session", error = %err, "skipping undecodable frame");
                }
            }
        }
    }

    pub async fn list_logs(&mut self) -> Result<Response, DiagError> {
        self.request(Query::ListLogs).await
    }

    pub async fn get_states(&mut self) -> Result<Response, DiagError> {
        self.request(Query::GetStates).await
    }

    pub async fn call_service(
        &mut self,
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Value>,
    ) -> Result<Response, DiagError> {
        self.request(Query::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data,
        })
        .await
    }

    /// Releases the socket. Safe to call from any state, any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.close(None).await {
                debug!(target: "ha_probe::session", error = %err, "websocket close failed");
            }
        }
        self.state = SessionState::Closed;
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), DiagError> {
        let text = message.to_json()?;
        let stream = self.stream.as_mut().ok_or_else(|| {
            DiagError::Transport("websocket is not open".to_string())
        })?;
        stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<String, DiagError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            DiagError::Transport("websocket is not open".to_string())
        })?;
        while let Some(frame) = stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(text),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(text),
                    Err(_) => {
                        debug!(target: "ha_probe::session", "skipping non-utf8 binary frame");
                    }
                },
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| format!("{} {}", frame.code, frame.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(DiagError::Transport(format!(
                        "server closed the connection ({reason})"
                    )));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Err(DiagError::Transport(
            "connection ended unexpectedly".to_string(),
        ))
    }
}

fn tls_connector(params: &ConnectionParameters) -> Result<Option<Connector>, DiagError> {
    if !params.use_tls() || params.verify_tls() {
        return Ok(None);
    }
    warn!(
        target: "ha_probe::session",
        host = params.host(),
        "TLS certificate verification disabled"
    );
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(DiagError::transport)?;
    Ok(Some(Connector::NativeTls(connector)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_before_connect_is_rejected() {
        let mut session = WsSession::new();
        match session.request(Query::ListLogs).await {
            Err(DiagError::InvalidState { expected, actual }) => {
                assert_eq!(expected, SessionState::Authenticated);
                assert_eq!(actual, SessionState::Disconnected);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut session = WsSession::new();
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn closed_session_cannot_reconnect() {
        let mut session = WsSession::new();
        session.close().await;
        let params = ConnectionParameters::new("127.0.0.1", 1, false, "token").unwrap();
        assert!(matches!(
            session.connect(&params).await,
            Err(DiagError::InvalidState {
                actual: SessionState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn plain_and_verified_connections_use_default_connector() {
        let plain = ConnectionParameters::new("ha.lan", 8123, false, "t").unwrap();
        assert!(tls_connector(&plain).unwrap().is_none());
        let verified = ConnectionParameters::new("ha.lan", 443, true, "t").unwrap();
        assert!(tls_connector(&verified).unwrap().is_none());
    }

    #[test]
    fn unverified_tls_gets_its_own_connector() {
        let relaxed = ConnectionParameters::new("ha.lan", 443, true, "t")
            .unwrap()
            .with_verify_tls(false);
        assert!(matches!(
            tls_connector(&relaxed).unwrap(),
            Some(Connector::NativeTls(_))
        ));

        // Verification only matters once TLS is on.
        let plain = ConnectionParameters::new("ha.lan", 8123, false, "t")
            .unwrap()
            .with_verify_tls(false);
        assert!(tls_connector(&plain).unwrap().is_none());
    }
}
