use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use ha_probe::{ConnectionParameters, DiagError, SessionState, WsSession};
use ha_wire::{LogLevel, Query, RequestKind};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const TOKEN: &str = "good-token";

#[derive(Clone, Copy)]
enum Behaviour {
    Normal,
    WrongGreeting,
    HangUpOnRequest,
}

#[derive(Clone)]
struct Double {
    behaviour: Behaviour,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn upgrade(ws: WebSocketUpgrade, State(double): State<Double>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, double))
}

async fn send(socket: &mut WebSocket, value: Value) {
    socket
        .send(WsMessage::Text(value.to_string()))
        .await
        .expect("send frame");
}

async fn recv(socket: &mut WebSocket) -> Option<Value> {
    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

async fn serve(mut socket: WebSocket, double: Double) {
    if let Behaviour::WrongGreeting = double.behaviour {
        send(&mut socket, json!({ "type": "hello" })).await;
        return;
    }
    send(
        &mut socket,
        json!({ "type": "auth_required", "ha_version": "2025.1.0" }),
    )
    .await;

    let Some(auth) = recv(&mut socket).await else {
        return;
    };
    double.received.lock().unwrap().push(auth.clone());
    if auth["access_token"] != TOKEN {
        send(
            &mut socket,
            json!({ "type": "auth_invalid", "message": "Invalid access token or password" }),
        )
        .await;
        return;
    }
    send(&mut socket, json!({ "type": "auth_ok", "ha_version": "2025.1.0" })).await;

    while let Some(request) = recv(&mut socket).await {
        double.received.lock().unwrap().push(request.clone());
        if let Behaviour::HangUpOnRequest = double.behaviour {
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
        let id = request["id"].as_u64().unwrap_or_default();
        match request["type"].as_str() {
            Some("system_log/list") => {
                send(&mut socket, json!({ "id": id, "type": "event", "event": {} })).await;
                send(
                    &mut socket,
                    json!({ "id": id + 100, "type": "result", "success": true, "result": [] }),
                )
                .await;
                send(&mut socket, json!({ "type": "pong" })).await;
                send(
                    &mut socket,
                    json!({
                        "id": id,
                        "type": "result",
                        "success": true,
                        "result": [
                            {
                                "name": "homeassistant.components.esphome",
                                "message": ["esp32p4 disconnected", "esp32p4 disconnected"],
                                "level": "WARNING",
                                "timestamp": 1735689600.5,
                                "count": 2
                            },
                            {
                                "name": "homeassistant.components.mqtt",
                                "message": "broker ok",
                                "level": "INFO",
                                "timestamp": 1735689601.0
                            }
                        ]
                    }),
                )
                .await;
            }
            Some("get_states") => {
                send(
                    &mut socket,
                    json!({
                        "id": id,
                        "type": "result",
                        "success": true,
                        "result": [
                            { "entity_id": "sensor.esp32p4_wifi", "state": "-61", "attributes": { "friendly_name": "Wi-Fi" } },
                            { "entity_id": "light.kitchen", "state": "on", "attributes": {} }
                        ]
                    }),
                )
                .await;
            }
            _ => {
                send(
                    &mut socket,
                    json!({
                        "id": id,
                        "type": "result",
                        "success": false,
                        "error": { "code": "not_found", "message": "Service not found." }
                    }),
                )
                .await;
            }
        }
    }
}

async fn spawn_double(behaviour: Behaviour) -> (SocketAddr, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/api/websocket", get(upgrade))
        .with_state(Double {
            behaviour,
            received: received.clone(),
        });
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind websocket double");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    (addr, received)
}

fn params(addr: SocketAddr, token: &str) -> ConnectionParameters {
    ConnectionParameters::new(addr.ip().to_string(), addr.port(), false, token).unwrap()
}

#[test_timeout::timeout(20)]
async fn authenticates_and_matches_replies_by_id() {
    let (addr, received) = spawn_double(Behaviour::Normal).await;
    let mut session = WsSession::new();
    session.connect(&params(addr, TOKEN)).await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(session.was_opened());
    assert_eq!(session.server_version(), Some("2025.1.0"));
    assert!(session.transcript().greeting.contains("auth_required"));

    let logs = session.list_logs().await.unwrap();
    assert_eq!(logs.id, 1);
    assert_eq!(logs.kind, RequestKind::ListLogs);
    assert!(logs.success);
    let entries = logs.into_logs();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, LogLevel::Warning);
    assert_eq!(
        entries[0].message,
        r#"["esp32p4 disconnected","esp32p4 disconnected"]"#
    );
    assert_eq!(entries[0].count, Some(2));
    assert_eq!(entries[1].message, "broker ok");

    let states = session.get_states().await.unwrap();
    assert_eq!(states.id, 2);
    let states = states.into_states();
    assert_eq!(states[0].friendly_name(), Some("Wi-Fi"));

    let call = session
        .call_service("light", "turn_on", Some(json!({ "entity_id": "light.kitchen" })))
        .await
        .unwrap();
    assert_eq!(call.id, 3);
    assert!(!call.success);
    assert_eq!(call.error.as_ref().map(|e| e.code.as_str()), Some("not_found"));
    assert_eq!(session.state(), SessionState::Authenticated);

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);

    let received = received.lock().unwrap().clone();
    assert_eq!(received[0], json!({ "type": "auth", "access_token": TOKEN }));
    let ids: Vec<_> = received[1..].iter().map(|r| r["id"].as_u64()).collect();
    assert_eq!(ids, [Some(1_u64), Some(2), Some(3)]);
    assert_eq!(received[3]["service_data"]["entity_id"], "light.kitchen");
}

#[test_timeout::timeout(20)]
async fn rejected_token_closes_session() {
    let (addr, _) = spawn_double(Behaviour::Normal).await;
    let mut session = WsSession::new();
    match session.connect(&params(addr, "stale-token")).await {
        Err(DiagError::AuthenticationFailed { payload }) => {
            assert!(payload.contains("auth_invalid"));
            assert!(payload.contains("Invalid access token"));
        }
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.was_opened());

    match session.request(Query::ListLogs).await {
        Err(DiagError::InvalidState { actual, .. }) => assert_eq!(actual, SessionState::Closed),
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test_timeout::timeout(20)]
async fn unexpected_greeting_fails_authentication() {
    let (addr, _) = spawn_double(Behaviour::WrongGreeting).await;
    let mut session = WsSession::new();
    let err = session.connect(&params(addr, TOKEN)).await.unwrap_err();
    match err {
        DiagError::AuthenticationFailed { payload } => assert!(payload.contains("hello")),
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[test_timeout::timeout(20)]
async fn hang_up_mid_request_is_transport_error() {
    let (addr, _) = spawn_double(Behaviour::HangUpOnRequest).await;
    let mut session = WsSession::new();
    session.connect(&params(addr, TOKEN)).await.unwrap();
    let err = session.list_logs().await.unwrap_err();
    assert!(matches!(err, DiagError::Transport(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Closed);
}

#[test_timeout::timeout(20)]
async fn unreachable_server_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let mut session = WsSession::new();
    let err = session.connect(&params(addr, TOKEN)).await.unwrap_err();
    assert!(matches!(err, DiagError::Transport(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.was_opened());
}
