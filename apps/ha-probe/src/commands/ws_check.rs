use super::interruptible;
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use crate::report;
use crate::session::{HandshakeTranscript, WsSession};
use serde_json::Value;

const PREVIEW_ENTRIES: usize = 3;
const PREVIEW_LEN: usize = 80;

pub async fn run(params: &ConnectionParameters) -> Result<u8, DiagError> {
    let mut session = WsSession::new();
    let result = interruptible(check(&mut session, params)).await;
    session.close().await;
    if session.was_opened() {
        println!("{}", report::step(5, "WebSocket closed"));
    }
    result
}

async fn check(session: &mut WsSession, params: &ConnectionParameters) -> Result<u8, DiagError> {
    report::print_banner("Home Assistant WebSocket check");
    println!("Connecting to: {}", params.websocket_url());
    println!("TLS verification: {}", params.use_tls() && params.verify_tls());
    println!();

    report::print_step(1, "Connecting and authenticating...");
    let connected = session.connect(params).await;
    print_transcript(session.transcript());
    if let Err(err) = connected {
        println!("{}", report::fail(&err.to_string()));
        return Err(err);
    }
    println!("{}", report::ok("authentication successful"));

    report::print_step(4, "Requesting system logs...");
    let response = session.list_logs().await?;
    if !response.success {
        println!("{}", report::fail(&response.failure_summary()));
        return Ok(1);
    }
    let entries = response.into_logs();
    println!("{}", report::ok(&format!("total logs: {}", entries.len())));
    for entry in entries.iter().take(PREVIEW_ENTRIES) {
        println!("{}", report::detail(&report::format_log_entry(entry, PREVIEW_LEN)));
    }
    Ok(0)
}

fn print_transcript(transcript: &HandshakeTranscript) {
    if !transcript.greeting.is_empty() {
        report::print_step(2, "Server greeting:");
        println!("{}", indent(&pretty(&transcript.greeting)));
    }
    if !transcript.verdict.is_empty() {
        report::print_step(3, "Auth result:");
        println!("{}", indent(&pretty(&transcript.verdict)));
    }
}

fn pretty(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn indent(text: &str) -> String {
    text.lines()
        .map(report::detail)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_frames_are_pretty_printed() {
        assert_eq!(
            pretty(r#"{"type":"auth_ok","ha_version":"2025.1.0"}"#),
            "{\n  \"ha_version\": \"2025.1.0\",\n  \"type\": \"auth_ok\"\n}"
        );
        assert_eq!(pretty("not json"), "not json");
    }
}
