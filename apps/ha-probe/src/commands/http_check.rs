use super::interruptible;
use crate::cli::HttpCheckArgs;
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use crate::filter::{filter_lines, filter_states, tail, truncate, Keywords};
use crate::report;
use crate::session::{RestOutcome, RestSession};
use serde_json::{json, Value};

const ENTITY_PREVIEW: usize = 10;
const LOG_LINES: usize = 10;
const LOG_LINE_LEN: usize = 100;

pub async fn run(params: &ConnectionParameters, args: &HttpCheckArgs) -> Result<u8, DiagError> {
    let mut session = RestSession::new(params)?;
    let result = interruptible(check_all(&mut session, params, args)).await;
    session.close();
    result
}

async fn check_all(
    session: &mut RestSession,
    params: &ConnectionParameters,
    args: &HttpCheckArgs,
) -> Result<u8, DiagError> {
    report::print_banner("Home Assistant REST API check");
    println!("Server: {}", params.http_base_url());
    session.connect().await?;
    println!(
        "{}",
        report::ok(session.api_message().unwrap_or("API reachable"))
    );
    println!();

    let keywords = Keywords::new([args.keyword.as_str()]);
    let mut passed = Vec::new();

    report::print_step(1, "Server config");
    passed.push(conclude(check_config(session).await));

    report::print_step(2, &format!("Entities matching '{}'", args.keyword));
    passed.push(conclude(check_entities(session, &keywords).await));

    report::print_step(3, &format!("State of {}", args.entity));
    passed.push(conclude(check_entity(session, &args.entity).await));

    report::print_step(4, &format!("Error log lines matching '{}'", args.keyword));
    passed.push(conclude(check_error_log(session, &keywords).await));

    if let (Some(topic), Some(payload)) = (&args.publish_topic, &args.publish_payload) {
        report::print_step(5, &format!("MQTT publish to {topic}"));
        passed.push(conclude(check_publish(session, topic, payload).await));
    }

    let failed = passed.iter().filter(|ok| !**ok).count();
    println!("{}", report::rule());
    println!("{} of {} checks passed", passed.len() - failed, passed.len());
    Ok(if failed == 0 { 0 } else { 1 })
}

/// Prints a transport-level failure for one check; the run carries on.
fn conclude(result: Result<bool, DiagError>) -> bool {
    let passed = match result {
        Ok(passed) => passed,
        Err(err) => {
            println!("{}", report::fail(&err.to_string()));
            false
        }
    };
    println!();
    passed
}

fn report_failure<T>(outcome: &RestOutcome<T>) -> bool {
    if let Some(description) = outcome.describe_failure() {
        println!("{}", report::fail(&description));
    }
    false
}

async fn check_config(session: &RestSession) -> Result<bool, DiagError> {
    let outcome = session.config().await?;
    let config = match outcome {
        RestOutcome::Success(config) => config,
        failed => return Ok(report_failure(&failed)),
    };
    println!(
        "{}",
        report::ok(&format!(
            "Home Assistant {}",
            config.version.as_deref().unwrap_or("(unknown version)")
        ))
    );
    println!(
        "{}",
        report::detail(&format!(
            "location: {}",
            config.location_name.as_deref().unwrap_or("-")
        ))
    );
    println!(
        "{}",
        report::detail(&format!(
            "time zone: {}",
            config.time_zone.as_deref().unwrap_or("-")
        ))
    );
    Ok(true)
}

async fn check_entities(session: &RestSession, keywords: &Keywords) -> Result<bool, DiagError> {
    let outcome = session.states().await?;
    let states = match outcome {
        RestOutcome::Success(states) => states,
        failed => return Ok(report_failure(&failed)),
    };
    let matched = filter_states(&states, keywords);
    println!("{}", report::ok(&format!("{} matching entities", matched.len())));
    for state in matched.iter().take(ENTITY_PREVIEW) {
        println!("{}", report::detail(&report::format_state(state)));
    }
    Ok(true)
}

async fn check_entity(session: &RestSession, entity_id: &str) -> Result<bool, DiagError> {
    let outcome = session.state(entity_id).await?;
    match outcome {
        RestOutcome::Success(state) => {
            println!("{}", report::ok(&format!("state: {}", state.state)));
            let last_triggered = state
                .attribute("last_triggered")
                .and_then(Value::as_str)
                .unwrap_or("never");
            println!("{}", report::detail(&format!("last triggered: {last_triggered}")));
            let current = state.attribute("current").cloned().unwrap_or(json!(0));
            println!("{}", report::detail(&format!("current runs: {current}")));
            Ok(true)
        }
        RestOutcome::NotFound => {
            println!("{}", report::warn(&format!("{entity_id} does not exist")));
            Ok(false)
        }
        failed => Ok(report_failure(&failed)),
    }
}

async fn check_error_log(session: &RestSession, keywords: &Keywords) -> Result<bool, DiagError> {
    let outcome = session.error_log().await?;
    let text = match outcome {
        RestOutcome::Success(text) => text,
        failed => return Ok(report_failure(&failed)),
    };
    let matched = filter_lines(&text, keywords);
    println!(
        "{}",
        report::ok(&format!(
            "{} matching lines (last {LOG_LINES})",
            matched.len()
        ))
    );
    for line in tail(matched, LOG_LINES) {
        println!("{}", report::detail(&truncate(line, LOG_LINE_LEN)));
    }
    Ok(true)
}

async fn check_publish(
    session: &RestSession,
    topic: &str,
    payload: &str,
) -> Result<bool, DiagError> {
    let body = json!({ "topic": topic, "payload": payload });
    let outcome = session.call_service("mqtt", "publish", &body).await?;
    if outcome.is_success() {
        println!("{}", report::ok("message published"));
        Ok(true)
    } else {
        Ok(report_failure(&outcome))
    }
}
