use super::interruptible;
use crate::cli::CallServiceArgs;
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use crate::report;
use crate::session::WsSession;
use ha_wire::ResultPayload;
use serde_json::Value;

pub async fn run(params: &ConnectionParameters, args: &CallServiceArgs) -> Result<u8, DiagError> {
    let data = service_data(args.data.as_deref())?;
    let mut session = WsSession::new();
    let result = interruptible(call(&mut session, params, args, data)).await;
    session.close().await;
    result
}

/// `--data` must be a JSON object when given.
fn service_data(raw: Option<&str>) -> Result<Option<Value>, DiagError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| DiagError::Config(format!("--data is not valid JSON: {err}")))?;
    if !value.is_object() {
        return Err(DiagError::Config("--data must be a JSON object".into()));
    }
    Ok(Some(value))
}

async fn call(
    session: &mut WsSession,
    params: &ConnectionParameters,
    args: &CallServiceArgs,
    data: Option<Value>,
) -> Result<u8, DiagError> {
    session.connect(params).await?;
    let response = session
        .call_service(args.domain.as_str(), args.service.as_str(), data)
        .await?;
    if !response.success {
        println!("{}", report::fail(&response.failure_summary()));
        return Ok(1);
    }
    println!(
        "{}",
        report::ok(&format!("{}.{} called", args.domain, args.service))
    );
    if let ResultPayload::Opaque(value) = &response.payload {
        let rendered = serde_json::to_string_pretty(value)?;
        for line in rendered.lines() {
            println!("{}", report::detail(line));
        }
    }
    Ok(0)
}
