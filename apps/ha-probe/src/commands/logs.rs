use super::interruptible;
use crate::cli::LogsArgs;
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use crate::filter::{Keywords, LogQuery, DEFAULT_LOG_KEYWORDS};
use crate::report;
use crate::session::WsSession;
use ha_wire::ResultPayload;

pub async fn run(params: &ConnectionParameters, args: &LogsArgs) -> Result<u8, DiagError> {
    let query = LogQuery {
        keywords: keywords(args),
        tail: args.tail,
        max_len: args.max_len,
    };
    let mut session = WsSession::new();
    let result = interruptible(fetch(&mut session, params, &query)).await;
    session.close().await;
    result
}

fn keywords(args: &LogsArgs) -> Keywords {
    if args.all {
        Keywords::default()
    } else if args.keywords.is_empty() {
        Keywords::new(DEFAULT_LOG_KEYWORDS)
    } else {
        Keywords::new(&args.keywords)
    }
}

async fn fetch(
    session: &mut WsSession,
    params: &ConnectionParameters,
    query: &LogQuery,
) -> Result<u8, DiagError> {
    report::print_banner("Home Assistant system log");
    println!("Server: {}", params.websocket_url());
    session.connect(params).await?;
    if let Some(version) = session.server_version() {
        println!("Home Assistant {version}");
    }

    let response = session.list_logs().await?;
    if !response.success {
        println!("{}", report::fail(&response.failure_summary()));
    }
    if let ResultPayload::Opaque(_) = response.payload {
        println!("{}", report::warn("log list not understood, nothing to show"));
    }
    let entries = response.into_logs();
    let kept = query.apply(&entries);
    let filter = if query.keywords.is_empty() {
        "no keyword filter".to_string()
    } else {
        format!("keywords: {}", query.keywords.as_slice().join(", "))
    };
    println!(
        "{} entries, {filter}; showing {} most recent matches",
        entries.len(),
        kept.len()
    );
    println!("{}", report::rule());
    report::print_log_entries(&kept, query.max_len);
    Ok(0)
}
