use super::interruptible;
use crate::cli::StatesArgs;
use crate::credentials::ConnectionParameters;
use crate::error::DiagError;
use crate::filter::{filter_states, Keywords, DEFAULT_STATE_KEYWORDS};
use crate::report;
use crate::session::WsSession;
use ha_wire::ResultPayload;

pub async fn run(params: &ConnectionParameters, args: &StatesArgs) -> Result<u8, DiagError> {
    let keywords = if args.all {
        Keywords::default()
    } else if args.keywords.is_empty() {
        Keywords::new(DEFAULT_STATE_KEYWORDS)
    } else {
        Keywords::new(&args.keywords)
    };
    let mut session = WsSession::new();
    let result = interruptible(fetch(&mut session, params, &keywords)).await;
    session.close().await;
    result
}

async fn fetch(
    session: &mut WsSession,
    params: &ConnectionParameters,
    keywords: &Keywords,
) -> Result<u8, DiagError> {
    report::print_banner("Home Assistant entity states");
    println!("Server: {}", params.websocket_url());
    session.connect(params).await?;

    let response = session.get_states().await?;
    if !response.success {
        println!("{}", report::fail(&response.failure_summary()));
    }
    if let ResultPayload::Opaque(_) = response.payload {
        println!("{}", report::warn("state list not understood, nothing to show"));
    }
    let states = response.into_states();
    let matched = filter_states(&states, keywords);
    println!("{} of {} entities match", matched.len(), states.len());
    println!("{}", report::rule());
    report::print_states(&matched);
    Ok(0)
}
