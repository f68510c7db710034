use anyhow::Context;
use clap::Parser;
use ha_probe::cli::Cli;
use ha_probe::{commands, telemetry, DiagError};
use std::process::ExitCode;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<DiagError>() {
                Some(diag) => {
                    if let Some(hint) = diag.guidance() {
                        eprintln!("{hint}");
                    }
                    ExitCode::from(diag.exit_code())
                }
                None => ExitCode::FAILURE,
            }
        }
    }
}

fn try_main() -> anyhow::Result<u8> {
    // `.env` has to land in the process environment before clap reads `env =` args.
    if let Some(problem) = dotenv_problem(dotenvy::dotenv()) {
        eprintln!("warning: ignoring .env: {problem}");
    }
    let cli = Cli::parse();

    if let Err(err) = telemetry::init(&cli.global.log_config()) {
        eprintln!("warning: logging disabled: {err}");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    Ok(runtime.block_on(commands::run(cli))?)
}

/// A missing `.env` is normal; anything else is worth telling the user about.
fn dotenv_problem<T>(loaded: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    match loaded {
        Ok(_) => None,
        Err(err) if err.not_found() => None,
        Err(err) => Some(err),
    }
}
