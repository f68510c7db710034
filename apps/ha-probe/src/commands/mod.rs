//! Subcommand bodies. Each returns the process exit code for a completed run;
//! setup and session failures come back as `DiagError`.

mod call_service;
mod http_check;
mod logs;
mod states;
mod toolchain;
mod ws_check;

use crate::cli::{Cli, Command, GlobalArgs};
use crate::credentials::{ConnectionParameters, CredentialResolver, EnvOverrides, SecretsFile};
use crate::error::DiagError;
use crate::header::HeaderSource;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

pub async fn run(cli: Cli) -> Result<u8, DiagError> {
    let global = cli.global;
    match cli.command {
        Command::Logs(args) => logs::run(&connection(&global)?, &args).await,
        Command::States(args) => states::run(&connection(&global)?, &args).await,
        Command::WsCheck => ws_check::run(&connection(&global)?).await,
        Command::HttpCheck(args) => http_check::run(&connection(&global)?, &args).await,
        Command::CallService(args) => call_service::run(&connection(&global)?, &args).await,
        Command::Build(args) => toolchain::build(&global, &args).await,
        Command::Flash(args) => toolchain::flash(&global, &args).await,
    }
}

/// Resolves credentials from the environment, the secrets file and the
/// firmware header, in that order.
pub fn connection(global: &GlobalArgs) -> Result<ConnectionParameters, DiagError> {
    let header = optional_file(
        global.config_header.as_deref(),
        &global.project_dir.join("main").join("config.h"),
    )
    .map(HeaderSource::load)
    .transpose()?;

    if let Some(path) = global.secrets.as_deref().filter(|path| !path.exists()) {
        return Err(DiagError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let secrets_path = optional_file(
        global.secrets.as_deref(),
        &global.project_dir.join("esphome").join("secrets.yaml"),
    );
    let secrets = match secrets_path {
        Some(path) => SecretsFile::load(path)?,
        None => None,
    };

    CredentialResolver::new(EnvOverrides::from_env())
        .with_secrets(secrets)
        .with_header(header)
        .resolve()
}

/// An explicit path must exist; a missing default path just drops that tier.
fn optional_file(explicit: Option<&Path>, default: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if default.is_file() => Some(default.to_path_buf()),
        None => {
            debug!(path = %default.display(), "default file absent, skipping tier");
            None
        }
    }
}

/// Resolves to `Ok(0)` with a notice when the user presses Ctrl-C first.
pub(crate) async fn interruptible<F>(work: F) -> Result<u8, DiagError>
where
    F: Future<Output = Result<u8, DiagError>>,
{
    tokio::select! {
        result = work => result,
        _ = crate::user_interrupt() => {
            println!();
            println!("interrupted by user");
            Ok(0)
        }
    }
}
