//! Diagnostic logging for the probe itself (not the Home Assistant logs it
//! fetches). Output goes to stderr unless `--log-file` is given, so stdout
//! stays reserved for the report.

use crate::credentials::to_bool;
use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FILTER: &str = "HA_PROBE_LOG_FILTER";
pub const ENV_TRACE_DEPS: &str = "HA_PROBE_TRACE_DEPS";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            Verbosity::Error => LevelFilter::ERROR,
            Verbosity::Warn => LevelFilter::WARN,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: Verbosity,
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if INIT.get().is_some() {
        return Ok(());
    }
    install(config)?;
    INIT.set(()).ok();
    Ok(())
}

fn install(config: &LogConfig) -> Result<(), InitError> {
    let overridden = std::env::var(ENV_LOG_FILTER)
        .ok()
        .filter(|value| !value.trim().is_empty());
    let trace_deps = to_bool(std::env::var(ENV_TRACE_DEPS).ok().as_deref(), false);
    let (filter, throttled) = match overridden {
        Some(filter) => (filter, false),
        None => default_filter(config.level.to_filter(), trace_deps),
    };

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(config.level >= Verbosity::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;

    let _ = GUARD.set(guard);
    if throttled {
        tracing::debug!("dependency traces capped at info; set {ENV_TRACE_DEPS}=1 to lift");
    }
    Ok(())
}

const TRACE_DEP_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "tokio_tungstenite",
    "tungstenite",
    "reqwest",
    "rustls",
    "native_tls",
    "mio",
    "h2",
];

/// Filter string for a level, and whether dependency targets were capped.
fn default_filter(level: LevelFilter, trace_deps: bool) -> (String, bool) {
    let base = match level {
        LevelFilter::TRACE => "info,ha_probe=trace,ha_wire=trace".to_string(),
        LevelFilter::DEBUG => "info,ha_probe=debug,ha_wire=debug".to_string(),
        other => other.to_string().to_lowercase(),
    };
    if level != LevelFilter::TRACE || trace_deps {
        return (base, false);
    }
    let mut filter = base;
    for target in TRACE_DEP_TARGETS {
        filter.push_str(&format!(",{target}=info"));
    }
    (filter, true)
}
