use crate::filter::{DEFAULT_MAX_LEN, DEFAULT_TAIL};
use crate::telemetry::{LogConfig, Verbosity};
use crate::toolchain::{DEFAULT_COM_PORT, ENV_COM_PORT, ENV_IDF_PATH, ENV_PROJECT_DIR};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_ENTITY: &str = "automation.esp32s3_full_voice_assistant_stt_ai_tts";
pub const DEFAULT_HTTP_KEYWORD: &str = "esp32";

#[derive(Parser, Debug)]
#[command(name = "ha-probe", version)]
#[command(about = "Home Assistant diagnostics and ESP-IDF wrappers for the ESP32-P4 voice assistant")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Firmware project root
    #[arg(long, global = true, env = ENV_PROJECT_DIR, default_value = ".")]
    pub project_dir: PathBuf,

    /// Firmware config header [default: <project-dir>/main/config.h]
    #[arg(long, global = true)]
    pub config_header: Option<PathBuf>,

    /// ESPHome secrets file [default: <project-dir>/esphome/secrets.yaml]
    #[arg(long, global = true)]
    pub secrets: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = Verbosity::Warn)]
    pub log_level: Verbosity,

    /// Write diagnostic logs here instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the server's system log over the WebSocket API and filter it
    Logs(LogsArgs),

    /// List entity states over the WebSocket API, filtered by entity id
    States(StatesArgs),

    /// Walk through the WebSocket handshake step by step
    WsCheck,

    /// Run the REST API checks
    HttpCheck(HttpCheckArgs),

    /// Call a service over the WebSocket API
    CallService(CallServiceArgs),

    /// Run `idf.py build` in the project directory
    Build(ToolchainArgs),

    /// Run `idf.py -p <port> flash monitor` in the project directory
    Flash(FlashArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Keep entries mentioning this keyword (repeatable) [default: esp32 mqtt websocket assist tts]
    #[arg(short = 'k', long = "keyword")]
    pub keywords: Vec<String>,

    /// Show every entry, ignoring keywords
    #[arg(long, conflicts_with = "keywords")]
    pub all: bool,

    /// Number of most recent matches to show
    #[arg(long, default_value_t = DEFAULT_TAIL)]
    pub tail: usize,

    /// Truncate messages to this many characters
    #[arg(long, default_value_t = DEFAULT_MAX_LEN)]
    pub max_len: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatesArgs {
    /// Keep entities whose id contains this keyword (repeatable) [default: voice_assistant esp32p4 esp32_p4]
    #[arg(short = 'k', long = "keyword")]
    pub keywords: Vec<String>,

    #[arg(long, conflicts_with = "keywords")]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HttpCheckArgs {
    /// Entity fetched by the single-state check
    #[arg(long, default_value = DEFAULT_ENTITY)]
    pub entity: String,

    /// Keyword for the entity and error-log checks
    #[arg(long, default_value = DEFAULT_HTTP_KEYWORD)]
    pub keyword: String,

    /// Publish a test message through `mqtt.publish` to this topic
    #[arg(long, requires = "publish_payload")]
    pub publish_topic: Option<String>,

    #[arg(long, requires = "publish_topic")]
    pub publish_payload: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CallServiceArgs {
    pub domain: String,
    pub service: String,

    /// Service data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ToolchainArgs {
    /// ESP-IDF installation root
    #[arg(long, env = ENV_IDF_PATH)]
    pub idf_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FlashArgs {
    #[command(flatten)]
    pub toolchain: ToolchainArgs,

    /// Serial port of the board
    #[arg(long, env = ENV_COM_PORT, default_value = DEFAULT_COM_PORT)]
    pub port: String,
}
