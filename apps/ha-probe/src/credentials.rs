//! Resolution of the Home Assistant endpoint and token.
//!
//! Every field is looked up in three tiers and the first non-empty value
//! wins: environment overrides, then `esphome/secrets.yaml`, then the
//! `HA_*` defines in the firmware's `main/config.h`.

use crate::error::DiagError;
use crate::header::HeaderSource;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use url::Url;

pub const ENV_BASE_URL: &str = "HOME_ASSISTANT_BASE_URL";
pub const ENV_TOKEN: &str = "HOME_ASSISTANT_TOKEN";
pub const ENV_VERIFY_SSL: &str = "HOME_ASSISTANT_VERIFY_SSL";

pub const SECRET_BASE_URL: &str = "home_assistant_base_url";
pub const SECRET_TOKEN: &str = "home_assistant_token";
pub const SECRET_VERIFY_SSL: &str = "home_assistant_verify_ssl";

pub const HEADER_HOST_SYMBOLS: [&str; 2] = ["HA_HOST", "HA_HOSTNAME"];
pub const HEADER_TOKEN: &str = "HA_TOKEN";
pub const HEADER_PORT: &str = "HA_PORT";
pub const HEADER_USE_SSL: &str = "HA_USE_SSL";
pub const HEADER_VERIFY_SSL: &str = "HA_VERIFY_SSL";

pub const DEFAULT_PORT: u16 = 8123;

/// Parses the usual yes/no spellings; anything else yields `default`.
pub fn to_bool(value: Option<&str>, default: bool) -> bool {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

/// Where a resolved field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Environment,
    SecretsFile,
    FirmwareHeader,
    Default,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Environment => "environment",
            Tier::SecretsFile => "secrets file",
            Tier::FirmwareHeader => "firmware header",
            Tier::Default => "default",
        })
    }
}

/// Everything needed to open one session. Immutable once resolved.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    host: String,
    port: u16,
    use_tls: bool,
    verify_tls: bool,
    token: String,
}

impl ConnectionParameters {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        use_tls: bool,
        token: impl Into<String>,
    ) -> Result<Self, DiagError> {
        let host = host.into().trim().to_string();
        let token = token.into().trim().to_string();
        let mut missing = Vec::new();
        if host.is_empty() {
            missing.push("host");
        }
        if token.is_empty() {
            missing.push("token");
        }
        if !missing.is_empty() {
            return Err(DiagError::MissingCredentials { missing });
        }
        if port == 0 {
            return Err(DiagError::Config("port must be in 1..=65535".into()));
        }
        Ok(Self {
            host,
            port,
            use_tls,
            verify_tls: true,
            token,
        })
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}{}",
            self.host_for_url(),
            self.port,
            ha_wire::WEBSOCKET_PATH
        )
    }

    pub fn http_base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host_for_url(), self.port)
    }

    fn host_for_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("verify_tls", &self.verify_tls)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Snapshot of the environment override tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub verify_ssl: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let pairs: BTreeMap<&str, &str> = pairs.into_iter().collect();
        Self::from_lookup(|name| pairs.get(name).map(|value| value.to_string()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            base_url: non_empty(lookup(ENV_BASE_URL)),
            token: non_empty(lookup(ENV_TOKEN)),
            verify_ssl: non_empty(lookup(ENV_VERIFY_SSL)),
        }
    }
}

/// Flat string view of the secrets YAML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretsFile {
    values: BTreeMap<String, String>,
}

impl SecretsFile {
    /// Returns `Ok(None)` when the file does not exist; the tier is optional.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, DiagError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(target: "ha_probe::credentials", path = %path.display(), "no secrets file");
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw).map(Some)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DiagError> {
        let document: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let mapping = match document {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => {
                return Err(DiagError::Config(
                    "secrets file must be a key/value mapping".into(),
                ))
            }
        };

        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                continue;
            };
            let text = match value {
                serde_yaml::Value::String(text) => text,
                serde_yaml::Value::Bool(flag) => flag.to_string(),
                serde_yaml::Value::Number(number) => number.to_string(),
                _ => continue,
            };
            values.insert(key.to_string(), text);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Host, port and scheme recovered from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

fn parse_base_url(raw: &str, origin: &str) -> Result<Endpoint, DiagError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|err| DiagError::Config(format!("invalid {origin} '{trimmed}': {err}")))?;
    let use_tls = match url.scheme() {
        "https" | "wss" => true,
        "http" | "ws" => false,
        other => {
            return Err(DiagError::Config(format!(
                "invalid {origin} '{trimmed}': unsupported scheme '{other}'"
            )))
        }
    };
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| DiagError::Config(format!("invalid {origin} '{trimmed}': missing host")))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .unwrap_or(if use_tls { 443 } else { 80 });
    Ok(Endpoint {
        host,
        port,
        use_tls,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first<T>(candidates: impl IntoIterator<Item = (Tier, Option<T>)>) -> Option<(Tier, T)> {
    candidates
        .into_iter()
        .find_map(|(tier, value)| value.map(|value| (tier, value)))
}

/// The three credential tiers, consulted in priority order.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    env: EnvOverrides,
    secrets: Option<SecretsFile>,
    header: Option<HeaderSource>,
}

impl CredentialResolver {
    pub fn new(env: EnvOverrides) -> Self {
        Self {
            env,
            secrets: None,
            header: None,
        }
    }

    pub fn with_secrets(mut self, secrets: Option<SecretsFile>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_header(mut self, header: Option<HeaderSource>) -> Self {
        self.header = header;
        self
    }

    pub fn resolve(&self) -> Result<ConnectionParameters, DiagError> {
        let env_endpoint = self
            .env
            .base_url
            .as_deref()
            .map(|raw| parse_base_url(raw, ENV_BASE_URL))
            .transpose()?;
        let secrets_endpoint = self
            .secret(SECRET_BASE_URL)
            .map(|raw| parse_base_url(raw, &format!("{SECRET_BASE_URL} in secrets file")))
            .transpose()?;
        let header = self.header.as_ref();

        let host = first([
            (Tier::Environment, env_endpoint.as_ref().map(|e| e.host.clone())),
            (
                Tier::SecretsFile,
                secrets_endpoint.as_ref().map(|e| e.host.clone()),
            ),
            (
                Tier::FirmwareHeader,
                header.and_then(|h| h.extract_first_string(&HEADER_HOST_SYMBOLS)),
            ),
        ]);

        let token = first([
            (Tier::Environment, self.env.token.clone()),
            (
                Tier::SecretsFile,
                self.secret(SECRET_TOKEN).map(str::to_string),
            ),
            (
                Tier::FirmwareHeader,
                non_empty(header.and_then(|h| h.extract_string(HEADER_TOKEN))),
            ),
        ]);

        let (host_tier, host, token_tier, token) = match (host, token) {
            (Some((host_tier, host)), Some((token_tier, token))) => {
                (host_tier, host, token_tier, token)
            }
            (host, token) => {
                let mut missing = Vec::new();
                if host.is_none() {
                    missing.push("host");
                }
                if token.is_none() {
                    missing.push("token");
                }
                return Err(DiagError::MissingCredentials { missing });
            }
        };

        let header_port = header.and_then(|h| h.extract_int(HEADER_PORT)).and_then(|port| {
            match u16::try_from(port) {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    tracing::warn!(target: "ha_probe::credentials", port, "ignoring out-of-range {HEADER_PORT}");
                    None
                }
            }
        });
        let (port_tier, port) = first([
            (Tier::Environment, env_endpoint.as_ref().map(|e| e.port)),
            (Tier::SecretsFile, secrets_endpoint.as_ref().map(|e| e.port)),
            (Tier::FirmwareHeader, header_port),
            (Tier::Default, Some(DEFAULT_PORT)),
        ])
        .unwrap_or((Tier::Default, DEFAULT_PORT));

        let (_, use_tls) = first([
            (Tier::Environment, env_endpoint.as_ref().map(|e| e.use_tls)),
            (
                Tier::SecretsFile,
                secrets_endpoint.as_ref().map(|e| e.use_tls),
            ),
            (
                Tier::FirmwareHeader,
                header.and_then(|h| h.extract_bool(HEADER_USE_SSL)),
            ),
            (Tier::Default, Some(false)),
        ])
        .unwrap_or((Tier::Default, false));

        let (verify_tier, verify_tls) = first([
            (
                Tier::Environment,
                self.env
                    .verify_ssl
                    .as_deref()
                    .map(|raw| to_bool(Some(raw), true)),
            ),
            (
                Tier::SecretsFile,
                self.secret(SECRET_VERIFY_SSL)
                    .map(|raw| to_bool(Some(raw), true)),
            ),
            (
                Tier::FirmwareHeader,
                header.and_then(|h| h.extract_bool(HEADER_VERIFY_SSL)),
            ),
            (Tier::Default, Some(true)),
        ])
        .unwrap_or((Tier::Default, true));

        tracing::info!(
            target: "ha_probe::credentials",
            host = %host,
            host_from = %host_tier,
            port,
            port_from = %port_tier,
            use_tls,
            verify_tls,
            verify_from = %verify_tier,
            token_from = %token_tier,
            "resolved connection parameters"
        );

        Ok(ConnectionParameters::new(host, port, use_tls, token)?.with_verify_tls(verify_tls))
    }

    fn secret(&self, key: &str) -> Option<&str> {
        self.secrets.as_ref().and_then(|secrets| secrets.get(key))
    }
}
