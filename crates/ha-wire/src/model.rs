use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity reported by the server's `system_log` integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    /// Anything a newer server may send that we do not know yet.
    Other(String),
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for LogLevel {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" | "FATAL" => LogLevel::Critical,
            _ => LogLevel::Other(raw),
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a `system_log/list` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, deserialize_with = "text_or_json")]
    pub name: String,
    /// Older servers send a string, newer ones a list of strings. Anything
    /// that is not a plain string is kept as its compact JSON text.
    #[serde(default, deserialize_with = "text_or_json")]
    pub message: String,
    #[serde(default, deserialize_with = "text_or_json")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text_or_json"
    )]
    pub first_occurred: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text_or_json"
    )]
    pub exception: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            name: name.into(),
            message: message.into(),
            timestamp: String::new(),
            source: None,
            count: None,
            first_occurred: None,
            exception: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}

/// One entity in a `get_states` / `GET /api/states` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    #[serde(default, deserialize_with = "text_or_json")]
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attribute("friendly_name").and_then(Value::as_str)
    }
}

/// Subset of `GET /api/config` the probe prints; the rest is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn render(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn text_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(render)
}

fn optional_text_or_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(render).filter(|text| !text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_entry_accepts_list_messages_and_numeric_timestamps() {
        let entry: LogEntry = serde_json::from_value(json!({
            "name": "homeassistant.components.mqtt",
            "message": ["first", "second"],
            "level": "WARNING",
            "timestamp": 1_700_000_000.5,
            "source": ["components/mqtt/client.py", 42],
            "count": 3,
            "first_occurred": 1_699_999_999.0,
            "exception": ""
        }))
        .unwrap();

        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.message, r#"["first","second"]"#);
        assert_eq!(entry.timestamp, "1700000000.5");
        assert_eq!(entry.count, Some(3));
        assert_eq!(entry.exception, None);
    }

    #[test]
    fn unknown_levels_are_preserved() {
        let entry: LogEntry = serde_json::from_value(json!({
            "level": "notice",
            "name": "x",
            "message": "y"
        }))
        .unwrap();
        assert_eq!(entry.level, LogLevel::Other("notice".into()));
        assert_eq!(entry.level.as_str(), "notice");
        assert_eq!(serde_json::to_value(&entry.level).unwrap(), json!("notice"));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let entry: LogEntry = serde_json::from_value(json!({})).unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert!(entry.name.is_empty());
        assert!(entry.message.is_empty());
    }

    #[test]
    fn entity_state_exposes_friendly_name() {
        let state: EntityState = serde_json::from_value(json!({
            "entity_id": "sensor.esp32p4_status",
            "state": "online",
            "attributes": { "friendly_name": "Voice Assistant Status" },
            "last_changed": "2026-01-02T03:04:05+00:00"
        }))
        .unwrap();
        assert_eq!(state.friendly_name(), Some("Voice Assistant Status"));
        assert_eq!(state.last_updated, None);
    }

    #[test]
    fn api_config_keeps_unknown_fields() {
        let config: ApiConfig = serde_json::from_value(json!({
            "version": "2025.1.0",
            "location_name": "Home",
            "time_zone": "Europe/Zagreb",
            "unit_system": { "length": "km" }
        }))
        .unwrap();
        assert_eq!(config.version.as_deref(), Some("2025.1.0"));
        assert!(config.extra.contains_key("unit_system"));
    }
}
