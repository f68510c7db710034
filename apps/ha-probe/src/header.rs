//! Narrow scanner for `#define` constants in the firmware's `config.h`.
//!
//! Only single-line definitions are recognized: `#define NAME "text"`,
//! `#define NAME 8123` and `#define NAME true`, each optionally followed by a
//! `//` comment. Multi-line or macro-expanded values are not evaluated; a
//! symbol that does not match one of those forms is simply absent.

use crate::error::DiagError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct HeaderSource {
    path: Option<PathBuf>,
    text: String,
}

impl HeaderSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DiagError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DiagError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            path: None,
            text: text.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn extract_string(&self, name: &str) -> Option<String> {
        capture(&self.text, name, r#""([^"\r\n]*)""#).map(|value| value.trim().to_string())
    }

    pub fn extract_int(&self, name: &str) -> Option<i64> {
        capture(&self.text, name, "([0-9]+)")?.parse().ok()
    }

    pub fn extract_bool(&self, name: &str) -> Option<bool> {
        let literal = capture(&self.text, name, "([01]|(?i:true|false))")?;
        match literal.to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }

    /// First non-empty string among `names`, in order.
    pub fn extract_first_string(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.extract_string(name))
            .find(|value| !value.is_empty())
    }
}

fn capture(text: &str, name: &str, value_pattern: &str) -> Option<String> {
    let pattern = format!(
        r"(?m)^[ \t]*#[ \t]*define[ \t]+{}[ \t]+{}[ \t]*(?://.*)?\r?$",
        regex::escape(name),
        value_pattern
    );
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(err) => {
            tracing::warn!(target: "ha_probe::header", symbol = name, error = %err, "invalid symbol pattern");
            return None;
        }
    };
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r##"
#pragma once

// Home Assistant connection
#define HA_HOSTNAME "  homeassistant.local  "   // mDNS name
#define HA_PORT 8123
#  define HA_USE_SSL TRUE // self-signed
#define HA_TOKEN "eyJ0eXAi.test"
#define HA_TIMEOUT_MS (5 * 1000)
#define WIFI_SSID_LEGACY "unterminated
    /* #define HA_HOST "commented.example" */
static const char *doc = "#define HA_HOST \"not.a.define\"";
#define HA_DEBUG 0
"##;

    #[test]
    fn extracts_string_with_comment_and_whitespace() {
        let header = HeaderSource::from_text(SAMPLE);
        assert_eq!(
            header.extract_string("HA_HOSTNAME").as_deref(),
            Some("homeassistant.local")
        );
        assert_eq!(header.extract_string("HA_TOKEN").as_deref(), Some("eyJ0eXAi.test"));
    }

    #[test]
    fn extracts_int_and_bool() {
        let header = HeaderSource::from_text(SAMPLE);
        assert_eq!(header.extract_int("HA_PORT"), Some(8123));
        assert_eq!(header.extract_bool("HA_USE_SSL"), Some(true));
        assert_eq!(header.extract_bool("HA_DEBUG"), Some(false));
    }

    #[test]
    fn malformed_or_embedded_definitions_are_absent() {
        let header = HeaderSource::from_text(SAMPLE);
        assert_eq!(header.extract_string("HA_HOST"), None);
        assert_eq!(header.extract_int("HA_TIMEOUT_MS"), None);
        assert_eq!(header.extract_string("WIFI_SSID_LEGACY"), None);
        assert_eq!(header.extract_int("HA_TOKEN"), None);
        assert_eq!(header.extract_bool("HA_PORT"), None);
        assert_eq!(header.extract_string("NOT_DEFINED"), None);
    }

    #[test]
    fn symbol_names_match_whole_words_only() {
        let header = HeaderSource::from_text("#define HA_PORT_FALLBACK 80\n#define HA_PORT 443\n");
        assert_eq!(header.extract_int("HA_PORT"), Some(443));
        assert_eq!(header.extract_int("HA_POR"), None);
    }

    #[test]
    fn first_definition_wins_and_crlf_is_accepted() {
        let header = HeaderSource::from_text("#define HA_TOKEN \"a\"\r\n#define HA_TOKEN \"b\"\r\n");
        assert_eq!(header.extract_string("HA_TOKEN").as_deref(), Some("a"));
    }

    #[test]
    fn first_string_skips_empty_values() {
        let header = HeaderSource::from_text("#define HA_HOST \"\"\n#define HA_HOSTNAME \"ha.lan\"\n");
        assert_eq!(
            header.extract_first_string(&["HA_HOST", "HA_HOSTNAME"]).as_deref(),
            Some("ha.lan")
        );
    }

    #[test]
    fn overflowing_integers_are_absent() {
        let header = HeaderSource::from_text("#define HUGE 99999999999999999999999\n");
        assert_eq!(header.extract_int("HUGE"), None);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.h");
        match HeaderSource::load(&missing) {
            Err(DiagError::FileNotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#define HA_PORT 8443").unwrap();
        let header = HeaderSource::load(file.path()).unwrap();
        assert_eq!(header.extract_int("HA_PORT"), Some(8443));
        assert_eq!(header.path(), Some(file.path()));
    }
}
