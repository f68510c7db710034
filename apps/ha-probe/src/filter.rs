//! Keyword filtering and trimming of query results before they are printed.

use ha_wire::{EntityState, LogEntry};

pub const DEFAULT_LOG_KEYWORDS: [&str; 5] = ["esp32", "mqtt", "websocket", "assist", "tts"];
pub const DEFAULT_STATE_KEYWORDS: [&str; 3] = ["voice_assistant", "esp32p4", "esp32_p4"];
pub const DEFAULT_TAIL: usize = 12;
pub const DEFAULT_MAX_LEN: usize = 240;

/// Lower-cased, trimmed keywords. Blank keywords are dropped; an empty set
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords(Vec<String>);

impl Keywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True when any keyword occurs in any of `fields`, ignoring case.
    pub fn matches_any<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        if self.0.is_empty() {
            return true;
        }
        fields.into_iter().any(|field| {
            let field = field.to_lowercase();
            self.0.iter().any(|keyword| field.contains(keyword.as_str()))
        })
    }
}

/// How `logs` narrows a `system_log/list` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub keywords: Keywords,
    pub tail: usize,
    pub max_len: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            keywords: Keywords::new(DEFAULT_LOG_KEYWORDS),
            tail: DEFAULT_TAIL,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl LogQuery {
    /// Filter, then keep the most recent `tail` entries.
    pub fn apply(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        tail(filter_logs(entries, &self.keywords), self.tail)
    }
}

pub fn filter_logs(entries: &[LogEntry], keywords: &Keywords) -> Vec<LogEntry> {
    entries
        .iter()
        .filter(|entry| {
            keywords.matches_any([entry.level.as_str(), entry.name.as_str(), entry.message.as_str()])
        })
        .cloned()
        .collect()
}

/// Entities whose id contains a keyword, sorted by id.
pub fn filter_states(states: &[EntityState], keywords: &Keywords) -> Vec<EntityState> {
    let mut matched: Vec<EntityState> = states
        .iter()
        .filter(|state| keywords.matches_any([state.entity_id.as_str()]))
        .cloned()
        .collect();
    matched.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    matched
}

/// Lines of a plain-text log that mention a keyword.
pub fn filter_lines<'a>(text: &'a str, keywords: &Keywords) -> Vec<&'a str> {
    text.lines()
        .filter(|line| keywords.matches_any([*line]))
        .collect()
}

pub fn tail<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    if items.len() > n {
        items.drain(..items.len() - n);
    }
    items
}

/// First `max_len` characters plus `...` when the text is longer.
pub fn truncate(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn one_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
