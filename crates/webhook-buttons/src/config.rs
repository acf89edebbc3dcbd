//! Persisted key/value configuration.
//!
//! A record is stored as text: a `v1` header line, then one `key<TAB>value`
//! line per entry with `\\`, `\t`, `\n` and `\r` escaped.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;

const RECORD_VERSION: &str = "v1";

/// Config store error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config IO error: {}", msg),
            ConfigError::Malformed(msg) => write!(f, "malformed config: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Flat string map read from or written to a [`ConfigStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRecord {
    entries: BTreeMap<String, String>,
}

impl ConfigRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, or `default` when the key is absent.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| String::from(default))
    }

    pub fn put(&mut self, key: &str, value: &str) {
        self.entries.insert(String::from(key), String::from(value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the versioned text format.
    pub fn to_text(&self) -> String {
        let mut out = String::from(RECORD_VERSION);
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(&escape_field(key));
            out.push('\t');
            out.push_str(&escape_field(value));
            out.push('\n');
        }
        out
    }

    /// Parse the versioned text format.
    ///
    /// Empty input is an empty record. Lines without a tab are skipped.
    pub fn from_text(raw: &str) -> Result<Self, ConfigError> {
        let mut record = Self::new();
        let mut lines = raw.lines();
        match lines.next() {
            None => return Ok(record),
            Some(RECORD_VERSION) => {}
            Some(other) => {
                return Err(ConfigError::Malformed(alloc::format!(
                    "unsupported version header {:?}",
                    other
                )))
            }
        }
        for line in lines {
            let Some((key, value)) = line.split_once('\t') else {
                continue;
            };
            record
                .entries
                .insert(unescape_field(key), unescape_field(value));
        }
        Ok(record)
    }
}

fn escape_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Backing storage for a whole configuration record.
///
/// Implementations:
/// - `FileConfigStore` in the firmware (SPIFFS file)
/// - [`MemoryConfigStore`] for tests and simulators
pub trait ConfigStore {
    /// Load the stored record. A store that was never written loads empty.
    fn load(&mut self) -> Result<ConfigRecord, ConfigError>;

    /// Replace the stored record.
    fn save(&mut self, record: &ConfigRecord) -> Result<(), ConfigError>;
}

/// In-memory store that keeps the serialized text, like a file would.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    text: Option<String>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted text.
    pub fn with_text(text: &str) -> Self {
        Self {
            text: Some(String::from(text)),
            ..Self::default()
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    /// Make subsequent saves fail with an IO error.
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&mut self) -> Result<ConfigRecord, ConfigError> {
        match &self.text {
            Some(text) => ConfigRecord::from_text(text),
            None => Ok(ConfigRecord::new()),
        }
    }

    fn save(&mut self, record: &ConfigRecord) -> Result<(), ConfigError> {
        if self.fail_saves {
            return Err(ConfigError::Io(String::from("store is read-only")));
        }
        self.text = Some(record.to_text());
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_uses_default() {
        let record = ConfigRecord::new();
        assert_eq!(record.get("button1url", ""), "");
        assert_eq!(record.get("button1url", "x"), "x");
    }

    #[test]
    fn text_roundtrip_escapes_separators() {
        let mut record = ConfigRecord::new();
        record.put("button1url", "http://h/on");
        record.put("button1rootCA", "-----BEGIN\nline\t2\\end\r");
        record.put("button1token", "");

        let text = record.to_text();
        assert!(text.starts_with("v1\n"));
        assert_eq!(text.lines().count(), 4);

        let parsed = ConfigRecord::from_text(&text).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn empty_text_is_empty_record() {
        assert!(ConfigRecord::from_text("").unwrap().is_empty());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = ConfigRecord::from_text("v9\na\tb\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn lines_without_tab_are_skipped() {
        let parsed = ConfigRecord::from_text("v1\ngarbage\nk\tv\n").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("k", ""), "v");
    }

    #[test]
    fn memory_store_counts_saves() {
        let mut store = MemoryConfigStore::new();
        assert!(store.load().unwrap().is_empty());

        let mut record = ConfigRecord::new();
        record.put("a", "1");
        store.save(&record).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap(), record);

        store.set_fail_saves(true);
        assert!(store.save(&record).is_err());
        assert_eq!(store.save_count(), 1);
    }
}
