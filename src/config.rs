// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Feed and connection configuration.

use crate::difference::DiffDisplay;
use crate::error::{FeedError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Location of the connection file, relative to the home directory
pub const CONNECTION_FILE: &str = ".config/quakesrdisplay/connection.conf";

/// Broker connection settings as stored in `connection.conf`.
///
/// The transport itself is not part of this crate; only `basetopic` is
/// used here, the remaining fields are handed to whoever owns the
/// connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub broker: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    #[serde(rename = "basetopic")]
    pub base_topic: String,
}

// The file written by older tools stores the port as a string (possibly empty).
fn port_from_any<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid port {}", n))),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", s))),
        other => Err(D::Error::custom(format!("invalid port {}", other))),
    }
}

impl ConnectionConfig {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// `$HOME/.config/quakesrdisplay/connection.conf`, if `HOME` is set
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONNECTION_FILE))
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Feed settings for this connection
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig::new(&self.base_topic)
    }
}

/// Settings of the feed core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Prefix of every topic; normalized to end with `/`
    pub base_topic: String,
    /// Accumulate running averages from the start
    pub running_average: bool,
    /// Presentation of the difference channels
    pub diff_display: DiffDisplay,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_topic: String::new(),
            running_average: true,
            diff_display: DiffDisplay::Absolute,
        }
    }
}

impl FeedConfig {
    /// Create with a base topic (normalized)
    pub fn new(base_topic: &str) -> Self {
        Self {
            base_topic: normalize_base_topic(base_topic),
            ..Default::default()
        }
    }

    /// Builder: start with accumulation on or off
    pub fn with_running_average(mut self, enabled: bool) -> Self {
        self.running_average = enabled;
        self
    }

    /// Builder: difference presentation
    pub fn with_diff_display(mut self, display: DiffDisplay) -> Self {
        self.diff_display = display;
        self
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.base_topic = normalize_base_topic(&config.base_topic);
        Ok(config)
    }

    /// Normalized base topic
    pub fn base(&self) -> String {
        normalize_base_topic(&self.base_topic)
    }

    /// Full topic for a base-relative suffix
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{}", self.base(), suffix)
    }

    /// Filter to subscribe with once connected
    pub fn subscription_filter(&self) -> String {
        self.topic("#")
    }

    /// Reject base topics that would make the handler patterns ambiguous
    pub fn validate(&self) -> Result<()> {
        if self.base_topic.split('/').any(|s| s == "+" || s == "#") {
            return Err(FeedError::Config(format!(
                "base topic '{}' must not contain wildcards",
                self.base_topic
            )));
        }
        Ok(())
    }
}

/// Append the trailing `/` if missing. An empty base stays empty.
pub fn normalize_base_topic(base: &str) -> String {
    if base.is_empty() || base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_base_topic() {
        assert_eq!(normalize_base_topic("quak/esr"), "quak/esr/");
        assert_eq!(normalize_base_topic("quak/esr/"), "quak/esr/");
        assert_eq!(normalize_base_topic(""), "");
    }

    #[test]
    fn test_topics_and_filter() {
        let config = FeedConfig::new("lab/esr");
        assert_eq!(config.topic("scan/peak/peakdata"), "lab/esr/scan/peak/peakdata");
        assert_eq!(config.subscription_filter(), "lab/esr/#");
    }

    #[test]
    fn test_feed_config_defaults() {
        let config = FeedConfig::default();
        assert!(config.running_average);
        assert_eq!(config.diff_display, DiffDisplay::Absolute);
    }

    #[test]
    fn test_feed_config_json() {
        let config = FeedConfig::from_json(r#"{"base_topic": "a/b", "diff_display": "sigma"}"#)
            .unwrap();
        assert_eq!(config.base_topic, "a/b/");
        assert_eq!(config.diff_display, DiffDisplay::Sigma);
        assert!(config.running_average);
    }

    #[test]
    fn test_wildcard_base_rejected() {
        assert!(FeedConfig::new("a/+/b").validate().is_err());
        assert!(FeedConfig::new("a/b").validate().is_ok());
    }

    #[test]
    fn test_connection_port_forms() {
        let c = ConnectionConfig::from_json(r#"{"broker": "h", "port": "1883"}"#).unwrap();
        assert_eq!(c.port, Some(1883));
        let c = ConnectionConfig::from_json(r#"{"port": 8883}"#).unwrap();
        assert_eq!(c.port, Some(8883));
        let c = ConnectionConfig::from_json(r#"{"port": ""}"#).unwrap();
        assert_eq!(c.port, None);
        assert!(ConnectionConfig::from_json(r#"{"port": "abc"}"#).is_err());
        assert!(ConnectionConfig::from_json(r#"{"port": 70000}"#).is_err());
    }

    #[test]
    fn test_connection_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"broker": "broker.lab", "port": "1883", "user": "esr", "password": "x", "basetopic": "quak/esr"}}"#
        )
        .unwrap();

        let config = ConnectionConfig::load(file.path()).unwrap();
        assert_eq!(config.broker, "broker.lab");
        assert_eq!(config.feed_config().base_topic, "quak/esr/");

        let json = config.to_json().unwrap();
        assert!(json.contains("\"basetopic\""));
    }

    #[test]
    fn test_connection_load_missing_file() {
        let err = ConnectionConfig::load("/nonexistent/connection.conf").unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));
    }
}
