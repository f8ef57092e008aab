// QUAK/ESR Testdata - Session scripts
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Scripted measurement sessions.
//!
//! A script is the ordered list of messages the instrument publishes during
//! a session: control messages, scan data and beam current estimates.
//! Scripts are stored as JSON lines, one message per line.

use crate::error::{Result, TestdataError};
use crate::generator::{scan_payload, ScanGenerator};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Timestamp format of `starttime` / `endtime`.
pub const SCAN_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// One scripted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedMessage {
    /// Full topic.
    pub topic: String,
    /// Body. A JSON string is sent as its raw text.
    pub payload: Value,
    /// Pause before this message, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl ScriptedMessage {
    /// Create a message without delay.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            delay_ms: None,
        }
    }

    /// Set the delay.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Bytes as they would arrive from the broker.
    pub fn body(&self) -> Vec<u8> {
        match &self.payload {
            Value::String(text) => text.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        }
    }
}

/// Write messages as JSON lines.
pub fn write_jsonl(path: impl AsRef<Path>, messages: &[ScriptedMessage]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for message in messages {
        serde_json::to_writer(&mut writer, message)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read JSON lines; blank lines are skipped.
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<ScriptedMessage>> {
    let reader = BufReader::new(File::open(path)?);
    let mut messages = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message = serde_json::from_str(&line).map_err(|e| TestdataError::ScriptParse {
            line: index + 1,
            message: e.to_string(),
        })?;
        messages.push(message);
    }

    Ok(messages)
}

/// Session layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScript {
    /// Number of scans.
    pub scans: usize,
    /// Scan type (`peak`).
    pub kind: String,
    /// Wrap the session in `scanuntil/start` and `scanuntil/done`.
    pub until: bool,
    /// Start of the first scan.
    pub start_time: NaiveDateTime,
    /// Duration of each scan.
    pub scan_secs: i64,
    /// Idle time between scans.
    pub gap_secs: i64,
    /// Beam current estimate published after each scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beam_current: Option<f64>,
    /// Delay attached to every message.
    pub delay_ms: u64,
}

impl Default for SessionScript {
    fn default() -> Self {
        let start_time = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self {
            scans: 10,
            kind: "peak".to_string(),
            until: true,
            start_time,
            scan_secs: 75,
            gap_secs: 5,
            beam_current: Some(12.5),
            delay_ms: 0,
        }
    }
}

impl SessionScript {
    /// Create a new session layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of scans.
    pub fn with_scans(mut self, scans: usize) -> Self {
        self.scans = scans;
        self
    }

    /// Set the scan-until wrapping.
    pub fn with_until(mut self, until: bool) -> Self {
        self.until = until;
        self
    }

    /// Set the per-message delay.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Set the beam current estimate.
    pub fn with_beam_current(mut self, current: Option<f64>) -> Self {
        self.beam_current = current;
        self
    }

    fn kind_path(&self) -> String {
        if self.until {
            format!("until/{}", self.kind)
        } else {
            self.kind.clone()
        }
    }

    /// Build the message sequence under `base_topic`.
    pub fn build(&self, base_topic: &str, generator: &mut ScanGenerator) -> Vec<ScriptedMessage> {
        let base = if base_topic.is_empty() || base_topic.ends_with('/') {
            base_topic.to_string()
        } else {
            format!("{}/", base_topic)
        };
        let kind = self.kind_path();
        let mut out = Vec::new();
        let mut push = |suffix: &str, payload: Value| {
            out.push(
                ScriptedMessage::new(format!("{}{}", base, suffix), payload)
                    .with_delay_ms(self.delay_ms),
            );
        };

        if self.until {
            push("scanuntil/start", json!({}));
        }

        for scan in 0..self.scans {
            let start = self.start_time
                + Duration::seconds((self.scan_secs + self.gap_secs) * scan as i64);
            let end = start + Duration::seconds(self.scan_secs);
            let starttime = start.format(SCAN_TIME_FORMAT).to_string();
            let endtime = end.format(SCAN_TIME_FORMAT).to_string();

            push(
                &format!("scan/{}/start", kind),
                json!({ "starttime": starttime }),
            );
            push("scan/peak/peakdata", scan_payload(&generator.signal_rows()));
            push(
                "scan/peak/zeropeakdata",
                scan_payload(&generator.reference_rows()),
            );
            push(
                &format!("scan/{}/done", kind),
                json!({ "starttime": starttime, "endtime": endtime }),
            );
            if let Some(current) = self.beam_current {
                push(
                    "egun/beamcurrent/estimate",
                    json!({ "current": format!("{:.3}", current) }),
                );
            }
        }

        if self.until {
            push("scanuntil/done", json!({}));
        }

        out
    }
}
