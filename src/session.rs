// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Scan session bookkeeping: last scan timing, the scan duration history
//! and electron-beam current estimates.

use crate::protocol::ScanTiming;
use serde::Serialize;

/// Display state of the most recent scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastScan {
    /// Scan type taken from the topic (`peak`, `until/peak`, ...)
    pub kind: String,
    pub start: String,
    pub stop: String,
    /// `"75.0s (0:01:15)"`, empty while the scan runs
    pub duration: String,
}

/// Session history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSession {
    last: LastScan,
    durations: Vec<f64>,
    beam_estimates: Vec<f64>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scan has started: record its start time and clear stop/duration
    pub fn scan_started(&mut self, kind: &str, starttime: &str) {
        self.last = LastScan {
            kind: kind.to_string(),
            start: starttime.replace('_', " "),
            stop: String::new(),
            duration: String::new(),
        };
    }

    /// A scan has finished: record its timing and append the duration
    pub fn scan_finished(&mut self, kind: &str, timing: &ScanTiming) {
        let secs = timing.duration_secs();
        self.last = LastScan {
            kind: kind.to_string(),
            start: timing.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            stop: timing.end.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration: format_duration(secs),
        };
        self.durations.push(secs);
    }

    /// Record a beam current estimate
    pub fn record_beam_current(&mut self, current: f64) {
        self.beam_estimates.push(current);
    }

    /// Forget the duration history
    pub fn reset_durations(&mut self) {
        self.durations.clear();
    }

    pub fn last_scan(&self) -> &LastScan {
        &self.last
    }

    /// Durations of finished scans in seconds, oldest first
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn beam_estimates(&self) -> &[f64] {
        &self.beam_estimates
    }
}

/// Scan type from a base-relative control topic.
///
/// `scan/peak/start` gives `peak`, `scan/until/peak/done` gives
/// `until/peak`.
pub fn scan_kind(relative_topic: &str) -> String {
    let trimmed = relative_topic.trim_end_matches('/');
    let inner = trimmed.strip_prefix("scan/").unwrap_or(trimmed);
    match inner.rsplit_once('/') {
        Some((kind, _)) => kind.to_string(),
        None => String::new(),
    }
}

fn format_duration(secs: f64) -> String {
    let whole = secs.max(0.0).round() as u64;
    format!(
        "{:?}s ({}:{:02}:{:02})",
        secs,
        whole / 3600,
        (whole % 3600) / 60,
        whole % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_scan_time;

    #[test]
    fn test_scan_kind() {
        assert_eq!(scan_kind("scan/peak/start"), "peak");
        assert_eq!(scan_kind("scan/until/peak/done"), "until/peak");
        assert_eq!(scan_kind("start"), "");
    }

    #[test]
    fn test_start_then_finish() {
        let mut session = ScanSession::new();
        session.scan_started("peak", "2024-03-01_12:00:00");
        assert_eq!(session.last_scan().start, "2024-03-01 12:00:00");
        assert!(session.last_scan().stop.is_empty());

        let timing = ScanTiming {
            start: parse_scan_time("2024-03-01_12:00:00").unwrap(),
            end: parse_scan_time("2024-03-01_13:01:15").unwrap(),
        };
        session.scan_finished("peak", &timing);

        let last = session.last_scan();
        assert_eq!(last.stop, "2024-03-01 13:01:15");
        assert_eq!(last.duration, "3675.0s (1:01:15)");
        assert_eq!(session.durations(), &[3675.0]);

        session.scan_started("peak", "2024-03-01_13:02:00");
        assert!(session.last_scan().duration.is_empty());
        assert_eq!(session.durations().len(), 1);

        session.reset_durations();
        assert!(session.durations().is_empty());
    }

    #[test]
    fn test_beam_estimates() {
        let mut session = ScanSession::new();
        session.record_beam_current(1.5);
        session.record_beam_current(1.7);
        assert_eq!(session.beam_estimates(), &[1.5, 1.7]);
    }
}
