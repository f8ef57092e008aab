// QUAK/ESR Replay - End-of-run report
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Final state of the feed, summarized for the console or a JSON file.

use crate::replay::{ConsumerStats, ReplaySummary};
use quakesr::{DiffCurves, DiffDisplay, FeedHandle, LastScan};
use serde::Serialize;
use std::path::Path;

/// Replay report.
#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub messages: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
    pub consumer: ConsumerStats,
    pub last_scan: LastScan,
    pub scan_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_scan_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beam_current: Option<f64>,
    pub running: RunningSummary,
    pub diff_display: DiffDisplay,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_difference: Option<DiffCurves>,
}

/// Running-average part of the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunningSummary {
    pub enabled: bool,
    pub signal_count: u64,
    pub reference_count: u64,
    pub points: usize,
    /// Spread of the I difference, in the selected presentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_to_peak_i: Option<f64>,
}

impl FeedReport {
    /// Collect the report from the feed after a replay.
    pub fn collect(handle: &FeedHandle, summary: &ReplaySummary) -> Self {
        let session = handle.session();
        let running = handle.running();
        let running_difference = handle.running_difference();

        let durations = session.durations();
        let mean_scan_secs = (!durations.is_empty())
            .then(|| durations.iter().sum::<f64>() / durations.len() as f64);

        let points = running
            .signal
            .as_ref()
            .map(|s| s.channel.len())
            .unwrap_or(0);

        Self {
            messages: summary.messages,
            unmatched: summary.unmatched,
            failed: summary.failed,
            elapsed_ms: summary.elapsed.as_millis(),
            consumer: summary.consumer,
            last_scan: session.last_scan().clone(),
            scan_count: durations.len(),
            mean_scan_secs,
            beam_current: session.beam_estimates().last().copied(),
            running: RunningSummary {
                enabled: running.enabled,
                signal_count: running.signal_count,
                reference_count: running.reference_count,
                points,
                peak_to_peak_i: running_difference.as_ref().and_then(|d| peak_to_peak(&d.i)),
            },
            diff_display: handle.diff_display(),
            running_difference,
        }
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON to a file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), crate::replay::ReplayError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// NaN entries (zero error in sigma units) are skipped.
fn peak_to_peak(values: &[f64]) -> Option<f64> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
    Some(max - min)
}
