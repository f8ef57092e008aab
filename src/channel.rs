// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Averaged channel types shared by the reducer, the running aggregator and
//! the difference computation.

use serde::Serialize;
use std::fmt;

/// Which measurement stream a scan belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stream {
    /// Primary measurement (`peakdata`)
    Signal,
    /// Background baseline (`zeropeakdata`)
    Reference,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Signal => write!(f, "signal"),
            Stream::Reference => write!(f, "reference"),
        }
    }
}

/// Per-point means of one stream snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AveragedChannel {
    /// Field current of each point
    pub currents: Vec<f64>,
    /// Mean in-phase value of each point
    pub i: Vec<f64>,
    /// Mean quadrature value of each point
    pub q: Vec<f64>,
}

impl AveragedChannel {
    /// Number of points
    pub fn len(&self) -> usize {
        self.i.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

/// Per-point standard deviations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorBars {
    pub i: Vec<f64>,
    pub q: Vec<f64>,
}

impl ErrorBars {
    /// Number of points
    pub fn len(&self) -> usize {
        self.i.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

/// Means plus (optional) error bars: the unit the difference works on
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub channel: AveragedChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorBars>,
}

impl ChannelSnapshot {
    /// Snapshot without error bars
    pub fn new(channel: AveragedChannel) -> Self {
        Self {
            channel,
            errors: None,
        }
    }

    /// Snapshot with error bars
    pub fn with_errors(channel: AveragedChannel, errors: ErrorBars) -> Self {
        Self {
            channel,
            errors: Some(errors),
        }
    }

    /// Check whether error bars are present
    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_display() {
        assert_eq!(Stream::Signal.to_string(), "signal");
        assert_eq!(Stream::Reference.to_string(), "reference");
    }

    #[test]
    fn test_snapshot_errors() {
        let channel = AveragedChannel {
            currents: vec![1.0],
            i: vec![2.0],
            q: vec![3.0],
        };
        assert!(!ChannelSnapshot::new(channel.clone()).has_errors());
        let snap = ChannelSnapshot::with_errors(
            channel,
            ErrorBars {
                i: vec![0.1],
                q: vec![0.2],
            },
        );
        assert!(snap.has_errors());
        assert_eq!(snap.channel.len(), 1);
    }
}
