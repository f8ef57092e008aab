// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Single-scan reduction.
//!
//! Collapses the `n` repeated iterations held by each point of one scan into
//! a per-point mean and, for `n > 1`, a population standard deviation.

use crate::channel::{AveragedChannel, ChannelSnapshot, ErrorBars};
use crate::protocol::RawScanBatch;
use serde::Serialize;

/// Result of reducing one scan message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedScan {
    /// Means and error bars (absent when `iterations <= 1`)
    pub snapshot: ChannelSnapshot,
    /// Iterations per point the scan carried
    pub iterations: usize,
}

impl ReducedScan {
    pub fn channel(&self) -> &AveragedChannel {
        &self.snapshot.channel
    }

    pub fn errors(&self) -> Option<&ErrorBars> {
        self.snapshot.errors.as_ref()
    }
}

/// Reduce one scan to per-point statistics.
pub fn reduce(batch: &RawScanBatch) -> ReducedScan {
    let n = batch.iterations();
    let mut channel = AveragedChannel {
        currents: batch.currents(),
        i: Vec::with_capacity(batch.len()),
        q: Vec::with_capacity(batch.len()),
    };
    let mut errors = (n > 1).then(|| ErrorBars {
        i: Vec::with_capacity(batch.len()),
        q: Vec::with_capacity(batch.len()),
    });

    for point in batch.points() {
        let mean_i = mean(&point.i);
        let mean_q = mean(&point.q);
        channel.i.push(mean_i);
        channel.q.push(mean_q);

        if let Some(ref mut errors) = errors {
            errors.i.push(population_std(&point.i, mean_i));
            errors.q.push(population_std(&point.q, mean_q));
        }
    }

    ReducedScan {
        snapshot: ChannelSnapshot { channel, errors },
        iterations: n,
    }
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

// Divides by n, not n - 1.
fn population_std(samples: &[f64], mean: f64) -> f64 {
    let n = samples.len() as f64;
    let variance = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    variance.sqrt()
}
