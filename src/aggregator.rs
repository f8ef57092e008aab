// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Running mean and variance across repeated scans.
//!
//! Each stream (signal and reference) keeps its own single-pass
//! accumulator. Every iteration column of an incoming scan is one update,
//! so a scan with `n` iterations per point advances the stream count by `n`.
//!
//! The update follows Welford's recurrence:
//!
//! ```text
//! mean_new = mean_old * (count / (count + 1)) + x / (count + 1)
//! m2      += (x - mean_old) * (x - mean_new)
//! err      = sqrt(m2 / count)
//! ```

use crate::channel::{AveragedChannel, ChannelSnapshot, ErrorBars, Stream};
use crate::difference::{diff, DifferenceResult};
use crate::error::{FeedError, Result};
use crate::protocol::RawScanBatch;

/// Mean and second moment per point for one sub-channel (I or Q)
#[derive(Debug, Clone, Default, PartialEq)]
struct Moments {
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl Moments {
    fn seed(&mut self, samples: impl Iterator<Item = f64>) {
        self.mean = samples.collect();
        self.m2 = vec![0.0; self.mean.len()];
    }

    fn update(&mut self, point: usize, x: f64, count: f64) {
        let mean_old = self.mean[point];
        let mean_new = mean_old * (count / (count + 1.0)) + x / (count + 1.0);
        self.m2[point] += (x - mean_old) * (x - mean_new);
        self.mean[point] = mean_new;
    }

    fn spread(&self, count: u64) -> Vec<f64> {
        let count = count as f64;
        self.m2.iter().map(|m2| (m2 / count).sqrt()).collect()
    }
}

/// Accumulated state of one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamAccumulator {
    currents: Vec<f64>,
    i: Moments,
    q: Moments,
    errors: ErrorBars,
    count: u64,
}

impl StreamAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of iteration columns absorbed so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Established point count, once the first scan has been absorbed
    pub fn point_count(&self) -> Option<usize> {
        (self.count > 0).then_some(self.i.mean.len())
    }

    /// Field currents snapshotted from the first scan
    pub fn currents(&self) -> &[f64] {
        &self.currents
    }

    pub fn mean_i(&self) -> &[f64] {
        &self.i.mean
    }

    pub fn mean_q(&self) -> &[f64] {
        &self.q.mean
    }

    pub fn m2_i(&self) -> &[f64] {
        &self.i.m2
    }

    pub fn m2_q(&self) -> &[f64] {
        &self.q.m2
    }

    /// Per-point standard deviation as of the last absorbed scan
    pub fn errors(&self) -> &ErrorBars {
        &self.errors
    }

    /// Means and errors, or `None` before the first scan
    pub fn snapshot(&self) -> Option<ChannelSnapshot> {
        if self.count == 0 {
            return None;
        }
        Some(ChannelSnapshot::with_errors(
            AveragedChannel {
                currents: self.currents.clone(),
                i: self.i.mean.clone(),
                q: self.q.mean.clone(),
            },
            self.errors.clone(),
        ))
    }

    /// Fold one scan into the running statistics.
    ///
    /// A scan whose point count differs from the established geometry is
    /// rejected before anything is modified.
    pub fn absorb(&mut self, batch: &RawScanBatch) -> Result<()> {
        if let Some(expected) = self.point_count() {
            if expected != batch.len() {
                return Err(FeedError::ShapeMismatch {
                    expected,
                    actual: batch.len(),
                });
            }
        }

        let points = batch.points();
        let mut first_column = 0;

        if self.count == 0 {
            self.currents = batch.currents();
            self.i.seed(points.iter().map(|p| p.i[0]));
            self.q.seed(points.iter().map(|p| p.q[0]));
            self.count = 1;
            first_column = 1;
        }

        for column in first_column..batch.iterations() {
            let count = self.count as f64;
            for (index, point) in points.iter().enumerate() {
                self.i.update(index, point.i[column], count);
                self.q.update(index, point.q[column], count);
            }
            self.count += 1;
        }

        self.errors = ErrorBars {
            i: self.i.spread(self.count),
            q: self.q.spread(self.count),
        };
        Ok(())
    }
}

/// Running averages for the signal and reference streams
#[derive(Debug, Clone, PartialEq)]
pub struct RunningAggregator {
    enabled: bool,
    signal: StreamAccumulator,
    reference: StreamAccumulator,
}

impl Default for RunningAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningAggregator {
    /// Create an empty, enabled aggregator
    pub fn new() -> Self {
        Self {
            enabled: true,
            signal: StreamAccumulator::new(),
            reference: StreamAccumulator::new(),
        }
    }

    /// Check whether scans are being accumulated
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pause or resume accumulation. Resuming keeps the current state.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Stop accumulating (state is frozen, not cleared)
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Discard both streams; the enabled flag is left as is
    pub fn reset(&mut self) {
        self.signal = StreamAccumulator::new();
        self.reference = StreamAccumulator::new();
    }

    /// Discard both streams and start accumulating
    pub fn reset_and_enable(&mut self) {
        self.reset();
        self.enabled = true;
    }

    /// Fold a scan into the given stream.
    ///
    /// Returns `Ok(false)` when disabled (nothing changed).
    pub fn update(&mut self, stream: Stream, batch: &RawScanBatch) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        self.stream_mut(stream).absorb(batch)?;
        Ok(true)
    }

    /// Accumulator of one stream
    pub fn stream(&self, stream: Stream) -> &StreamAccumulator {
        match stream {
            Stream::Signal => &self.signal,
            Stream::Reference => &self.reference,
        }
    }

    fn stream_mut(&mut self, stream: Stream) -> &mut StreamAccumulator {
        match stream {
            Stream::Signal => &mut self.signal,
            Stream::Reference => &mut self.reference,
        }
    }

    /// Update count of one stream
    pub fn count(&self, stream: Stream) -> u64 {
        self.stream(stream).count()
    }

    /// Running means and errors of one stream
    pub fn snapshot(&self, stream: Stream) -> Option<ChannelSnapshot> {
        self.stream(stream).snapshot()
    }

    /// Running signal minus running reference
    pub fn difference(&self) -> Option<DifferenceResult> {
        diff(
            self.signal.snapshot().as_ref(),
            self.reference.snapshot().as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single(current: f64, i: f64, q: f64) -> RawScanBatch {
        RawScanBatch::from_rows(&[[current, i, q]]).unwrap()
    }

    #[test]
    fn test_two_scans_welford() {
        let mut agg = RunningAggregator::new();

        agg.update(Stream::Signal, &single(1.0, 10.0, 0.0)).unwrap();
        let acc = agg.stream(Stream::Signal);
        assert_eq!(acc.mean_i(), &[10.0]);
        assert_eq!(acc.m2_i(), &[0.0]);
        assert_eq!(acc.count(), 1);

        agg.update(Stream::Signal, &single(1.0, 20.0, 0.0)).unwrap();
        let acc = agg.stream(Stream::Signal);
        assert_relative_eq!(acc.mean_i()[0], 15.0);
        assert_relative_eq!(acc.m2_i()[0], 50.0);
        assert_eq!(acc.count(), 2);
        assert_relative_eq!(acc.errors().i[0], 5.0);
    }

    #[test]
    fn test_count_advances_per_iteration() {
        let mut agg = RunningAggregator::new();
        let batch = RawScanBatch::from_rows(&[
            [1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            [2.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        ])
        .unwrap();
        agg.update(Stream::Signal, &batch).unwrap();
        assert_eq!(agg.count(Stream::Signal), 3);
        agg.update(Stream::Signal, &batch).unwrap();
        assert_eq!(agg.count(Stream::Signal), 6);
        assert_eq!(agg.count(Stream::Reference), 0);
    }

    #[test]
    fn test_currents_snapshotted_once() {
        let mut agg = RunningAggregator::new();
        agg.update(Stream::Signal, &single(1.5, 1.0, 1.0)).unwrap();
        agg.update(Stream::Signal, &single(9.9, 1.0, 1.0)).unwrap();
        assert_eq!(agg.stream(Stream::Signal).currents(), &[1.5]);
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut agg = RunningAggregator::new();
        agg.disable();
        assert!(!agg.update(Stream::Signal, &single(1.0, 1.0, 1.0)).unwrap());
        assert_eq!(agg.count(Stream::Signal), 0);
        assert!(agg.snapshot(Stream::Signal).is_none());

        agg.set_enabled(true);
        assert!(agg.update(Stream::Signal, &single(1.0, 1.0, 1.0)).unwrap());
        assert_eq!(agg.count(Stream::Signal), 1);
    }

    #[test]
    fn test_reenable_resumes() {
        let mut agg = RunningAggregator::new();
        agg.update(Stream::Signal, &single(1.0, 10.0, 0.0)).unwrap();
        agg.disable();
        agg.update(Stream::Signal, &single(1.0, 99.0, 0.0)).unwrap();
        agg.set_enabled(true);
        agg.update(Stream::Signal, &single(1.0, 20.0, 0.0)).unwrap();
        assert_eq!(agg.count(Stream::Signal), 2);
        assert_relative_eq!(agg.stream(Stream::Signal).mean_i()[0], 15.0);
    }

    #[test]
    fn test_shape_mismatch_leaves_state() {
        let mut agg = RunningAggregator::new();
        agg.update(Stream::Signal, &single(1.0, 10.0, 0.0)).unwrap();
        let before = agg.stream(Stream::Signal).clone();

        let wider = RawScanBatch::from_rows(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).unwrap();
        let err = agg.update(Stream::Signal, &wider).unwrap_err();
        assert!(matches!(
            err,
            FeedError::ShapeMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert_eq!(agg.stream(Stream::Signal), &before);
    }

    #[test]
    fn test_reset_and_enable() {
        let mut agg = RunningAggregator::new();
        agg.update(Stream::Signal, &single(1.0, 10.0, 0.0)).unwrap();
        agg.update(Stream::Reference, &single(1.0, 5.0, 0.0)).unwrap();
        agg.disable();

        agg.reset_and_enable();
        assert!(agg.is_enabled());
        assert_eq!(agg.count(Stream::Signal), 0);
        assert_eq!(agg.count(Stream::Reference), 0);
        assert!(agg.stream(Stream::Signal).mean_i().is_empty());
        assert!(agg.difference().is_none());

        // geometry is free again after a reset
        let wider = RawScanBatch::from_rows(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).unwrap();
        agg.update(Stream::Signal, &wider).unwrap();
        assert_eq!(agg.stream(Stream::Signal).point_count(), Some(2));
    }

    #[test]
    fn test_running_difference() {
        let mut agg = RunningAggregator::new();
        agg.update(Stream::Signal, &single(1.0, 10.0, 4.0)).unwrap();
        assert!(agg.difference().is_none());
        agg.update(Stream::Reference, &single(1.0, 3.0, 1.0)).unwrap();

        let d = agg.difference().unwrap();
        assert_eq!(d.i, vec![7.0]);
        assert_eq!(d.q, vec![3.0]);
        // running errors exist as soon as count > 0
        assert_eq!(d.errors.unwrap().i, vec![0.0]);
    }
}
