// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Feed wiring: the standard handler table, the shared derived state and
//! the consumer-side polling API.
//!
//! Delivery and consumption run on different threads. All derived state
//! lives in one [`FeedState`] behind a mutex; a handler holds the lock for
//! the whole update of one message, and the consumer takes cloned
//! snapshots together with their changed flags.

use crate::aggregator::RunningAggregator;
use crate::channel::{ChannelSnapshot, Stream};
use crate::config::FeedConfig;
use crate::difference::{diff, DiffCurves, DiffDisplay, DifferenceResult};
use crate::error::Result;
use crate::protocol::{BeamCurrentEstimate, Message, RawScanBatch, ScanTiming};
use crate::reducer::{reduce, ReducedScan};
use crate::session::{scan_kind, LastScan, ScanSession};
use crate::topic::{DispatchReport, Handler, TopicMatcher};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Statistics of the most recent signal and reference scans
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeakView {
    pub signal: Option<ReducedScan>,
    pub reference: Option<ReducedScan>,
    pub difference: Option<DifferenceResult>,
}

/// Running averages over all scans since the last reset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunningView {
    pub signal: Option<ChannelSnapshot>,
    pub reference: Option<ChannelSnapshot>,
    pub difference: Option<DifferenceResult>,
    pub signal_count: u64,
    pub reference_count: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChangeFlags {
    peak: bool,
    running: bool,
    last_scan: bool,
    durations: bool,
    beam: bool,
}

/// Everything derived from the feed
#[derive(Debug)]
pub struct FeedState {
    peak: PeakView,
    aggregator: RunningAggregator,
    running: RunningView,
    session: ScanSession,
    diff_display: DiffDisplay,
    changed: ChangeFlags,
}

impl FeedState {
    fn new(config: &FeedConfig) -> Self {
        let mut aggregator = RunningAggregator::new();
        aggregator.set_enabled(config.running_average);
        let mut state = Self {
            peak: PeakView::default(),
            aggregator,
            running: RunningView::default(),
            session: ScanSession::new(),
            diff_display: config.diff_display,
            changed: ChangeFlags::default(),
        };
        state.refresh_running();
        state.changed.running = false;
        state
    }

    /// Last-scan view
    pub fn peak(&self) -> &PeakView {
        &self.peak
    }

    /// Running-average view
    pub fn running(&self) -> &RunningView {
        &self.running
    }

    pub fn aggregator(&self) -> &RunningAggregator {
        &self.aggregator
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    fn refresh_running(&mut self) {
        let agg = &self.aggregator;
        self.running = RunningView {
            signal: agg.snapshot(Stream::Signal),
            reference: agg.snapshot(Stream::Reference),
            difference: agg.difference(),
            signal_count: agg.count(Stream::Signal),
            reference_count: agg.count(Stream::Reference),
            enabled: agg.is_enabled(),
        };
        self.changed.running = true;
    }

    fn absorb_scan(&mut self, stream: Stream, message: &Message) -> Result<()> {
        let batch = RawScanBatch::from_payload(&message.payload)?;

        let reduced = reduce(&batch);
        match stream {
            Stream::Signal => self.peak.signal = Some(reduced),
            Stream::Reference => self.peak.reference = Some(reduced),
        }
        self.peak.difference = diff(
            self.peak.signal.as_ref().map(|s| &s.snapshot),
            self.peak.reference.as_ref().map(|s| &s.snapshot),
        );
        self.changed.peak = true;

        if self.aggregator.update(stream, &batch)? {
            self.refresh_running();
        }
        Ok(())
    }

    fn on_signal(&mut self, _relative: &str, message: &Message) -> Result<()> {
        self.absorb_scan(Stream::Signal, message)
    }

    fn on_reference(&mut self, _relative: &str, message: &Message) -> Result<()> {
        self.absorb_scan(Stream::Reference, message)
    }

    fn on_scan_start(&mut self, relative: &str, message: &Message) -> Result<()> {
        let starttime = message.payload.str_field("starttime")?;
        self.session.scan_started(&scan_kind(relative), starttime);
        self.changed.last_scan = true;
        Ok(())
    }

    fn on_scan_done(&mut self, relative: &str, message: &Message) -> Result<()> {
        let timing = ScanTiming::from_payload(&message.payload)?;
        self.session.scan_finished(&scan_kind(relative), &timing);
        self.changed.last_scan = true;
        self.changed.durations = true;
        Ok(())
    }

    fn on_averaging_start(&mut self, _relative: &str, _message: &Message) -> Result<()> {
        self.aggregator.reset_and_enable();
        self.refresh_running();
        Ok(())
    }

    fn on_averaging_stop(&mut self, _relative: &str, _message: &Message) -> Result<()> {
        self.aggregator.disable();
        self.refresh_running();
        Ok(())
    }

    fn on_beam_current(&mut self, _relative: &str, message: &Message) -> Result<()> {
        let estimate = BeamCurrentEstimate::from_payload(&message.payload)?;
        self.session.record_beam_current(estimate.0);
        self.changed.beam = true;
        Ok(())
    }
}

type StateFn = fn(&mut FeedState, &str, &Message) -> Result<()>;

/// Standard handler table, relative to the base topic
const ROUTES: [(&str, StateFn); 9] = [
    ("scan/peak/peakdata", FeedState::on_signal),
    ("scan/peak/zeropeakdata", FeedState::on_reference),
    ("scan/+/start", FeedState::on_scan_start),
    ("scan/until/+/start", FeedState::on_scan_start),
    ("scan/+/done", FeedState::on_scan_done),
    ("scan/until/+/done", FeedState::on_scan_done),
    ("scanuntil/start", FeedState::on_averaging_start),
    ("scanuntil/done", FeedState::on_averaging_stop),
    ("egun/beamcurrent/estimate", FeedState::on_beam_current),
];

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Adapter running one state transition under the lock
struct StateHandler {
    base: String,
    state: Arc<Mutex<FeedState>>,
    apply: StateFn,
}

impl Handler for StateHandler {
    fn handle(&self, message: &Message) -> Result<()> {
        let relative = message
            .topic
            .strip_prefix(self.base.as_str())
            .unwrap_or(&message.topic);
        let mut state = lock(&self.state);
        (self.apply)(&mut state, relative, message)
    }
}

/// The feed core: a topic matcher wired to shared derived state
#[derive(Debug)]
pub struct ScanFeed {
    config: FeedConfig,
    matcher: TopicMatcher,
    state: Arc<Mutex<FeedState>>,
}

impl ScanFeed {
    /// Build the feed and register the standard handlers
    pub fn new(config: FeedConfig) -> Result<Self> {
        config.validate()?;
        let base = config.base();
        let state = Arc::new(Mutex::new(FeedState::new(&config)));

        let mut matcher = TopicMatcher::new();
        for (suffix, apply) in ROUTES {
            matcher.register(
                format!("{}{}", base, suffix),
                StateHandler {
                    base: base.clone(),
                    state: Arc::clone(&state),
                    apply,
                },
            );
        }
        log::debug!(
            "feed ready: {} handlers under '{}'",
            matcher.len(),
            config.subscription_filter()
        );

        Ok(Self {
            config,
            matcher,
            state,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Topic filter to subscribe with
    pub fn subscription_filter(&self) -> String {
        self.config.subscription_filter()
    }

    /// Dispatch one message to all matching handlers
    pub fn deliver(&self, message: &Message) -> DispatchReport {
        let report = self.matcher.dispatch(message);
        if report.matched == 0 {
            log::debug!("no handler for {}", message.topic);
        }
        report
    }

    /// Decode a transport body and dispatch it
    pub fn deliver_bytes(&self, topic: &str, body: &[u8]) -> DispatchReport {
        self.deliver(&Message::from_bytes(topic, body))
    }

    pub fn matcher(&self) -> &TopicMatcher {
        &self.matcher
    }

    /// Matcher for additional registrations during setup
    pub fn matcher_mut(&mut self) -> &mut TopicMatcher {
        &mut self.matcher
    }

    /// Consumer handle onto the shared state
    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Consumer-side access to the derived views.
///
/// `take_*` methods return a snapshot only if the view changed since the
/// last take, and clear the flag in the same critical section.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    state: Arc<Mutex<FeedState>>,
}

impl FeedHandle {
    pub fn take_peak(&self) -> Option<PeakView> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.changed.peak).then(|| state.peak.clone())
    }

    pub fn take_running(&self) -> Option<RunningView> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.changed.running).then(|| state.running.clone())
    }

    pub fn take_last_scan(&self) -> Option<LastScan> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.changed.last_scan).then(|| state.session.last_scan().clone())
    }

    pub fn take_durations(&self) -> Option<Vec<f64>> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.changed.durations).then(|| state.session.durations().to_vec())
    }

    pub fn take_beam_currents(&self) -> Option<Vec<f64>> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.changed.beam).then(|| state.session.beam_estimates().to_vec())
    }

    /// Current last-scan view, flags untouched
    pub fn peak(&self) -> PeakView {
        lock(&self.state).peak.clone()
    }

    /// Current running view, flags untouched
    pub fn running(&self) -> RunningView {
        lock(&self.state).running.clone()
    }

    pub fn session(&self) -> ScanSession {
        lock(&self.state).session.clone()
    }

    /// Turn accumulation on or off without discarding state
    pub fn set_running_average(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.aggregator.set_enabled(enabled);
        state.refresh_running();
    }

    /// Discard accumulated averages (the enabled flag is kept)
    pub fn reset_running_average(&self) {
        let mut state = lock(&self.state);
        state.aggregator.reset();
        state.refresh_running();
    }

    pub fn reset_scan_durations(&self) {
        let mut state = lock(&self.state);
        state.session.reset_durations();
        state.changed.durations = true;
    }

    pub fn diff_display(&self) -> DiffDisplay {
        lock(&self.state).diff_display
    }

    /// Switch presentation; both difference views count as changed
    pub fn set_diff_display(&self, display: DiffDisplay) {
        let mut state = lock(&self.state);
        if state.diff_display != display {
            state.diff_display = display;
            state.changed.peak = true;
            state.changed.running = true;
        }
    }

    /// Last-scan difference in the selected presentation
    pub fn peak_difference(&self) -> Option<DiffCurves> {
        let state = lock(&self.state);
        state.peak.difference.as_ref()?.render(state.diff_display)
    }

    /// Running difference in the selected presentation
    pub fn running_difference(&self) -> Option<DiffCurves> {
        let state = lock(&self.state);
        state.running.difference.as_ref()?.render(state.diff_display)
    }
}
