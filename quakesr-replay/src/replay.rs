// QUAK/ESR Replay - Session replay engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Session replay engine.
//!
//! Three tasks stand in for the live system: a producer plays the script
//! with its recorded delays (scaled by the replay speed) into a channel the
//! way the broker client would, a delivery task dispatches every message
//! through the feed, and a consumer polls the changed views on a fixed
//! interval like the display refresh does.

use quakesr::{FeedHandle, Message, ScanFeed};
use quakesr_testdata::ScriptedMessage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for session replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Replay speed multiplier (1.0 = recorded pace, 10.0 = 10x faster).
    pub speed: f64,
    /// Consumer polling period in milliseconds.
    pub poll_interval_ms: u64,
    /// Capacity of the producer to delivery channel.
    pub channel_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            poll_interval_ms: 250,
            channel_capacity: 64,
        }
    }
}

/// Progress counters, shared between the tasks.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Messages in the script.
    pub total: AtomicUsize,
    /// Messages dispatched so far.
    pub delivered: AtomicUsize,
    /// Messages no handler matched.
    pub unmatched: AtomicUsize,
    /// Handler invocations that returned an error.
    pub failed: AtomicUsize,
    /// Whether delivery is still in progress.
    pub running: AtomicBool,
}

/// Views the consumer saw change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub polls: usize,
    pub peak_updates: usize,
    pub running_updates: usize,
    pub scan_updates: usize,
    pub beam_updates: usize,
    /// Delivered message count seen at the last poll
    pub delivered_seen: usize,
}

/// Outcome of one replay.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub messages: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub consumer: ConsumerStats,
    pub elapsed: Duration,
}

/// Replay engine that feeds a script through the feed core.
pub struct ReplayEngine {
    config: ReplayConfig,
    feed: Arc<ScanFeed>,
    state: Arc<ReplayState>,
}

impl ReplayEngine {
    /// Create a new replay engine.
    pub fn new(config: ReplayConfig, feed: ScanFeed) -> Result<Self, ReplayError> {
        if !config.speed.is_finite() || config.speed <= 0.0 {
            return Err(ReplayError::InvalidConfig(format!(
                "speed must be a positive number, got {}",
                config.speed
            )));
        }
        if config.poll_interval_ms == 0 || config.channel_capacity == 0 {
            return Err(ReplayError::InvalidConfig(
                "poll interval and channel capacity must be > 0".to_string(),
            ));
        }

        Ok(Self {
            config,
            feed: Arc::new(feed),
            state: Arc::new(ReplayState::default()),
        })
    }

    /// Consumer handle onto the feed.
    pub fn handle(&self) -> FeedHandle {
        self.feed.handle()
    }

    /// Play the script to the end.
    pub async fn run(&self, script: Vec<ScriptedMessage>) -> Result<ReplaySummary, ReplayError> {
        if script.is_empty() {
            return Err(ReplayError::EmptyScript);
        }

        let started = Instant::now();
        let messages = script.len();
        self.state.total.store(messages, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        info!(
            "Starting replay: {} messages, speed={}, filter={}",
            messages,
            self.config.speed,
            self.feed.subscription_filter()
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let producer = tokio::spawn(produce(script, self.config.speed, tx));
        let delivery = tokio::spawn(deliver(
            Arc::clone(&self.feed),
            rx,
            Arc::clone(&self.state),
        ));
        let consumer = tokio::spawn(consume(
            self.feed.handle(),
            Duration::from_millis(self.config.poll_interval_ms),
            Arc::clone(&self.state),
        ));

        producer.await?;
        delivery.await?;
        self.state.running.store(false, Ordering::SeqCst);
        let consumer = consumer.await?;

        let summary = ReplaySummary {
            messages: self.state.delivered.load(Ordering::SeqCst),
            unmatched: self.state.unmatched.load(Ordering::SeqCst),
            failed: self.state.failed.load(Ordering::SeqCst),
            consumer,
            elapsed: started.elapsed(),
        };
        info!(
            "Replay complete: {} delivered, {} unmatched, {} handler failures in {:?}",
            summary.messages, summary.unmatched, summary.failed, summary.elapsed
        );
        Ok(summary)
    }
}

async fn produce(script: Vec<ScriptedMessage>, speed: f64, tx: mpsc::Sender<Message>) {
    for scripted in script {
        if let Some(delay_ms) = scripted.delay_ms {
            let scaled = Duration::from_secs_f64(delay_ms as f64 / 1000.0 / speed);
            if !scaled.is_zero() {
                sleep(scaled).await;
            }
        }

        let message = Message::from_bytes(scripted.topic.as_str(), &scripted.body());
        if tx.send(message).await.is_err() {
            warn!("Delivery task stopped, dropping the rest of the script");
            break;
        }
    }
}

async fn deliver(feed: Arc<ScanFeed>, mut rx: mpsc::Receiver<Message>, state: Arc<ReplayState>) {
    while let Some(message) = rx.recv().await {
        let report = feed.deliver(&message);
        debug!(
            "[{}/{}] {} -> {} matched, {} failed",
            state.delivered.load(Ordering::SeqCst) + 1,
            state.total.load(Ordering::SeqCst),
            message.topic,
            report.matched,
            report.failed
        );

        if report.matched == 0 {
            state.unmatched.fetch_add(1, Ordering::SeqCst);
        }
        state.failed.fetch_add(report.failed, Ordering::SeqCst);
        state.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

async fn consume(handle: FeedHandle, period: Duration, state: Arc<ReplayState>) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let finished = !state.running.load(Ordering::SeqCst);
        poll_views(&handle, &mut stats);

        let delivered = state.delivered.load(Ordering::SeqCst);
        if delivered != stats.delivered_seen {
            debug!(
                "Progress: {}/{} messages delivered",
                delivered,
                state.total.load(Ordering::SeqCst)
            );
        }
        stats.delivered_seen = delivered;
        if finished {
            break;
        }
    }

    stats
}

fn poll_views(handle: &FeedHandle, stats: &mut ConsumerStats) {
    stats.polls += 1;

    if let Some(peak) = handle.take_peak() {
        stats.peak_updates += 1;
        let points = peak.signal.as_ref().map(|s| s.channel().len()).unwrap_or(0);
        debug!(
            "Last scan: {} points, difference {}",
            points,
            if peak.difference.is_some() { "ready" } else { "pending" }
        );
    }

    if let Some(running) = handle.take_running() {
        stats.running_updates += 1;
        info!(
            "Running average: signal={} reference={} enabled={}",
            running.signal_count, running.reference_count, running.enabled
        );
    }

    if let Some(last) = handle.take_last_scan() {
        stats.scan_updates += 1;
        if last.duration.is_empty() {
            info!("Scan {} started at {}", last.kind, last.start);
        } else {
            info!("Scan {} finished at {} ({})", last.kind, last.stop, last.duration);
        }
    }

    if let Some(durations) = handle.take_durations() {
        debug!("{} scan durations recorded", durations.len());
    }

    if let Some(beam) = handle.take_beam_currents() {
        stats.beam_updates += 1;
        if let Some(latest) = beam.last() {
            info!("Beam current estimate: {}", latest);
        }
    }
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Invalid replay config: {0}")]
    InvalidConfig(String),

    #[error("Script contains no messages")]
    EmptyScript,

    #[error("Feed error: {0}")]
    Feed(#[from] quakesr::FeedError),

    #[error("Script error: {0}")]
    Script(#[from] quakesr_testdata::TestdataError),

    #[error("Replay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
