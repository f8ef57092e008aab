//! # QUAK/ESR Feed
//!
//! Topic dispatch and streaming scan statistics for a continuous-wave ESR
//! spectrometer that publishes its scans over a publish/subscribe broker.
//!
//! ## Key Features
//!
//! - **Topic Matching**: `+` / `#` wildcard patterns with ordered dispatch
//! - **Scan Reduction**: Per-point mean and population standard deviation
//! - **Running Averages**: Single-pass Welford accumulation across scans
//! - **Background Subtraction**: Signal minus reference with quadrature errors
//!
//! ## Quick Start
//!
//! ```rust
//! use quakesr::{FeedConfig, Message, ScanFeed};
//! use serde_json::json;
//!
//! let feed = ScanFeed::new(FeedConfig::new("lab/esr")).unwrap();
//! let handle = feed.handle();
//!
//! // One point, one iteration: [current, i, q]
//! feed.deliver(&Message::new(
//!     "lab/esr/scan/peak/peakdata",
//!     json!({"payload": [[1.0, 10.0, 12.0]]}),
//! ));
//! feed.deliver(&Message::new(
//!     "lab/esr/scan/peak/zeropeakdata",
//!     json!({"payload": [[1.0, 4.0, 6.0]]}),
//! ));
//!
//! let peak = handle.take_peak().unwrap();
//! let difference = peak.difference.unwrap();
//! assert_eq!(difference.i, vec![6.0]);
//! assert_eq!(difference.q, vec![6.0]);
//! ```
//!
//! ## Modules
//!
//! - [`topic`]: Pattern matching and handler dispatch
//! - [`protocol`]: Messages, payload decoding and typed records
//! - [`reducer`]: Single-scan statistics
//! - [`aggregator`]: Running statistics across scans
//! - [`difference`]: Signal minus reference
//! - [`session`]: Scan timing and beam current history
//! - [`feed`]: Handler wiring and the consumer API
//! - [`config`]: Feed and connection configuration

// Modules
pub mod aggregator;
pub mod channel;
pub mod config;
pub mod difference;
pub mod error;
pub mod feed;
pub mod protocol;
pub mod reducer;
pub mod session;
pub mod topic;

// Re-exports for convenient access
pub use aggregator::{RunningAggregator, StreamAccumulator};
pub use channel::{AveragedChannel, ChannelSnapshot, ErrorBars, Stream};
pub use config::{normalize_base_topic, ConnectionConfig, FeedConfig};
pub use difference::{diff, DiffCurves, DiffDisplay, DifferenceResult};
pub use error::{FeedError, Result};
pub use feed::{FeedHandle, FeedState, PeakView, RunningView, ScanFeed};
pub use protocol::{
    parse_scan_time, BeamCurrentEstimate, Message, Payload, RawScanBatch, ScanPoint, ScanTiming,
};
pub use reducer::{reduce, ReducedScan};
pub use session::{scan_kind, LastScan, ScanSession};
pub use topic::{topic_matches, DispatchReport, Handler, HandlerId, TopicMatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
