// QUAK/ESR Testdata - Synthetic scan generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # QUAK/ESR Testdata
//!
//! Synthetic measurement sessions for exercising the feed without an
//! instrument attached:
//!
//! - **Lineshapes**: Lorentzian and Gaussian derivative resonances
//! - **Scans**: Noisy (I, Q) rows in the wire layout, seeded for reproducibility
//! - **Sessions**: Full message sequences with control topics, stored as JSON lines
//!
//! ## Quick Start
//!
//! ```rust
//! use quakesr_testdata::{ScanConfig, ScanGenerator, SessionScript};
//!
//! let mut generator = ScanGenerator::new(
//!     ScanConfig::new().with_points(32).with_iterations(4).with_seed(42),
//! )
//! .unwrap();
//!
//! let messages = SessionScript::new().with_scans(3).build("lab/esr", &mut generator);
//! assert_eq!(messages[0].topic, "lab/esr/scanuntil/start");
//! ```

pub mod error;
pub mod generator;
pub mod lineshape;
pub mod script;

// Re-exports for convenience
pub use error::{Result, TestdataError};
pub use generator::{scan_payload, ScanConfig, ScanGenerator};
pub use lineshape::Lineshape;
pub use script::{read_jsonl, write_jsonl, ScriptedMessage, SessionScript};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
