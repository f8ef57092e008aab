// QUAK/ESR Testdata - Scan generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Synthetic scan rows.
//!
//! A scan sweeps the coil current over `points` evenly spaced values and
//! records `iterations` noisy (I, Q) samples per point. Rows use the wire
//! layout `[current, i_1..i_n, q_1..q_n]`.

use crate::error::{Result, TestdataError};
use crate::lineshape::Lineshape;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Scan generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Points per scan.
    pub points: usize,
    /// Repeated samples per point.
    pub iterations: usize,
    /// Coil current of the first point.
    pub current_start: f64,
    /// Coil current of the last point.
    pub current_end: f64,
    /// Resonance seen on the signal stream.
    pub lineshape: Lineshape,
    /// Detector phase in radians; splits the resonance into I and Q.
    pub phase: f64,
    /// Detector offset on I.
    pub baseline_i: f64,
    /// Detector offset on Q.
    pub baseline_q: f64,
    /// Standard deviation of the per-sample noise.
    pub noise_std: f64,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            points: 64,
            iterations: 4,
            current_start: -1.0,
            current_end: 1.0,
            lineshape: Lineshape::LorentzianDerivative {
                center: 0.0,
                width: 0.15,
                amplitude: 1.0,
            },
            phase: 0.3,
            baseline_i: 0.05,
            baseline_q: -0.02,
            noise_std: 0.02,
            seed: None,
        }
    }
}

impl ScanConfig {
    /// Create a new scan config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set point count.
    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    /// Set iterations per point.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the swept current range.
    pub fn with_current_range(mut self, start: f64, end: f64) -> Self {
        self.current_start = start;
        self.current_end = end;
        self
    }

    /// Set the resonance.
    pub fn with_lineshape(mut self, lineshape: Lineshape) -> Self {
        self.lineshape = lineshape;
        self
    }

    /// Set noise level.
    pub fn with_noise(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that the config can produce valid rows.
    pub fn validate(&self) -> Result<()> {
        if self.points == 0 {
            return Err(TestdataError::InvalidConfig("points must be > 0".into()));
        }
        if self.iterations == 0 {
            return Err(TestdataError::InvalidConfig("iterations must be > 0".into()));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(TestdataError::InvalidConfig(format!(
                "noise_std must be finite and >= 0, got {}",
                self.noise_std
            )));
        }
        Ok(())
    }

    /// Coil currents of the sweep.
    pub fn currents(&self) -> Vec<f64> {
        if self.points == 1 {
            return vec![self.current_start];
        }
        let step = (self.current_end - self.current_start) / (self.points - 1) as f64;
        (0..self.points)
            .map(|k| self.current_start + step * k as f64)
            .collect()
    }
}

/// Stateful scan generator.
pub struct ScanGenerator {
    config: ScanConfig,
    currents: Vec<f64>,
    rng: StdRng,
    noise: Normal<f64>,
}

impl ScanGenerator {
    /// Create a generator; fails on an unusable config.
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| TestdataError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            currents: config.currents(),
            config,
            rng,
            noise,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Rows of one signal scan.
    pub fn signal_rows(&mut self) -> Vec<Vec<f64>> {
        let lineshape = self.config.lineshape.clone();
        self.rows(|current| lineshape.value(current))
    }

    /// Rows of one reference scan (baseline only).
    pub fn reference_rows(&mut self) -> Vec<Vec<f64>> {
        self.rows(|_| 0.0)
    }

    fn rows(&mut self, resonance: impl Fn(f64) -> f64) -> Vec<Vec<f64>> {
        let n = self.config.iterations;
        let (sin, cos) = self.config.phase.sin_cos();
        let mut rows = Vec::with_capacity(self.currents.len());

        for &current in &self.currents {
            let ideal = resonance(current);
            let ideal_i = self.config.baseline_i + ideal * cos;
            let ideal_q = self.config.baseline_q + ideal * sin;

            let mut row = Vec::with_capacity(1 + 2 * n);
            row.push(current);
            for _ in 0..n {
                row.push(ideal_i + self.noise.sample(&mut self.rng));
            }
            for _ in 0..n {
                row.push(ideal_q + self.noise.sample(&mut self.rng));
            }
            rows.push(row);
        }

        rows
    }
}

/// Wrap rows in the message body the instrument publishes.
pub fn scan_payload(rows: &[Vec<f64>]) -> Value {
    json!({ "payload": rows })
}
