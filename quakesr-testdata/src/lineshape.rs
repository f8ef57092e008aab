// QUAK/ESR Testdata - Resonance lineshapes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Resonance lineshapes as seen by a lock-in detector.
//!
//! Field modulation makes the detector report the first derivative of the
//! absorption line, so the shapes below are derivatives. The argument is
//! the coil current standing in for the magnetic field.

use serde::{Deserialize, Serialize};

/// Lineshape definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lineshape {
    /// No resonance; the detector only sees its baseline.
    Flat,

    /// First derivative of a Lorentzian.
    ///
    /// `value = amplitude * -2u / (1 + u^2)^2` with `u = (x - center) / width`
    LorentzianDerivative {
        center: f64,
        width: f64,
        amplitude: f64,
    },

    /// First derivative of a Gaussian.
    ///
    /// `value = amplitude * -u * exp(-u^2 / 2)` with `u = (x - center) / width`
    GaussianDerivative {
        center: f64,
        width: f64,
        amplitude: f64,
    },
}

impl Default for Lineshape {
    fn default() -> Self {
        Lineshape::LorentzianDerivative {
            center: 0.0,
            width: 1.0,
            amplitude: 1.0,
        }
    }
}

impl Lineshape {
    /// Evaluate at a coil current.
    pub fn value(&self, current: f64) -> f64 {
        match *self {
            Lineshape::Flat => 0.0,
            Lineshape::LorentzianDerivative {
                center,
                width,
                amplitude,
            } => {
                let u = (current - center) / width;
                let denom = 1.0 + u * u;
                amplitude * -2.0 * u / (denom * denom)
            }
            Lineshape::GaussianDerivative {
                center,
                width,
                amplitude,
            } => {
                let u = (current - center) / width;
                amplitude * -u * (-u * u / 2.0).exp()
            }
        }
    }

    /// Resonance position, if any.
    pub fn center(&self) -> Option<f64> {
        match *self {
            Lineshape::Flat => None,
            Lineshape::LorentzianDerivative { center, .. }
            | Lineshape::GaussianDerivative { center, .. } => Some(center),
        }
    }
}
