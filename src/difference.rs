// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Signal minus reference, with uncertainty propagated in quadrature.

use crate::channel::{ChannelSnapshot, ErrorBars};
use serde::{Deserialize, Serialize};

/// How the difference channel is presented to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffDisplay {
    /// Raw difference with error bars
    #[default]
    Absolute,
    /// Difference divided by its propagated error
    Sigma,
}

/// Pointwise difference of two aligned snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifferenceResult {
    pub i: Vec<f64>,
    pub q: Vec<f64>,
    /// `sqrt(a² + b²)` per point; present only when both sides had errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorBars>,
}

/// Curves ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffCurves {
    pub i: Vec<f64>,
    pub q: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorBars>,
}

impl DifferenceResult {
    /// Difference in units of its own propagated error.
    ///
    /// Returns `None` when no error bars exist. A point whose error is zero
    /// (or not finite) yields `f64::NAN`.
    pub fn sigma(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let errors = self.errors.as_ref()?;
        Some((
            sigma_units(&self.i, &errors.i),
            sigma_units(&self.q, &errors.q),
        ))
    }

    /// Curves for the requested presentation
    pub fn render(&self, display: DiffDisplay) -> Option<DiffCurves> {
        match display {
            DiffDisplay::Absolute => Some(DiffCurves {
                i: self.i.clone(),
                q: self.q.clone(),
                errors: self.errors.clone(),
            }),
            DiffDisplay::Sigma => self.sigma().map(|(i, q)| DiffCurves { i, q, errors: None }),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.i.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

fn sigma_units(values: &[f64], errors: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(errors)
        .map(|(value, err)| {
            if *err == 0.0 || !err.is_finite() {
                f64::NAN
            } else {
                value / err
            }
        })
        .collect()
}

/// Compute `signal - reference`.
///
/// Returns `None` unless both snapshots exist and their `i` and `q` arrays
/// have equal lengths. Error bars are combined only when both sides carry
/// them with matching lengths.
pub fn diff(
    signal: Option<&ChannelSnapshot>,
    reference: Option<&ChannelSnapshot>,
) -> Option<DifferenceResult> {
    let (signal, reference) = (signal?, reference?);
    let (sig, refc) = (&signal.channel, &reference.channel);

    if sig.i.len() != refc.i.len() || sig.q.len() != refc.q.len() {
        return None;
    }

    let errors = match (&signal.errors, &reference.errors) {
        (Some(a), Some(b))
            if a.i.len() == sig.i.len()
                && b.i.len() == sig.i.len()
                && a.q.len() == sig.q.len()
                && b.q.len() == sig.q.len() =>
        {
            Some(ErrorBars {
                i: quadrature(&a.i, &b.i),
                q: quadrature(&a.q, &b.q),
            })
        }
        _ => None,
    };

    Some(DifferenceResult {
        i: subtract(&sig.i, &refc.i),
        q: subtract(&sig.q, &refc.q),
        errors,
    })
}

fn subtract(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

fn quadrature(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| (x * x + y * y).sqrt()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::AveragedChannel;
    use approx::assert_relative_eq;

    fn snapshot(i: &[f64], q: &[f64]) -> ChannelSnapshot {
        ChannelSnapshot::new(AveragedChannel {
            currents: (0..i.len()).map(|k| k as f64).collect(),
            i: i.to_vec(),
            q: q.to_vec(),
        })
    }

    fn snapshot_err(i: &[f64], q: &[f64], err_i: &[f64], err_q: &[f64]) -> ChannelSnapshot {
        let mut snap = snapshot(i, q);
        snap.errors = Some(ErrorBars {
            i: err_i.to_vec(),
            q: err_q.to_vec(),
        });
        snap
    }

    #[test]
    fn test_plain_difference() {
        let signal = snapshot(&[10.0, 20.0], &[12.0, 22.0]);
        let reference = snapshot(&[4.0, 8.0], &[6.0, 10.0]);
        let result = diff(Some(&signal), Some(&reference)).unwrap();

        assert_eq!(result.i, vec![6.0, 12.0]);
        assert_eq!(result.q, vec![6.0, 12.0]);
        assert!(result.errors.is_none());
    }

    #[test]
    fn test_quadrature_errors() {
        let signal = snapshot_err(&[1.0], &[1.0], &[3.0], &[1.0]);
        let reference = snapshot_err(&[0.0], &[0.0], &[4.0], &[1.0]);
        let result = diff(Some(&signal), Some(&reference)).unwrap();

        let errors = result.errors.unwrap();
        assert_relative_eq!(errors.i[0], 5.0);
        assert_relative_eq!(errors.q[0], 2f64.sqrt());
    }

    #[test]
    fn test_one_sided_errors_are_dropped() {
        let signal = snapshot_err(&[1.0], &[1.0], &[3.0], &[1.0]);
        let reference = snapshot(&[0.0], &[0.0]);
        let result = diff(Some(&signal), Some(&reference)).unwrap();
        assert!(result.errors.is_none());
    }

    #[test]
    fn test_length_mismatch_is_absent() {
        let signal = snapshot(&[1.0, 2.0], &[1.0, 2.0]);
        let reference = snapshot(&[1.0], &[1.0]);
        assert!(diff(Some(&signal), Some(&reference)).is_none());
    }

    #[test]
    fn test_missing_side_is_absent() {
        let signal = snapshot(&[1.0], &[1.0]);
        assert!(diff(Some(&signal), None).is_none());
        assert!(diff(None, Some(&signal)).is_none());
    }

    #[test]
    fn test_sigma_units() {
        let signal = snapshot_err(&[6.0, 1.0], &[4.0, 0.0], &[3.0, 0.0], &[2.0, 0.0]);
        let reference = snapshot_err(&[0.0, 0.0], &[0.0, 0.0], &[4.0, 0.0], &[0.0, 0.0]);
        let result = diff(Some(&signal), Some(&reference)).unwrap();

        let (si, sq) = result.sigma().unwrap();
        assert_relative_eq!(si[0], 6.0 / 5.0);
        assert_relative_eq!(sq[0], 2.0);
        // zero propagated error
        assert!(si[1].is_nan());
        assert!(sq[1].is_nan());
    }

    #[test]
    fn test_sigma_without_errors_is_absent() {
        let signal = snapshot(&[1.0], &[1.0]);
        let reference = snapshot(&[0.0], &[0.0]);
        let result = diff(Some(&signal), Some(&reference)).unwrap();

        assert!(result.sigma().is_none());
        assert!(result.render(DiffDisplay::Sigma).is_none());
        let curves = result.render(DiffDisplay::Absolute).unwrap();
        assert_eq!(curves.i, vec![1.0]);
    }
}
