//! Classical shadows with random single-qubit Pauli measurements.
//!
//! Every shot measures each qubit in a uniformly random X/Y/Z basis. Inverting
//! the measurement channel gives, for a Pauli string `P` with support `S`, the
//! single-shot snapshot
//!
//! ```text
//!   ô = Π_{q ∈ S} c(q, b_q) · s_q    if every b_q matches P on S, else 0
//! ```
//!
//! where `s_q = ±1` is the outcome and `c = 3` for the plain channel. The
//! mitigated channel uses `c = 3 / f(q, b)` with the calibrated measurement
//! fidelity `f`, which undoes the shrinkage readout and rotation noise apply
//! to each factor. Snapshots are combined by median-of-means.

use rand::Rng;
use rand::rngs::StdRng;

use super::ObservableEstimate;
use crate::backend::ShotBackend;
use crate::calibration::FidelityTable;
use crate::error::{AcquisitionError, BenchError, Result};
use crate::observable::ObservableSet;
use crate::pauli::{Basis, MeasurementSetting, PauliString};

/// Median-of-means batch count `ceil(2 ln(2M/δ))`, clamped to `[1, shots]`.
pub fn batch_count(num_observables: usize, delta: f64, shots: usize) -> usize {
    let m = num_observables.max(1) as f64;
    let k = (2.0 * (2.0 * m / delta).ln()).ceil();
    let k = if k.is_finite() && k >= 1.0 { k as usize } else { 1 };
    k.clamp(1, shots.max(1))
}

/// Median of `k` batch means; batch sizes differ by at most one.
///
/// NaN for an empty input.
pub fn median_of_means(values: &[f64], k: usize) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let k = k.clamp(1, n);
    let base = n / k;
    let extra = n % k;

    let mut means = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        let batch = &values[start..start + len];
        means.push(batch.iter().sum::<f64>() / len as f64);
        start += len;
    }
    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if k % 2 == 1 {
        means[k / 2]
    } else {
        (means[k / 2 - 1] + means[k / 2]) / 2.0
    }
}

/// Random-Pauli shadow estimator, plain or fidelity-mitigated.
#[derive(Debug, Clone)]
pub struct ClassicalShadows {
    delta: f64,
    fidelity: Option<FidelityTable>,
}

impl ClassicalShadows {
    /// Plain inverse channel (`c = 3`).
    pub fn plain(delta: f64) -> Result<Self> {
        Self::validate_delta(delta)?;
        Ok(Self {
            delta,
            fidelity: None,
        })
    }

    /// Inverse channel corrected by a calibrated fidelity table.
    pub fn mitigated(delta: f64, table: FidelityTable) -> Result<Self> {
        Self::validate_delta(delta)?;
        Ok(Self {
            delta,
            fidelity: Some(table),
        })
    }

    fn validate_delta(delta: f64) -> Result<()> {
        if delta > 0.0 && delta < 1.0 {
            Ok(())
        } else {
            Err(BenchError::InvalidDelta(delta))
        }
    }

    pub fn fidelity_table(&self) -> Option<&FidelityTable> {
        self.fidelity.as_ref()
    }

    fn factor(&self, q: usize, basis: Basis) -> f64 {
        match &self.fidelity {
            Some(table) if q < table.num_qubits() => 3.0 / table.get(q, basis),
            _ => 3.0,
        }
    }

    /// Largest snapshot magnitude for `pauli`, which also bounds the estimate.
    pub fn snapshot_bound(&self, pauli: &PauliString) -> f64 {
        pauli
            .support()
            .filter_map(|(q, p)| p.basis().map(|b| self.factor(q, b)))
            .product()
    }

    fn snapshot(&self, pauli: &PauliString, bases: &[Basis], outcome: u64) -> f64 {
        let mut value = 1.0;
        for (q, p) in pauli.support() {
            if p.basis() != Some(bases[q]) {
                return 0.0;
            }
            let sign = if outcome & (1u64 << q) != 0 { -1.0 } else { 1.0 };
            value *= self.factor(q, bases[q]) * sign;
        }
        value
    }

    pub fn estimate(
        &self,
        backend: &dyn ShotBackend,
        observables: &ObservableSet,
        budget: u64,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<ObservableEstimate>, AcquisitionError> {
        let shots = budget as usize;
        if shots == 0 {
            return Ok(vec![ObservableEstimate::undefined(); observables.len()]);
        }
        let n_qubits = observables.num_qubits();
        let settings: Vec<MeasurementSetting> = (0..shots)
            .map(|_| {
                MeasurementSetting::new(
                    (0..n_qubits)
                        .map(|_| Basis::ALL[rng.random_range(0..3)])
                        .collect(),
                )
            })
            .collect();
        let outcomes = backend.sample_each(&settings, rng)?;

        let k = batch_count(observables.len(), self.delta, shots);
        let mut snapshots = vec![0.0; outcomes.len()];
        let estimates = observables
            .iter()
            .map(|obs| {
                for ((slot, setting), &outcome) in
                    snapshots.iter_mut().zip(&settings).zip(&outcomes)
                {
                    *slot = self.snapshot(&obs.pauli, setting.bases(), outcome);
                }
                let n = snapshots.len() as f64;
                let mean = snapshots.iter().sum::<f64>() / n;
                let var = snapshots.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
                ObservableEstimate {
                    value: median_of_means(&snapshots, k),
                    shots_used: snapshots.len() as u64,
                    std_error: (var / n).sqrt(),
                }
            })
            .collect();
        Ok(estimates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceNoise, ProductState, ProductStateBackend};
    use crate::calibration::calibrate;
    use crate::observable::GroundTruthProvider;
    use rand::SeedableRng;

    #[test]
    fn test_batch_count() {
        // 2 ln(2 * 10 / 0.05) = 2 ln 400 ≈ 11.98
        assert_eq!(batch_count(10, 0.05, 1000), 12);
        assert_eq!(batch_count(10, 0.05, 5), 5);
        assert_eq!(batch_count(1, 0.9, 100), 2);
        assert_eq!(batch_count(0, 0.05, 0), 1);
    }

    #[test]
    fn test_median_of_means() {
        assert_eq!(median_of_means(&[1.0, 2.0, 3.0], 1), 2.0);
        assert_eq!(median_of_means(&[1.0, 2.0, 3.0], 3), 2.0);
        // Batches [1, 2], [3, 100] -> means 1.5, 51.5 -> median 26.5
        assert_eq!(median_of_means(&[1.0, 2.0, 3.0, 100.0], 2), 26.5);
        // Batches [0, 0], [0], [9] -> means 0, 0, 9
        assert_eq!(median_of_means(&[0.0, 0.0, 0.0, 9.0], 3), 0.0);
        assert!(median_of_means(&[], 3).is_nan());
    }

    #[test]
    fn test_snapshot_rules() {
        let shadows = ClassicalShadows::plain(0.05).unwrap();
        let zx = PauliString::parse("ZX").unwrap();
        let matched = [Basis::Z, Basis::X];
        let mismatched = [Basis::Z, Basis::Y];
        assert_eq!(shadows.snapshot(&zx, &matched, 0b00), 9.0);
        assert_eq!(shadows.snapshot(&zx, &matched, 0b01), -9.0);
        assert_eq!(shadows.snapshot(&zx, &matched, 0b11), 9.0);
        assert_eq!(shadows.snapshot(&zx, &mismatched, 0b00), 0.0);
        assert_eq!(shadows.snapshot_bound(&zx), 9.0);
    }

    #[test]
    fn test_mitigated_factor_uses_fidelity() {
        let table = FidelityTable {
            fidelities: vec![[0.5, 1.0, 0.8]],
            shots_per_basis: 100,
        };
        let shadows = ClassicalShadows::mitigated(0.05, table).unwrap();
        let x = PauliString::parse("X").unwrap();
        let z = PauliString::parse("Z").unwrap();
        assert_eq!(shadows.snapshot_bound(&x), 6.0);
        assert!((shadows.snapshot_bound(&z) - 3.75).abs() < 1e-12);
    }

    #[test]
    fn test_plain_shadows_converge_on_ideal_device() {
        let state = ProductState::random(3, 8).unwrap();
        let backend = ProductStateBackend::ideal(state.clone());
        let obs = ObservableSet::from_labels(&["ZII", "IXI", "IIY", "ZXI"]).unwrap();
        let shadows = ClassicalShadows::plain(0.05).unwrap();
        let est = shadows
            .estimate(&backend, &obs, 60_000, &mut StdRng::seed_from_u64(1))
            .unwrap();
        for (o, e) in obs.iter().zip(&est) {
            let truth = state.expectation(&o.pauli).unwrap();
            assert!((e.value - truth).abs() < 0.08, "{}: {} vs {truth}", o.id, e.value);
            assert!(e.value.abs() <= shadows.snapshot_bound(&o.pauli));
        }
    }

    #[test]
    fn test_mitigation_removes_readout_bias() {
        let state = ProductState::zero(2).unwrap();
        let noise = DeviceNoise::uniform(2, 0.1, 0.0);
        let backend = ProductStateBackend::new(state, noise).unwrap();
        let obs = ObservableSet::from_labels(&["ZZ"]).unwrap();
        let table = calibrate(&backend, 2, 60_000, 3).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let plain = ClassicalShadows::plain(0.05)
            .unwrap()
            .estimate(&backend, &obs, 90_000, &mut rng)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mitigated = ClassicalShadows::mitigated(0.05, table)
            .unwrap()
            .estimate(&backend, &obs, 90_000, &mut rng)
            .unwrap();

        // Readout error shrinks <ZZ> = 1 to 0.8^2 = 0.64.
        assert!((plain[0].value - 0.64).abs() < 0.1, "plain {}", plain[0].value);
        assert!((mitigated[0].value - 1.0).abs() < 0.1, "mitigated {}", mitigated[0].value);
    }

    #[test]
    fn test_zero_budget_is_undefined() {
        let backend = ProductStateBackend::ideal(ProductState::zero(1).unwrap());
        let obs = ObservableSet::from_labels(&["Z"]).unwrap();
        let est = ClassicalShadows::plain(0.05)
            .unwrap()
            .estimate(&backend, &obs, 0, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(est[0].value.is_nan());
    }
}
