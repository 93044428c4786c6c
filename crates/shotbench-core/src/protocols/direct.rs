//! Direct-measurement baselines.
//!
//! All three read ±1 parities straight from the backend. They differ only in
//! how the budget is spread:
//! - naive: one setting per observable, even split,
//! - grouped: one setting per QWC group, even split,
//! - optimized: one setting per QWC group, split from a variance pilot.

use rand::rngs::StdRng;

use super::{ObservableEstimate, parity_estimate};
use crate::backend::ShotBackend;
use crate::error::{AcquisitionError, BenchError, Result};
use crate::grouping::group_setting;
use crate::observable::ObservableSet;
use crate::pauli::PauliString;

/// Split `total` into `parts` near-equal shares; the remainder goes to the first parts.
pub fn even_split(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts as u64;
    let extra = (total % parts as u64) as usize;
    (0..parts)
        .map(|i| base + u64::from(i < extra))
        .collect()
}

/// Split `total` proportionally to `weights` with largest-remainder rounding.
///
/// The shares always sum to `total`. Falls back to [`even_split`] when no
/// weight is positive.
pub fn proportional_split(total: u64, weights: &[f64]) -> Vec<u64> {
    let clean: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let sum: f64 = clean.iter().sum();
    if sum <= 0.0 {
        return even_split(total, weights.len());
    }

    let ideal: Vec<f64> = clean.iter().map(|w| total as f64 * w / sum).collect();
    let mut shares: Vec<u64> = ideal.iter().map(|x| x.floor() as u64).collect();
    let assigned: u64 = shares.iter().sum();
    let mut leftover = total.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = ideal[a] - ideal[a].floor();
        let rb = ideal[b] - ideal[b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for &i in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        shares[i] += 1;
        leftover -= 1;
    }
    shares
}

/// Running ±1 sums per observable.
#[derive(Debug, Clone)]
struct ParityTally {
    sums: Vec<f64>,
    shots: Vec<u64>,
}

impl ParityTally {
    fn new(n: usize) -> Self {
        Self {
            sums: vec![0.0; n],
            shots: vec![0; n],
        }
    }

    fn add(&mut self, index: usize, pauli: &PauliString, outcomes: &[u64]) {
        self.sums[index] += outcomes.iter().map(|&o| pauli.parity(o)).sum::<f64>();
        self.shots[index] += outcomes.len() as u64;
    }

    fn mean(&self, index: usize) -> f64 {
        if self.shots[index] == 0 {
            f64::NAN
        } else {
            self.sums[index] / self.shots[index] as f64
        }
    }

    fn finish(&self) -> Vec<ObservableEstimate> {
        self.sums
            .iter()
            .zip(&self.shots)
            .map(|(&sum, &shots)| parity_estimate(sum, shots))
            .collect()
    }
}

/// Measure every group with its allocated shots and tally member parities.
fn measure_groups(
    backend: &dyn ShotBackend,
    observables: &ObservableSet,
    allocation: &[u64],
    tally: &mut ParityTally,
    rng: &mut StdRng,
) -> std::result::Result<(), AcquisitionError> {
    for (members, &shots) in observables.groups().iter().zip(allocation) {
        if shots == 0 {
            continue;
        }
        let paulis: Vec<&PauliString> = members
            .iter()
            .map(|&i| &observables.as_slice()[i].pauli)
            .collect();
        let setting = group_setting(observables.num_qubits(), &paulis);
        let outcomes = backend.sample(&setting, shots as usize, rng)?;
        for &i in members {
            tally.add(i, &observables.as_slice()[i].pauli, &outcomes);
        }
    }
    Ok(())
}

/// One setting per observable, `budget / |observables|` shots each.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectNaive;

impl DirectNaive {
    pub fn estimate(
        &self,
        backend: &dyn ShotBackend,
        observables: &ObservableSet,
        budget: u64,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<ObservableEstimate>, AcquisitionError> {
        let allocation = even_split(budget, observables.len());
        let mut tally = ParityTally::new(observables.len());
        for (i, (obs, &shots)) in observables.iter().zip(&allocation).enumerate() {
            if shots == 0 {
                continue;
            }
            let outcomes = backend.sample(&obs.pauli.measurement_setting(), shots as usize, rng)?;
            tally.add(i, &obs.pauli, &outcomes);
        }
        Ok(tally.finish())
    }
}

/// QWC groups share shots; the budget is split evenly across groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectGrouped;

impl DirectGrouped {
    pub fn estimate(
        &self,
        backend: &dyn ShotBackend,
        observables: &ObservableSet,
        budget: u64,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<ObservableEstimate>, AcquisitionError> {
        let allocation = even_split(budget, observables.groups().len());
        let mut tally = ParityTally::new(observables.len());
        measure_groups(backend, observables, &allocation, &mut tally, rng)?;
        Ok(tally.finish())
    }
}

/// QWC groups with shots allocated ∝ sqrt of each group's summed single-shot variance.
#[derive(Debug, Clone, Copy)]
pub struct DirectOptimized {
    pilot_fraction: f64,
}

impl DirectOptimized {
    pub fn new(pilot_fraction: f64) -> Result<Self> {
        if !(pilot_fraction > 0.0 && pilot_fraction <= 1.0) {
            return Err(BenchError::InvalidFraction(pilot_fraction));
        }
        Ok(Self { pilot_fraction })
    }

    pub fn pilot_fraction(&self) -> f64 {
        self.pilot_fraction
    }

    /// Shots `budget` reserves for the pilot.
    pub fn pilot_shots(&self, budget: u64) -> u64 {
        ((budget as f64 * self.pilot_fraction).round() as u64).min(budget)
    }

    pub fn estimate(
        &self,
        backend: &dyn ShotBackend,
        observables: &ObservableSet,
        budget: u64,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<ObservableEstimate>, AcquisitionError> {
        let n_groups = observables.groups().len();
        let pilot_total = self.pilot_shots(budget);
        if pilot_total < n_groups as u64 {
            log::debug!(
                "direct_optimized: pilot of {pilot_total} shots cannot cover {n_groups} groups, using even split"
            );
            return DirectGrouped.estimate(backend, observables, budget, rng);
        }

        let mut tally = ParityTally::new(observables.len());
        let pilot = even_split(pilot_total, n_groups);
        measure_groups(backend, observables, &pilot, &mut tally, rng)?;

        let weights: Vec<f64> = observables
            .groups()
            .iter()
            .map(|members| {
                members
                    .iter()
                    .map(|&i| {
                        let m = tally.mean(i);
                        let floor = 1.0 / (tally.shots[i] as f64 + 1.0);
                        (1.0 - m * m).max(floor)
                    })
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();
        let main = proportional_split(budget - pilot_total, &weights);
        measure_groups(backend, observables, &main, &mut tally, rng)?;
        Ok(tally.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProductState, ProductStateBackend};
    use crate::observable::GroundTruthProvider;
    use rand::SeedableRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_even_split_distributes_remainder_first() {
        assert_eq!(even_split(10, 3), vec![4, 3, 3]);
        assert_eq!(even_split(2, 4), vec![1, 1, 0, 0]);
        assert!(even_split(5, 0).is_empty());
    }

    #[test]
    fn test_proportional_split_sums_to_total() {
        let shares = proportional_split(100, &[1.0, 2.0, 1.0]);
        assert_eq!(shares.iter().sum::<u64>(), 100);
        assert_eq!(shares, vec![25, 50, 25]);

        let shares = proportional_split(10, &[1.0, 1.0, 1.0]);
        assert_eq!(shares, vec![4, 3, 3]);

        let shares = proportional_split(7, &[0.0, f64::NAN]);
        assert_eq!(shares, vec![4, 3]);
    }

    #[test]
    fn test_naive_zero_shot_observables_are_nan() {
        let backend = ProductStateBackend::ideal(ProductState::zero(2).unwrap());
        let obs = ObservableSet::from_labels(&["ZI", "IZ", "ZZ"]).unwrap();
        let est = DirectNaive
            .estimate(&backend, &obs, 2, &mut rng(0))
            .unwrap();
        assert_eq!(est[0].value, 1.0);
        assert_eq!(est[1].value, 1.0);
        assert!(est[2].value.is_nan());
        assert_eq!(est[2].shots_used, 0);
    }

    #[test]
    fn test_grouped_reads_members_from_shared_shots() {
        let backend = ProductStateBackend::ideal(ProductState::zero(3).unwrap());
        let obs = ObservableSet::from_labels(&["ZII", "IZI", "ZZZ"]).unwrap();
        assert_eq!(obs.groups().len(), 1);
        let est = DirectGrouped
            .estimate(&backend, &obs, 90, &mut rng(1))
            .unwrap();
        for e in &est {
            assert_eq!(e.value, 1.0);
            assert_eq!(e.shots_used, 90);
            assert_eq!(e.std_error, 0.0);
        }
    }

    #[test]
    fn test_optimized_spends_exact_budget_and_favours_noisy_groups() {
        // Qubit 0 is an eigenstate of Z, qubit 1 sits on the equator for Z.
        let state = ProductState::new(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]).unwrap();
        let backend = ProductStateBackend::ideal(state);
        let obs = ObservableSet::from_labels(&["ZI", "XI", "IZ"]).unwrap();
        let protocol = DirectOptimized::new(0.1).unwrap();
        let est = protocol
            .estimate(&backend, &obs, 1000, &mut rng(2))
            .unwrap();

        let groups = obs.groups();
        let spent: u64 = groups
            .iter()
            .map(|members| est[members[0]].shots_used)
            .sum();
        assert_eq!(spent, 1000);

        // "ZI" and "IZ" share a group; "XI" has variance 1 on its own.
        let zi = &est[0];
        let xi = &est[1];
        assert_eq!(zi.shots_used, est[2].shots_used);
        assert!(xi.shots_used > 0);
        assert_eq!(zi.value, 1.0);
    }

    #[test]
    fn test_optimized_falls_back_when_pilot_too_small() {
        let backend = ProductStateBackend::ideal(ProductState::plus(2).unwrap());
        let obs = ObservableSet::from_labels(&["XI", "ZI", "YI"]).unwrap();
        let protocol = DirectOptimized::new(0.1).unwrap();
        assert_eq!(protocol.pilot_shots(20), 2);
        let a = protocol.estimate(&backend, &obs, 20, &mut rng(3)).unwrap();
        let b = DirectGrouped.estimate(&backend, &obs, 20, &mut rng(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_direct_estimates_converge_to_truth() {
        let state = ProductState::random(3, 21).unwrap();
        let backend = ProductStateBackend::ideal(state.clone());
        let obs = ObservableSet::from_labels(&["XYI", "IZZ", "ZIX"]).unwrap();
        for protocol in [0u8, 1, 2] {
            let est = match protocol {
                0 => DirectNaive.estimate(&backend, &obs, 60_000, &mut rng(9)),
                1 => DirectGrouped.estimate(&backend, &obs, 60_000, &mut rng(9)),
                _ => DirectOptimized::new(0.1)
                    .unwrap()
                    .estimate(&backend, &obs, 60_000, &mut rng(9)),
            }
            .unwrap();
            for (o, e) in obs.iter().zip(&est) {
                let truth = state.expectation(&o.pauli).unwrap();
                assert!(
                    (e.value - truth).abs() < 0.05,
                    "{}: {} vs {truth}",
                    o.id,
                    e.value
                );
            }
        }
    }

    #[test]
    fn test_invalid_pilot_fraction() {
        assert!(DirectOptimized::new(0.0).is_err());
        assert!(DirectOptimized::new(1.5).is_err());
    }
}
