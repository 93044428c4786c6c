//! Run configuration.
//!
//! One flat, immutable [`BenchmarkConfig`] is threaded through protocol
//! preparation, the harness and the comparison engine. There is no global
//! state: seeds come from `run_seed` through [`crate::seed`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::protocols::ProtocolKind;

/// Configuration for one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Human-readable run name carried into the record.
    pub run_name: String,
    /// Root of every derived seed.
    pub run_seed: u64,
    /// Protocols to compare, in report order.
    pub protocols: Vec<ProtocolKind>,
    /// Strictly increasing total-shot budgets.
    pub shot_grid: Vec<u64>,
    /// Independent replicates per (protocol, budget).
    pub replicates: usize,
    /// Squared-error target used by the N* criteria.
    pub target_epsilon: f64,
    /// Target failure probability; sets the median-of-means batch count.
    pub delta: f64,
    /// Pilot fractions for pilot-based protocol selection.
    pub pilot_fractions: Vec<f64>,
    /// Target budget for pilot selection (largest grid budget when `None`).
    pub pilot_target_n: Option<u64>,
    /// Add pilot and target budgets to the evaluated grid so selection uses exact budgets.
    pub evaluate_pilot_budgets: bool,
    /// Share of the budget `direct_optimized` spends on its variance pilot.
    pub optimized_pilot_fraction: f64,
    /// Calibration shots for `classical_shadows_v1_mem`, spent once per run.
    pub calibration_shots: usize,
    /// Bootstrap resamples for shot-savings confidence intervals.
    pub bootstrap_resamples: usize,
    /// Significance level of the paired difference test.
    pub significance_alpha: f64,
    /// Worker threads for the harness (0 = available parallelism).
    pub workers: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            run_name: "shotbench".to_string(),
            run_seed: 0,
            protocols: ProtocolKind::ALL.to_vec(),
            shot_grid: vec![100, 300, 1000, 3000, 10000],
            replicates: 20,
            target_epsilon: 0.01,
            delta: 0.05,
            pilot_fractions: vec![0.02, 0.05, 0.10, 0.20],
            pilot_target_n: None,
            evaluate_pilot_budgets: true,
            optimized_pilot_fraction: 0.1,
            calibration_shots: 3000,
            bootstrap_resamples: 1000,
            significance_alpha: 0.05,
            workers: 0,
        }
    }
}

/// Check that a shot grid is non-empty, positive and strictly increasing.
pub fn validate_shot_grid(grid: &[u64]) -> Result<()> {
    if grid.is_empty() {
        return Err(BenchError::EmptyShotGrid);
    }
    if grid.contains(&0) {
        return Err(BenchError::ZeroShotBudget);
    }
    for pair in grid.windows(2) {
        if pair[1] <= pair[0] {
            return Err(BenchError::NonIncreasingShotGrid {
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

fn validate_fraction(f: f64) -> Result<()> {
    if f.is_finite() && f > 0.0 && f <= 1.0 {
        Ok(())
    } else {
        Err(BenchError::InvalidFraction(f))
    }
}

impl BenchmarkConfig {
    /// Reject malformed configuration before any shots are spent.
    pub fn validate(&self) -> Result<()> {
        validate_shot_grid(&self.shot_grid)?;
        if self.replicates == 0 {
            return Err(BenchError::ZeroReplicates);
        }
        if self.protocols.is_empty() {
            return Err(BenchError::EmptyProtocolList);
        }
        let mut seen = HashSet::new();
        for p in &self.protocols {
            if !seen.insert(*p) {
                return Err(BenchError::DuplicateProtocol(p.to_string()));
            }
        }
        if !(self.target_epsilon.is_finite() && self.target_epsilon > 0.0) {
            return Err(BenchError::InvalidEpsilon(self.target_epsilon));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(BenchError::InvalidDelta(self.delta));
        }
        for &f in &self.pilot_fractions {
            validate_fraction(f)?;
        }
        validate_fraction(self.optimized_pilot_fraction)?;
        if !(self.significance_alpha > 0.0 && self.significance_alpha < 1.0) {
            return Err(BenchError::InvalidFraction(self.significance_alpha));
        }
        if self.pilot_target_n == Some(0) {
            return Err(BenchError::ZeroShotBudget);
        }
        Ok(())
    }

    /// Target budget for pilot selection.
    pub fn pilot_target(&self) -> u64 {
        self.pilot_target_n
            .or_else(|| self.shot_grid.last().copied())
            .unwrap_or(0)
    }

    /// Pilot budget requested for fraction `f`: `round(f * target)`.
    pub fn requested_pilot_budget(&self, fraction: f64) -> u64 {
        (fraction * self.pilot_target() as f64).round() as u64
    }

    /// Budgets the harness actually evaluates.
    ///
    /// The configured grid, plus (when `evaluate_pilot_budgets` is set) the pilot
    /// target and every non-zero pilot budget. Sorted and deduplicated.
    pub fn evaluation_grid(&self) -> Vec<u64> {
        let mut grid = self.shot_grid.clone();
        if self.evaluate_pilot_budgets && !self.pilot_fractions.is_empty() {
            grid.push(self.pilot_target());
            for &f in &self.pilot_fractions {
                grid.push(self.requested_pilot_budget(f));
            }
        }
        grid.retain(|&n| n > 0);
        grid.sort_unstable();
        grid.dedup();
        grid
    }

    /// Worker count with `0` resolved to the machine's parallelism.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
