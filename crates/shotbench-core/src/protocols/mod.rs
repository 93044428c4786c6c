//! Shot-allocation and estimation protocols.
//!
//! [`ProtocolKind`] is the configuration-time identifier; [`Protocol`] is the
//! prepared, closed set of variants the harness executes. Preparation resolves
//! everything that is fixed for a run (the shadow fidelity table in
//! particular), so [`Protocol::estimate`] is a pure function of the budget and
//! the seed plus the outcomes the backend returns.

pub mod direct;
pub mod shadows;

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::backend::{CalibrationProvider, ShotBackend};
use crate::calibration::calibrate;
use crate::config::BenchmarkConfig;
use crate::error::{AcquisitionError, BenchError, Result};
use crate::observable::{Observable, ObservableSet};
use crate::seed::derive_stream_seed;

pub use direct::{DirectGrouped, DirectNaive, DirectOptimized};
pub use shadows::ClassicalShadows;

/// Protocol identifier as it appears in configuration and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    DirectNaive,
    DirectGrouped,
    DirectOptimized,
    ClassicalShadowsV0,
    ClassicalShadowsV1Mem,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 5] = [
        ProtocolKind::DirectNaive,
        ProtocolKind::DirectGrouped,
        ProtocolKind::DirectOptimized,
        ProtocolKind::ClassicalShadowsV0,
        ProtocolKind::ClassicalShadowsV1Mem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectNaive => "direct_naive",
            Self::DirectGrouped => "direct_grouped",
            Self::DirectOptimized => "direct_optimized",
            Self::ClassicalShadowsV0 => "classical_shadows_v0",
            Self::ClassicalShadowsV1Mem => "classical_shadows_v1_mem",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DirectNaive => "one basis per observable, budget split evenly",
            Self::DirectGrouped => "qubit-wise commuting groups share shots, even split",
            Self::DirectOptimized => "commuting groups, shots allocated from a variance pilot",
            Self::ClassicalShadowsV0 => "random Pauli shadows, median-of-means",
            Self::ClassicalShadowsV1Mem => "random Pauli shadows with calibrated readout mitigation",
        }
    }

    /// Whether preparation needs a [`CalibrationProvider`].
    pub fn needs_calibration(self) -> bool {
        matches!(self, Self::ClassicalShadowsV1Mem)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BenchError::UnknownProtocol(s.to_string()))
    }
}

/// One protocol's output for one observable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservableEstimate {
    /// Estimated expectation value; NaN when no shot informed it.
    pub value: f64,
    /// Shots that contributed to this estimate.
    pub shots_used: u64,
    /// Estimated standard error of `value` (NaN when undefined).
    pub std_error: f64,
}

impl ObservableEstimate {
    pub(crate) fn undefined() -> Self {
        Self {
            value: f64::NAN,
            shots_used: 0,
            std_error: f64::NAN,
        }
    }
}

/// A prepared protocol, ready to run at any budget.
#[derive(Debug, Clone)]
pub enum Protocol {
    DirectNaive(DirectNaive),
    DirectGrouped(DirectGrouped),
    DirectOptimized(DirectOptimized),
    ClassicalShadowsV0(ClassicalShadows),
    ClassicalShadowsV1Mem(ClassicalShadows),
}

impl Protocol {
    /// Prepare every protocol in `config.protocols`, in order.
    ///
    /// Calibration runs at most once, on its own seed stream, and only when a
    /// protocol in the list needs it.
    pub fn prepare_all(
        config: &BenchmarkConfig,
        observables: &ObservableSet,
        calibration: Option<&dyn CalibrationProvider>,
    ) -> Result<Vec<Protocol>> {
        config.validate()?;
        let needs_table = config.protocols.iter().any(|k| k.needs_calibration());
        let table = if needs_table {
            let provider = calibration.ok_or_else(|| {
                BenchError::MissingCalibration(ProtocolKind::ClassicalShadowsV1Mem.to_string())
            })?;
            Some(calibrate(
                provider,
                observables.num_qubits(),
                config.calibration_shots,
                derive_stream_seed(config.run_seed, "calibration", 0),
            )?)
        } else {
            None
        };

        config
            .protocols
            .iter()
            .map(|&kind| {
                Ok(match kind {
                    ProtocolKind::DirectNaive => Protocol::DirectNaive(DirectNaive),
                    ProtocolKind::DirectGrouped => Protocol::DirectGrouped(DirectGrouped),
                    ProtocolKind::DirectOptimized => Protocol::DirectOptimized(
                        DirectOptimized::new(config.optimized_pilot_fraction)?,
                    ),
                    ProtocolKind::ClassicalShadowsV0 => {
                        Protocol::ClassicalShadowsV0(ClassicalShadows::plain(config.delta)?)
                    }
                    ProtocolKind::ClassicalShadowsV1Mem => {
                        let table = table.clone().ok_or_else(|| {
                            BenchError::MissingCalibration(kind.to_string())
                        })?;
                        Protocol::ClassicalShadowsV1Mem(ClassicalShadows::mitigated(
                            config.delta,
                            table,
                        )?)
                    }
                })
            })
            .collect()
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::DirectNaive(_) => ProtocolKind::DirectNaive,
            Self::DirectGrouped(_) => ProtocolKind::DirectGrouped,
            Self::DirectOptimized(_) => ProtocolKind::DirectOptimized,
            Self::ClassicalShadowsV0(_) => ProtocolKind::ClassicalShadowsV0,
            Self::ClassicalShadowsV1Mem(_) => ProtocolKind::ClassicalShadowsV1Mem,
        }
    }

    /// Estimate every observable from `budget` total shots.
    ///
    /// Deterministic for fixed `(observables, budget, seed)` and a deterministic
    /// backend. Returns one estimate per observable, in set order.
    pub fn estimate(
        &self,
        backend: &dyn ShotBackend,
        observables: &ObservableSet,
        budget: u64,
        seed: u64,
    ) -> std::result::Result<Vec<ObservableEstimate>, AcquisitionError> {
        let mut rng = StdRng::seed_from_u64(seed);
        match self {
            Self::DirectNaive(p) => p.estimate(backend, observables, budget, &mut rng),
            Self::DirectGrouped(p) => p.estimate(backend, observables, budget, &mut rng),
            Self::DirectOptimized(p) => p.estimate(backend, observables, budget, &mut rng),
            Self::ClassicalShadowsV0(p) | Self::ClassicalShadowsV1Mem(p) => {
                p.estimate(backend, observables, budget, &mut rng)
            }
        }
    }

    /// Largest magnitude a valid estimate of `observable` can take.
    pub fn estimate_bound(&self, observable: &Observable) -> f64 {
        match self {
            Self::DirectNaive(_) | Self::DirectGrouped(_) | Self::DirectOptimized(_) => 1.0,
            Self::ClassicalShadowsV0(p) | Self::ClassicalShadowsV1Mem(p) => {
                p.snapshot_bound(&observable.pauli)
            }
        }
    }

    /// Reject estimates outside the protocol's valid range. NaN is allowed.
    pub fn check_estimates(
        &self,
        observables: &ObservableSet,
        estimates: &[ObservableEstimate],
    ) -> Result<()> {
        for (obs, est) in observables.iter().zip(estimates) {
            if est.value.is_nan() {
                continue;
            }
            let bound = self.estimate_bound(obs);
            if est.value.is_infinite() || est.value.abs() > bound * (1.0 + 1e-12) {
                return Err(BenchError::EstimateOutOfRange {
                    protocol: self.kind().to_string(),
                    observable: obs.id.clone(),
                    value: est.value,
                    bound,
                });
            }
        }
        Ok(())
    }
}

/// Empirical mean and standard error of ±1 outcomes.
pub(crate) fn parity_estimate(sum: f64, shots: u64) -> ObservableEstimate {
    if shots == 0 {
        return ObservableEstimate::undefined();
    }
    let n = shots as f64;
    let mean = sum / n;
    ObservableEstimate {
        value: mean,
        shots_used: shots,
        std_error: ((1.0 - mean * mean).max(0.0) / n).sqrt(),
    }
}
