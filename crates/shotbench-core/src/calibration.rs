//! Measurement-fidelity calibration for the noise-aware shadow channel.
//!
//! For each basis the provider prepares the +1 eigenstate on every qubit and
//! measures it in that basis. The per-qubit mean ±1 outcome is the channel's
//! fidelity `f(q, basis)`: 1 for a perfect device, shrinking with readout and
//! basis-rotation error. The mitigated channel divides by it.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::backend::CalibrationProvider;
use crate::error::Result;
use crate::pauli::Basis;

/// Fidelities below this are clamped; the inverse would amplify noise without bound.
pub const MIN_FIDELITY: f64 = 0.05;

/// Per-qubit, per-basis measurement fidelity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityTable {
    /// `fidelities[q][basis.index()]`.
    pub fidelities: Vec<[f64; 3]>,
    /// Shots spent per basis.
    pub shots_per_basis: usize,
}

impl FidelityTable {
    /// Table for a noiseless device.
    pub fn ideal(num_qubits: usize) -> Self {
        Self {
            fidelities: vec![[1.0; 3]; num_qubits],
            shots_per_basis: 0,
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.fidelities.len()
    }

    pub fn get(&self, q: usize, basis: Basis) -> f64 {
        self.fidelities[q][basis.index()]
    }
}

/// Estimate a [`FidelityTable`] from `total_shots` calibration shots, split across X, Y, Z.
///
/// Runs once per benchmark with a seed independent of replicate seeds.
pub fn calibrate(
    provider: &dyn CalibrationProvider,
    num_qubits: usize,
    total_shots: usize,
    seed: u64,
) -> Result<FidelityTable> {
    let shots_per_basis = (total_shots / 3).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fidelities = vec![[1.0; 3]; num_qubits];

    for basis in Basis::ALL {
        let outcomes = provider.sample_eigenstate(basis, shots_per_basis, &mut rng)?;
        let n = outcomes.len().max(1) as f64;
        for (q, row) in fidelities.iter_mut().enumerate() {
            let minus = outcomes.iter().filter(|&&o| o & (1u64 << q) != 0).count() as f64;
            let mean = 1.0 - 2.0 * minus / n;
            row[basis.index()] = mean.clamp(MIN_FIDELITY, 1.0);
        }
    }

    log::info!(
        "calibrated measurement fidelities on {num_qubits} qubits ({shots_per_basis} shots per basis)"
    );
    Ok(FidelityTable {
        fidelities,
        shots_per_basis,
    })
}
