//! Shot-acquisition backends.
//!
//! Protocols never see transport details: they hand a [`MeasurementSetting`]
//! and a shot count to a [`ShotBackend`] and get raw outcome bit masks back.
//! Retry and timeout policy belong to the backend; the harness only records
//! whether acquisition succeeded.
//!
//! [`ProductStateBackend`] is the built-in simulator: an unentangled state given
//! by one Bloch vector per qubit, with two measurement noise channels:
//! - readout error: each outcome bit flips with probability `readout_error[q]`,
//! - basis-change error: the rotation into the X or Y basis depolarizes with
//!   probability `gate_error[q]` (Z needs no rotation and is unaffected).

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, BenchError, Result};
use crate::observable::GroundTruthProvider;
use crate::pauli::{Basis, MeasurementSetting, Pauli, PauliString};

/// Source of raw measurement outcomes.
pub trait ShotBackend: Send + Sync {
    /// Backend identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Number of qubits every setting must cover.
    fn num_qubits(&self) -> usize;

    /// Measure `shots` copies of the state in `setting`.
    ///
    /// Bit `q` of each returned mask is set when qubit `q` gave −1.
    fn sample(
        &self,
        setting: &MeasurementSetting,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError>;

    /// Measure one shot per setting, in order, as a single request.
    ///
    /// Randomized protocols change the setting on every shot. The default
    /// forwards each shot to [`ShotBackend::sample`].
    fn sample_each(
        &self,
        settings: &[MeasurementSetting],
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        let mut outcomes = Vec::with_capacity(settings.len());
        for setting in settings {
            outcomes.extend(self.sample(setting, 1, rng)?);
        }
        Ok(outcomes)
    }
}

/// Source of calibration data for the noise-aware shadow channel.
pub trait CalibrationProvider: Send + Sync {
    /// Prepare the +1 eigenstate of `basis` on every qubit and measure it in `basis`.
    fn sample_eigenstate(
        &self,
        basis: Basis,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError>;
}

// ---------------------------------------------------------------------------
// Product state
// ---------------------------------------------------------------------------

/// Unentangled state described by one Bloch vector `(x, y, z)` per qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    bloch: Vec<[f64; 3]>,
}

impl ProductState {
    pub fn new(bloch: Vec<[f64; 3]>) -> Result<Self> {
        if bloch.len() > crate::pauli::MAX_QUBITS {
            return Err(BenchError::TooManyQubits(bloch.len()));
        }
        for (qubit, r) in bloch.iter().enumerate() {
            let norm = (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt();
            if !norm.is_finite() || norm > 1.0 + 1e-12 {
                return Err(BenchError::InvalidBlochVector { qubit, norm });
            }
        }
        Ok(Self { bloch })
    }

    /// |0...0>.
    pub fn zero(num_qubits: usize) -> Result<Self> {
        Self::new(vec![[0.0, 0.0, 1.0]; num_qubits])
    }

    /// |+...+>.
    pub fn plus(num_qubits: usize) -> Result<Self> {
        Self::new(vec![[1.0, 0.0, 0.0]; num_qubits])
    }

    /// Random directions with purity (Bloch norm) drawn from `[0.7, 1.0]`.
    pub fn random(num_qubits: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let bloch = (0..num_qubits)
            .map(|_| {
                let cos_theta: f64 = rng.random_range(-1.0..=1.0);
                let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
                let phi = rng.random_range(0.0..(2.0 * PI));
                let norm = rng.random_range(0.7..=1.0);
                [
                    norm * sin_theta * phi.cos(),
                    norm * sin_theta * phi.sin(),
                    norm * cos_theta,
                ]
            })
            .collect();
        Self::new(bloch)
    }

    pub fn num_qubits(&self) -> usize {
        self.bloch.len()
    }

    /// Expectation of a single-qubit Pauli on qubit `q`.
    pub fn component(&self, q: usize, pauli: Pauli) -> f64 {
        match pauli {
            Pauli::I => 1.0,
            Pauli::X => self.bloch[q][0],
            Pauli::Y => self.bloch[q][1],
            Pauli::Z => self.bloch[q][2],
        }
    }
}

impl GroundTruthProvider for ProductState {
    fn expectation(&self, pauli: &PauliString) -> Option<f64> {
        if pauli.num_qubits() != self.num_qubits() {
            return None;
        }
        Some(pauli.support().map(|(q, p)| self.component(q, p)).product())
    }
}

// ---------------------------------------------------------------------------
// Simulated backend
// ---------------------------------------------------------------------------

/// Measurement noise of the simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNoise {
    /// Per-qubit symmetric readout flip probability, in `[0, 0.5)`.
    pub readout_error: Vec<f64>,
    /// Per-qubit depolarizing probability of the X/Y basis rotation, in `[0, 1]`.
    pub gate_error: Vec<f64>,
}

impl DeviceNoise {
    pub fn ideal(num_qubits: usize) -> Self {
        Self::uniform(num_qubits, 0.0, 0.0)
    }

    pub fn uniform(num_qubits: usize, readout_error: f64, gate_error: f64) -> Self {
        Self {
            readout_error: vec![readout_error; num_qubits],
            gate_error: vec![gate_error; num_qubits],
        }
    }

    fn validate(&self, num_qubits: usize) -> Result<()> {
        if self.readout_error.len() != num_qubits || self.gate_error.len() != num_qubits {
            return Err(BenchError::DimensionMismatch {
                expected: num_qubits,
                actual: self.readout_error.len().min(self.gate_error.len()),
            });
        }
        for &p in &self.readout_error {
            if !(0.0..0.5).contains(&p) {
                return Err(BenchError::InvalidNoiseParameter {
                    name: "readout_error",
                    value: p,
                });
            }
        }
        for &g in &self.gate_error {
            if !(0.0..=1.0).contains(&g) {
                return Err(BenchError::InvalidNoiseParameter {
                    name: "gate_error",
                    value: g,
                });
            }
        }
        Ok(())
    }

    /// Expected ±1 outcome when a +1 eigenstate of `basis` is measured in `basis`.
    pub fn fidelity(&self, q: usize, basis: Basis) -> f64 {
        let readout = 1.0 - 2.0 * self.readout_error[q];
        match basis {
            Basis::Z => readout,
            Basis::X | Basis::Y => readout * (1.0 - self.gate_error[q]),
        }
    }
}

/// Sampling simulator for a [`ProductState`] under [`DeviceNoise`].
#[derive(Debug, Clone)]
pub struct ProductStateBackend {
    name: String,
    state: ProductState,
    noise: DeviceNoise,
}

impl ProductStateBackend {
    pub fn new(state: ProductState, noise: DeviceNoise) -> Result<Self> {
        noise.validate(state.num_qubits())?;
        Ok(Self {
            name: "product_state_sim".to_string(),
            state,
            noise,
        })
    }

    pub fn ideal(state: ProductState) -> Self {
        let noise = DeviceNoise::ideal(state.num_qubits());
        Self {
            name: "product_state_sim".to_string(),
            state,
            noise,
        }
    }

    pub fn state(&self) -> &ProductState {
        &self.state
    }

    pub fn noise(&self) -> &DeviceNoise {
        &self.noise
    }

    /// Draw outcomes given the noiseless ±1 mean of every qubit in its measured basis.
    fn draw(
        &self,
        bases: &[Basis],
        ideal_means: &[f64],
        shots: usize,
        rng: &mut StdRng,
    ) -> Vec<u64> {
        let flip_probs: Vec<f64> = bases
            .iter()
            .zip(ideal_means)
            .enumerate()
            .map(|(q, (&basis, &mean))| {
                let damped = match basis {
                    Basis::Z => mean,
                    Basis::X | Basis::Y => mean * (1.0 - self.noise.gate_error[q]),
                };
                let p_minus = (1.0 - damped) / 2.0;
                let p = self.noise.readout_error[q];
                p_minus * (1.0 - p) + (1.0 - p_minus) * p
            })
            .collect();

        (0..shots)
            .map(|_| {
                flip_probs
                    .iter()
                    .enumerate()
                    .fold(0u64, |mask, (q, &p1)| {
                        if rng.random::<f64>() < p1 {
                            mask | (1u64 << q)
                        } else {
                            mask
                        }
                    })
            })
            .collect()
    }

    fn check_width(&self, width: usize) -> std::result::Result<(), AcquisitionError> {
        if width != self.state.num_qubits() {
            return Err(AcquisitionError::Rejected {
                backend: self.name.clone(),
                reason: format!(
                    "setting covers {width} qubits, device has {}",
                    self.state.num_qubits()
                ),
            });
        }
        Ok(())
    }
}

impl ShotBackend for ProductStateBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_qubits(&self) -> usize {
        self.state.num_qubits()
    }

    fn sample(
        &self,
        setting: &MeasurementSetting,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        self.check_width(setting.num_qubits())?;
        let means: Vec<f64> = setting
            .bases()
            .iter()
            .enumerate()
            .map(|(q, b)| match b {
                Basis::X => self.state.component(q, Pauli::X),
                Basis::Y => self.state.component(q, Pauli::Y),
                Basis::Z => self.state.component(q, Pauli::Z),
            })
            .collect();
        Ok(self.draw(setting.bases(), &means, shots, rng))
    }
}

impl CalibrationProvider for ProductStateBackend {
    fn sample_eigenstate(
        &self,
        basis: Basis,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        let n = self.state.num_qubits();
        let bases = vec![basis; n];
        Ok(self.draw(&bases, &vec![1.0; n], shots, rng))
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Wraps a backend and fails a fraction of sample requests with a timeout.
///
/// The decision is drawn from the caller's RNG, so a given derived seed fails
/// (or succeeds) reproducibly.
#[derive(Debug, Clone)]
pub struct UnreliableBackend<B> {
    inner: B,
    failure_rate: f64,
}

impl<B: ShotBackend> UnreliableBackend<B> {
    pub fn new(inner: B, failure_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(BenchError::InvalidNoiseParameter {
                name: "failure_rate",
                value: failure_rate,
            });
        }
        Ok(Self {
            inner,
            failure_rate,
        })
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: ShotBackend> ShotBackend for UnreliableBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn num_qubits(&self) -> usize {
        self.inner.num_qubits()
    }

    fn sample(
        &self,
        setting: &MeasurementSetting,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        if self.failure_rate > 0.0 && rng.random::<f64>() < self.failure_rate {
            return Err(AcquisitionError::Timeout {
                backend: self.inner.name().to_string(),
            });
        }
        self.inner.sample(setting, shots, rng)
    }

    fn sample_each(
        &self,
        settings: &[MeasurementSetting],
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        if self.failure_rate > 0.0 && rng.random::<f64>() < self.failure_rate {
            return Err(AcquisitionError::Timeout {
                backend: self.inner.name().to_string(),
            });
        }
        self.inner.sample_each(settings, rng)
    }
}

impl<B: CalibrationProvider> CalibrationProvider for UnreliableBackend<B> {
    fn sample_eigenstate(
        &self,
        basis: Basis,
        shots: usize,
        rng: &mut StdRng,
    ) -> std::result::Result<Vec<u64>, AcquisitionError> {
        self.inner.sample_eigenstate(basis, shots, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_parity(outcomes: &[u64], pauli: &PauliString) -> f64 {
        outcomes.iter().map(|&o| pauli.parity(o)).sum::<f64>() / outcomes.len() as f64
    }

    #[test]
    fn test_invalid_bloch_vector_rejected() {
        let err = ProductState::new(vec![[1.0, 1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, BenchError::InvalidBlochVector { qubit: 0, .. }));
    }

    #[test]
    fn test_product_expectation() {
        let state = ProductState::new(vec![[0.0, 0.0, 0.5], [0.8, 0.0, 0.0]]).unwrap();
        let zx = PauliString::parse("ZX").unwrap();
        let zi = PauliString::parse("ZI").unwrap();
        assert!((state.expectation(&zx).unwrap() - 0.4).abs() < 1e-12);
        assert!((state.expectation(&zi).unwrap() - 0.5).abs() < 1e-12);
        let wrong_width = PauliString::parse("ZZZ").unwrap();
        assert!(state.expectation(&wrong_width).is_none());
    }

    #[test]
    fn test_zero_state_ideal_sampling_is_deterministic() {
        let backend = ProductStateBackend::ideal(ProductState::zero(3).unwrap());
        let mut rng = StdRng::seed_from_u64(1);
        let setting = MeasurementSetting::uniform(3, Basis::Z);
        let outcomes = backend.sample(&setting, 100, &mut rng).unwrap();
        assert!(outcomes.iter().all(|&o| o == 0));
    }

    #[test]
    fn test_sampling_converges_to_expectation() {
        let state = ProductState::random(3, 11).unwrap();
        let backend = ProductStateBackend::ideal(state.clone());
        let pauli = PauliString::parse("XIY").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let outcomes = backend
            .sample(&pauli.measurement_setting(), 40_000, &mut rng)
            .unwrap();
        let exact = state.expectation(&pauli).unwrap();
        assert!(
            (mean_parity(&outcomes, &pauli) - exact).abs() < 0.03,
            "sampled mean far from {exact}"
        );
    }

    #[test]
    fn test_same_seed_same_outcomes() {
        let backend = ProductStateBackend::ideal(ProductState::random(4, 2).unwrap());
        let setting = MeasurementSetting::uniform(4, Basis::X);
        let a = backend
            .sample(&setting, 50, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = backend
            .sample(&setting, 50, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_readout_noise_shrinks_eigenstate_mean() {
        let noise = DeviceNoise::uniform(2, 0.1, 0.2);
        let backend = ProductStateBackend::new(ProductState::zero(2).unwrap(), noise).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let z0 = PauliString::parse("ZI").unwrap();
        let x0 = PauliString::parse("XI").unwrap();
        let z_out = backend.sample_eigenstate(Basis::Z, 40_000, &mut rng).unwrap();
        let x_out = backend.sample_eigenstate(Basis::X, 40_000, &mut rng).unwrap();
        assert!((mean_parity(&z_out, &z0) - 0.8).abs() < 0.02);
        assert!((mean_parity(&x_out, &x0) - 0.64).abs() < 0.02);
        assert!((backend.noise().fidelity(0, Basis::X) - 0.64).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_noise_rejected() {
        let noise = DeviceNoise::uniform(1, 0.5, 0.0);
        let err = ProductStateBackend::new(ProductState::zero(1).unwrap(), noise).unwrap_err();
        assert!(matches!(err, BenchError::InvalidNoiseParameter { .. }));
    }

    #[test]
    fn test_width_mismatch_is_rejected_not_panicking() {
        let backend = ProductStateBackend::ideal(ProductState::zero(2).unwrap());
        let setting = MeasurementSetting::uniform(3, Basis::Z);
        let err = backend
            .sample(&setting, 1, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Rejected { .. }));
    }

    #[test]
    fn test_sample_each_follows_settings() {
        let backend = ProductStateBackend::ideal(ProductState::new(vec![[0.0, 0.0, -1.0]]).unwrap());
        let settings = vec![MeasurementSetting::uniform(1, Basis::Z); 5];
        let outcomes = backend
            .sample_each(&settings, &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_eq!(outcomes, vec![1; 5]);
    }

    #[test]
    fn test_unreliable_backend_fails_reproducibly() {
        let inner = ProductStateBackend::ideal(ProductState::zero(1).unwrap());
        let always = UnreliableBackend::new(inner.clone(), 1.0).unwrap();
        let never = UnreliableBackend::new(inner, 0.0).unwrap();
        let setting = MeasurementSetting::uniform(1, Basis::Z);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(always.sample(&setting, 10, &mut rng).is_err());
        assert!(never.sample(&setting, 10, &mut rng).is_ok());
        assert!(always.sample_each(&[setting.clone()], &mut rng).is_err());
        assert!(never.sample_each(&[setting], &mut rng).is_ok());
    }
}
