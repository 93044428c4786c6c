//! Pauli strings, measurement bases and outcome parities.
//!
//! A [`PauliString`] is stored densely (one [`Pauli`] per qubit). Measurement
//! outcomes are `u64` bit masks where bit `q` set means the ±1 outcome on qubit
//! `q` was −1, which caps a run at 64 qubits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Largest qubit count an outcome bit mask can hold.
pub const MAX_QUBITS: usize = 64;

/// Single-qubit Pauli operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pauli {
    I,
    X,
    Y,
    Z,
}

impl Pauli {
    /// Parse a Pauli operator from a character (case-insensitive).
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'I' => Ok(Self::I),
            'X' => Ok(Self::X),
            'Y' => Ok(Self::Y),
            'Z' => Ok(Self::Z),
            _ => Err(BenchError::InvalidPauli(c)),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::I => 'I',
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
        }
    }

    /// Measurement basis that diagonalizes this operator (`None` for identity).
    pub fn basis(self) -> Option<Basis> {
        match self {
            Self::I => None,
            Self::X => Some(Basis::X),
            Self::Y => Some(Basis::Y),
            Self::Z => Some(Basis::Z),
        }
    }
}

impl fmt::Display for Pauli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Single-qubit measurement basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    X,
    Y,
    Z,
}

impl Basis {
    /// All three bases, in a fixed order used for indexing fidelity tables.
    pub const ALL: [Basis; 3] = [Basis::X, Basis::Y, Basis::Z];

    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Z => write!(f, "z"),
        }
    }
}

/// Per-qubit basis assignment for one shot (or a batch of identical shots).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementSetting {
    bases: Vec<Basis>,
}

impl MeasurementSetting {
    pub fn new(bases: Vec<Basis>) -> Self {
        Self { bases }
    }

    /// Measure every qubit in the same basis.
    pub fn uniform(n_qubits: usize, basis: Basis) -> Self {
        Self {
            bases: vec![basis; n_qubits],
        }
    }

    pub fn bases(&self) -> &[Basis] {
        &self.bases
    }

    pub fn num_qubits(&self) -> usize {
        self.bases.len()
    }

    /// Whether measuring in this setting reveals the eigenvalue of `pauli`.
    pub fn diagonalizes(&self, pauli: &PauliString) -> bool {
        pauli
            .support()
            .all(|(q, p)| p.basis() == Some(self.bases[q]))
    }
}

/// Dense tensor product of single-qubit Paulis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PauliString {
    paulis: Vec<Pauli>,
}

impl PauliString {
    pub fn new(paulis: Vec<Pauli>) -> Result<Self> {
        if paulis.len() > MAX_QUBITS {
            return Err(BenchError::TooManyQubits(paulis.len()));
        }
        Ok(Self { paulis })
    }

    /// Parse a dense label such as `"XIZ"` (qubit 0 first).
    pub fn parse(label: &str) -> Result<Self> {
        let paulis = label
            .trim()
            .chars()
            .map(Pauli::from_char)
            .collect::<Result<Vec<_>>>()?;
        Self::new(paulis)
    }

    pub fn num_qubits(&self) -> usize {
        self.paulis.len()
    }

    pub fn paulis(&self) -> &[Pauli] {
        &self.paulis
    }

    /// Non-identity positions with their operators.
    pub fn support(&self) -> impl Iterator<Item = (usize, Pauli)> + '_ {
        self.paulis
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| *p != Pauli::I)
    }

    /// Number of non-identity factors (the locality of the observable).
    pub fn weight(&self) -> usize {
        self.support().count()
    }

    /// Bit mask of the support.
    pub fn support_mask(&self) -> u64 {
        self.support().fold(0u64, |mask, (q, _)| mask | (1u64 << q))
    }

    /// Qubit-wise commutation: on every qubit the factors agree or one is identity.
    pub fn qubit_wise_commutes(&self, other: &PauliString) -> bool {
        self.paulis
            .iter()
            .zip(&other.paulis)
            .all(|(a, b)| *a == Pauli::I || *b == Pauli::I || a == b)
    }

    /// Setting that measures this string; qubits outside the support are read in Z.
    pub fn measurement_setting(&self) -> MeasurementSetting {
        MeasurementSetting::new(
            self.paulis
                .iter()
                .map(|p| p.basis().unwrap_or(Basis::Z))
                .collect(),
        )
    }

    /// ±1 eigenvalue of this string for an outcome measured in a diagonalizing setting.
    pub fn parity(&self, outcome: u64) -> f64 {
        if (outcome & self.support_mask()).count_ones() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl fmt::Display for PauliString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.paulis {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
