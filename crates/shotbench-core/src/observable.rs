//! Observable sets and ground-truth providers.
//!
//! An [`ObservableSet`] is fixed for the lifetime of a run: ids are unique,
//! every Pauli string acts on the same number of qubits, and qubit-wise
//! commuting group labels are assigned once at construction.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::grouping::qwc_groups;
use crate::pauli::{Pauli, PauliString};

/// One target observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub id: String,
    pub pauli: PauliString,
    /// Qubit-wise commuting group label used by grouped protocols.
    pub group: Option<usize>,
    /// Exact expectation value, when a ground-truth provider supplied one.
    pub ground_truth: Option<f64>,
}

impl Observable {
    pub fn weight(&self) -> usize {
        self.pauli.weight()
    }
}

/// Supplies exact expectation values for a state.
pub trait GroundTruthProvider {
    /// Exact `<P>` for the provider's state, or `None` when unknown.
    fn expectation(&self, pauli: &PauliString) -> Option<f64>;
}

/// Ground truth supplied as a table keyed by Pauli label.
///
/// Serializes as a flat `{"label": value}` map, the format of `--truth` files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabulatedTruth {
    pub values: HashMap<String, f64>,
}

impl TabulatedTruth {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self { values }
    }
}

impl GroundTruthProvider for TabulatedTruth {
    fn expectation(&self, pauli: &PauliString) -> Option<f64> {
        self.values.get(&pauli.to_string()).copied()
    }
}

/// Immutable, validated set of observables for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableSet {
    num_qubits: usize,
    observables: Vec<Observable>,
    groups: Vec<Vec<usize>>,
}

impl ObservableSet {
    /// Build a set from `(id, pauli)` pairs and assign QWC groups.
    pub fn new(entries: Vec<(String, PauliString)>) -> Result<Self> {
        let Some((_, first)) = entries.first() else {
            return Err(BenchError::EmptyObservableSet);
        };
        let num_qubits = first.num_qubits();

        let mut seen = HashSet::new();
        for (id, pauli) in &entries {
            if pauli.num_qubits() != num_qubits {
                return Err(BenchError::QubitCountMismatch {
                    label: pauli.to_string(),
                    expected: num_qubits,
                    actual: pauli.num_qubits(),
                });
            }
            if !seen.insert(id.as_str()) {
                return Err(BenchError::DuplicateObservable(id.clone()));
            }
        }

        let paulis: Vec<PauliString> = entries.iter().map(|(_, p)| p.clone()).collect();
        let groups = qwc_groups(&paulis);
        let mut observables: Vec<Observable> = entries
            .into_iter()
            .map(|(id, pauli)| Observable {
                id,
                pauli,
                group: None,
                ground_truth: None,
            })
            .collect();
        for (g, members) in groups.iter().enumerate() {
            for &i in members {
                observables[i].group = Some(g);
            }
        }

        Ok(Self {
            num_qubits,
            observables,
            groups,
        })
    }

    /// Parse dense labels; each label doubles as the observable id.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let entries = labels
            .iter()
            .map(|l| {
                let pauli = PauliString::parse(l.as_ref())?;
                Ok((pauli.to_string(), pauli))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Draw `count` distinct random Pauli strings with weight in `1..=max_weight`.
    ///
    /// Deterministic in `seed`. If fewer distinct strings exist than requested,
    /// the set holds every string that could be drawn.
    pub fn random_local(
        num_qubits: usize,
        count: usize,
        max_weight: usize,
        seed: u64,
    ) -> Result<Self> {
        if num_qubits == 0 || count == 0 {
            return Err(BenchError::EmptyObservableSet);
        }
        if num_qubits > crate::pauli::MAX_QUBITS {
            return Err(BenchError::TooManyQubits(num_qubits));
        }
        let max_weight = max_weight.clamp(1, num_qubits);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut labels: Vec<String> = Vec::with_capacity(count);
        let mut seen = HashSet::new();
        let mut qubits: Vec<usize> = (0..num_qubits).collect();
        let max_attempts = count.saturating_mul(200).max(1000);

        for _ in 0..max_attempts {
            if labels.len() == count {
                break;
            }
            let weight = rng.random_range(1..=max_weight);
            qubits.shuffle(&mut rng);
            let mut paulis = vec![Pauli::I; num_qubits];
            for &q in &qubits[..weight] {
                paulis[q] = [Pauli::X, Pauli::Y, Pauli::Z][rng.random_range(0..3)];
            }
            let label: String = paulis.iter().map(|p| p.to_char()).collect();
            if seen.insert(label.clone()) {
                labels.push(label);
            }
        }
        if labels.len() < count {
            log::warn!(
                "only {} distinct observables of weight <= {max_weight} found on {num_qubits} qubits ({count} requested)",
                labels.len()
            );
        }
        Self::from_labels(&labels)
    }

    /// Attach exact expectation values from `provider`.
    pub fn with_ground_truth(mut self, provider: &dyn GroundTruthProvider) -> Result<Self> {
        for obs in &mut self.observables {
            let value = provider.expectation(&obs.pauli);
            if let Some(v) = value {
                if !v.is_finite() || !(-1.0..=1.0).contains(&v) {
                    return Err(BenchError::GroundTruthOutOfRange {
                        observable: obs.id.clone(),
                        value: v,
                    });
                }
            }
            obs.ground_truth = value;
        }
        Ok(self)
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn len(&self) -> usize {
        self.observables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observable> {
        self.observables.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Observable> {
        self.observables.get(index)
    }

    pub fn as_slice(&self) -> &[Observable] {
        &self.observables
    }

    /// QWC groups as lists of observable indices.
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// True when at least one observable carries ground truth.
    pub fn has_ground_truth(&self) -> bool {
        self.observables.iter().any(|o| o.ground_truth.is_some())
    }

    pub fn ground_truth(&self) -> Vec<Option<f64>> {
        self.observables.iter().map(|o| o.ground_truth).collect()
    }
}

impl<'a> IntoIterator for &'a ObservableSet {
    type Item = &'a Observable;
    type IntoIter = std::slice::Iter<'a, Observable>;

    fn into_iter(self) -> Self::IntoIter {
        self.observables.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_assigns_groups() {
        let set = ObservableSet::from_labels(&["ZZI", "ZII", "XXI", "IIX"]).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.num_qubits(), 3);
        for obs in &set {
            assert!(obs.group.is_some());
        }
        let zz = set.get(0).unwrap().group;
        let xx = set.get(2).unwrap().group;
        assert_ne!(zz, xx);
        let total: usize = set.groups().iter().map(|g| g.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_empty_set_rejected() {
        let labels: [&str; 0] = [];
        assert_eq!(
            ObservableSet::from_labels(&labels).unwrap_err(),
            BenchError::EmptyObservableSet
        );
    }

    #[test]
    fn test_ragged_set_rejected() {
        let err = ObservableSet::from_labels(&["ZZ", "ZZZ"]).unwrap_err();
        assert!(matches!(err, BenchError::QubitCountMismatch { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = ObservableSet::from_labels(&["ZZ", "zz"]).unwrap_err();
        assert_eq!(err, BenchError::DuplicateObservable("ZZ".into()));
    }

    #[test]
    fn test_random_local_is_deterministic_and_bounded() {
        let a = ObservableSet::random_local(6, 12, 2, 7).unwrap();
        let b = ObservableSet::random_local(6, 12, 2, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        for obs in &a {
            assert!((1..=2).contains(&obs.weight()));
        }
    }

    #[test]
    fn test_random_local_caps_at_available_strings() {
        // One qubit has only X, Y, Z.
        let set = ObservableSet::random_local(1, 10, 1, 3).unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_tabulated_truth_attaches_and_validates() {
        let set = ObservableSet::from_labels(&["ZI", "IZ"]).unwrap();
        let truth = TabulatedTruth::new(HashMap::from([("ZI".to_string(), 0.5)]));
        let set = set.with_ground_truth(&truth).unwrap();
        assert_eq!(set.ground_truth(), vec![Some(0.5), None]);
        assert!(set.has_ground_truth());

        let parsed: TabulatedTruth = serde_json::from_str(r#"{"IZ": -0.25}"#).unwrap();
        let set = set.with_ground_truth(&parsed).unwrap();
        assert_eq!(set.ground_truth(), vec![None, Some(-0.25)]);

        let bad = TabulatedTruth::new(HashMap::from([("IZ".to_string(), 1.5)]));
        let err = set.with_ground_truth(&bad).unwrap_err();
        assert!(matches!(err, BenchError::GroundTruthOutOfRange { .. }));
    }
}
