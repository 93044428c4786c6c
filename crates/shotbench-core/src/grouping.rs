//! Qubit-wise commuting (QWC) grouping by greedy graph coloring.
//!
//! Vertices are observables, edges join pairs that do *not* commute qubit-wise.
//! Each color class is an independent set, so every member can be read from
//! the same shots. Vertices are colored in Welsh-Powell order (descending
//! conflict degree, ties broken by index), which keeps the result deterministic.

use crate::pauli::{Basis, MeasurementSetting, PauliString};

/// Partition `paulis` into QWC groups. Always succeeds: singletons are valid.
pub fn qwc_groups(paulis: &[PauliString]) -> Vec<Vec<usize>> {
    let n = paulis.len();
    let mut conflicts: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if !paulis[i].qubit_wise_commutes(&paulis[j]) {
                conflicts[i].push(j);
                conflicts[j].push(i);
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| conflicts[b].len().cmp(&conflicts[a].len()).then(a.cmp(&b)));

    let mut color: Vec<Option<usize>> = vec![None; n];
    let mut n_colors = 0usize;
    for &v in &order {
        let mut taken = vec![false; n_colors + 1];
        for &u in &conflicts[v] {
            if let Some(c) = color[u] {
                taken[c] = true;
            }
        }
        let c = taken.iter().position(|t| !t).unwrap_or(n_colors);
        color[v] = Some(c);
        n_colors = n_colors.max(c + 1);
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_colors];
    for (v, c) in color.into_iter().enumerate() {
        if let Some(c) = c {
            groups[c].push(v);
        }
    }
    groups
}

/// Joint measurement setting for a QWC group; unused qubits are read in Z.
pub fn group_setting(num_qubits: usize, members: &[&PauliString]) -> MeasurementSetting {
    let mut bases = vec![Basis::Z; num_qubits];
    for pauli in members {
        for (q, p) in pauli.support() {
            if let Some(b) = p.basis() {
                bases[q] = b;
            }
        }
    }
    MeasurementSetting::new(bases)
}
