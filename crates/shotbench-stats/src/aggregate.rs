//! Completeness and aggregate error tables.
//!
//! Aggregation is replicate-first: each observable's squared error is first
//! averaged over the completed replicates, then the per-observable means are
//! summarized across observables. One noisy observable therefore counts once,
//! not once per replicate. Mean squared error is the ranking metric everywhere.
//!
//! A summary over observables is defined only when every observable with
//! ground truth has a defined replicate-mean error. An observable that got no
//! shots makes the mean, median and max NaN rather than silently shrinking
//! the set being summarized.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use shotbench_core::{ObservableMeta, ProtocolKind, ResultTensor, RowStatus};

use crate::summary::{finite, max, mean, median, observable_mae, observable_mse};

/// Collection status of one `(protocol, budget)` cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessRow {
    pub protocol: ProtocolKind,
    pub budget: u64,
    pub completed: usize,
    pub abandoned: usize,
    pub not_run: usize,
    pub expected: usize,
    pub complete: bool,
}

/// Error summary for one protocol at one budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub protocol: ProtocolKind,
    pub budget: u64,
    pub mean_se: f64,
    pub median_se: f64,
    pub max_se: f64,
    pub mean_abs_error: f64,
    /// Observables with a defined replicate-mean squared error. The error
    /// summaries are NaN unless this covers every observable with truth.
    pub observables_used: usize,
    /// Completed replicates at this budget.
    pub replicates_used: usize,
}

/// Mean squared error restricted to observables of one locality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityRow {
    pub protocol: ProtocolKind,
    pub budget: u64,
    pub weight: usize,
    pub mean_se: f64,
    pub observables_used: usize,
}

pub fn completeness(tensor: &ResultTensor) -> Vec<CompletenessRow> {
    let mut rows = Vec::with_capacity(tensor.num_protocols() * tensor.num_budgets());
    for (p, &protocol) in tensor.protocols().iter().enumerate() {
        for (b, &budget) in tensor.shot_grid().iter().enumerate() {
            let mut completed = 0;
            let mut abandoned = 0;
            let mut not_run = 0;
            for r in 0..tensor.replicates() {
                match tensor.row_status(p, b, r) {
                    RowStatus::Acquired => completed += 1,
                    RowStatus::Abandoned => abandoned += 1,
                    RowStatus::NotRun => not_run += 1,
                }
            }
            rows.push(CompletenessRow {
                protocol,
                budget,
                completed,
                abandoned,
                not_run,
                expected: tensor.replicates(),
                complete: completed == tensor.replicates(),
            });
        }
    }
    let incomplete = rows.iter().filter(|r| !r.complete).count();
    if incomplete > 0 {
        log::warn!("{incomplete} protocol/budget cells are incomplete");
    }
    rows
}

/// Replicate-mean squared error of every observable at `(p, b)`.
pub fn observable_curve(tensor: &ResultTensor, p: usize, b: usize) -> Vec<f64> {
    (0..tensor.num_observables())
        .map(|o| observable_mse(tensor, p, o, b))
        .collect()
}

/// Replicate-mean squared errors at `(p, b)` of the observables with ground
/// truth, or `None` when any of them is undefined.
pub fn covered_curve(tensor: &ResultTensor, p: usize, b: usize) -> Option<Vec<f64>> {
    covered(tensor, observable_curve(tensor, p, b), |_| true)
}

fn covered(
    tensor: &ResultTensor,
    curve: Vec<f64>,
    keep: impl Fn(&ObservableMeta) -> bool,
) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(curve.len());
    for (meta, se) in tensor.observables().iter().zip(curve) {
        if meta.ground_truth.is_none() || !keep(meta) {
            continue;
        }
        if !se.is_finite() {
            return None;
        }
        out.push(se);
    }
    Some(out)
}

/// Mean-SE curve of protocol `p` across the grid.
pub fn mean_se_curve(tensor: &ResultTensor, p: usize) -> Vec<f64> {
    (0..tensor.num_budgets())
        .map(|b| covered_curve(tensor, p, b).map_or(f64::NAN, |v| mean(&v)))
        .collect()
}

/// Max-SE curve of protocol `p` across the grid.
pub fn max_se_curve(tensor: &ResultTensor, p: usize) -> Vec<f64> {
    (0..tensor.num_budgets())
        .map(|b| covered_curve(tensor, p, b).map_or(f64::NAN, |v| max(&v)))
        .collect()
}

pub fn aggregate_table(tensor: &ResultTensor) -> Vec<AggregateRow> {
    let mut rows = Vec::with_capacity(tensor.num_protocols() * tensor.num_budgets());
    for (p, &protocol) in tensor.protocols().iter().enumerate() {
        for (b, &budget) in tensor.shot_grid().iter().enumerate() {
            let curve = observable_curve(tensor, p, b);
            let observables_used = finite(curve.iter().copied()).len();
            let abs = covered(
                tensor,
                (0..tensor.num_observables())
                    .map(|o| observable_mae(tensor, p, o, b))
                    .collect(),
                |_| true,
            );
            let (mean_se, median_se, max_se, mean_abs_error) =
                match (covered(tensor, curve, |_| true), abs) {
                    (Some(se), Some(abs)) => (mean(&se), median(&se), max(&se), mean(&abs)),
                    _ => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
                };
            rows.push(AggregateRow {
                protocol,
                budget,
                mean_se,
                median_se,
                max_se,
                mean_abs_error,
                observables_used,
                replicates_used: tensor.completed_replicates(p, b).len(),
            });
        }
    }
    rows
}

pub fn locality_table(tensor: &ResultTensor) -> Vec<LocalityRow> {
    let weights: BTreeSet<usize> = tensor.observables().iter().map(|o| o.weight).collect();
    let mut rows = Vec::new();
    for (p, &protocol) in tensor.protocols().iter().enumerate() {
        for (b, &budget) in tensor.shot_grid().iter().enumerate() {
            let curve = observable_curve(tensor, p, b);
            for &weight in &weights {
                let observables_used = tensor
                    .observables()
                    .iter()
                    .zip(&curve)
                    .filter(|(meta, se)| meta.weight == weight && se.is_finite())
                    .count();
                let values = covered(tensor, curve.clone(), |meta| meta.weight == weight);
                rows.push(LocalityRow {
                    protocol,
                    budget,
                    weight,
                    mean_se: values.map_or(f64::NAN, |v| mean(&v)),
                    observables_used,
                });
            }
        }
    }
    rows
}
