//! Bias-variance decomposition per observable and budget.
//!
//! Over the completed replicates, `mse = bias^2 + variance` holds exactly for
//! the population variance. The decomposition checks the identity on every
//! row it emits and flags (and logs) a violation instead of trusting it.

use serde::{Deserialize, Serialize};
use shotbench_core::{ProtocolKind, ResultTensor};

use crate::summary::{finite, mean, population_variance};

/// Relative tolerance of the identity check.
pub const IDENTITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasVarianceRow {
    pub protocol: ProtocolKind,
    pub budget: u64,
    pub observable: String,
    pub ground_truth: f64,
    pub mean_estimate: f64,
    pub bias: f64,
    /// Population variance over replicates; NaN with fewer than two.
    pub variance: f64,
    pub mse: f64,
    /// `mse - (bias^2 + variance)`, with variance taken as 0 when undefined.
    pub identity_residual: f64,
    pub identity_holds: bool,
    pub replicates_used: usize,
}

fn decompose(estimates: &[f64], truth: f64) -> (f64, f64, f64, f64, f64) {
    let mean_estimate = mean(estimates);
    let bias = mean_estimate - truth;
    let variance = population_variance(estimates);
    let mse = mean(
        &estimates
            .iter()
            .map(|e| {
                let d = e - truth;
                d * d
            })
            .collect::<Vec<_>>(),
    );
    let var_term = if variance.is_nan() { 0.0 } else { variance };
    let residual = mse - (bias * bias + var_term);
    (mean_estimate, bias, variance, mse, residual)
}

pub fn bias_variance_table(tensor: &ResultTensor) -> Vec<BiasVarianceRow> {
    let mut rows = Vec::new();
    let mut violations = 0usize;
    for (p, &protocol) in tensor.protocols().iter().enumerate() {
        for (b, &budget) in tensor.shot_grid().iter().enumerate() {
            let replicates = tensor.completed_replicates(p, b);
            for (o, meta) in tensor.observables().iter().enumerate() {
                let Some(truth) = meta.ground_truth else {
                    continue;
                };
                let estimates =
                    finite(replicates.iter().map(|&r| tensor.cell(p, o, b, r).estimate));
                if estimates.is_empty() {
                    rows.push(BiasVarianceRow {
                        protocol,
                        budget,
                        observable: meta.id.clone(),
                        ground_truth: truth,
                        mean_estimate: f64::NAN,
                        bias: f64::NAN,
                        variance: f64::NAN,
                        mse: f64::NAN,
                        identity_residual: f64::NAN,
                        identity_holds: true,
                        replicates_used: 0,
                    });
                    continue;
                }
                let (mean_estimate, bias, variance, mse, residual) = decompose(&estimates, truth);
                let holds = residual.abs() <= IDENTITY_TOLERANCE * mse.abs().max(1e-12);
                if !holds {
                    violations += 1;
                    log::warn!(
                        "bias-variance identity violated for {protocol} '{}' at N={budget}: residual {residual:e}",
                        meta.id
                    );
                }
                rows.push(BiasVarianceRow {
                    protocol,
                    budget,
                    observable: meta.id.clone(),
                    ground_truth: truth,
                    mean_estimate,
                    bias,
                    variance,
                    mse,
                    identity_residual: residual,
                    identity_holds: holds,
                    replicates_used: estimates.len(),
                });
            }
        }
    }
    if violations > 0 {
        log::warn!("{violations} bias-variance rows failed the identity check");
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotbench_core::ObservableMeta;

    fn single(truth: f64, grid: Vec<u64>, replicates: usize) -> ResultTensor {
        ResultTensor::new(
            vec![ProtocolKind::ClassicalShadowsV0],
            vec![ObservableMeta {
                id: "zz".into(),
                weight: 2,
                ground_truth: Some(truth),
            }],
            grid,
            replicates,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_holds_with_replicates() {
        let mut t = single(0.3, vec![100], 4);
        for (r, e) in [0.1, 0.5, 0.45, 0.2].into_iter().enumerate() {
            t.record_row(0, 0, r, &[e]).unwrap();
        }
        let rows = bias_variance_table(&t);
        let row = &rows[0];
        assert!((row.mean_estimate - 0.3125).abs() < 1e-12);
        assert!((row.bias - 0.0125).abs() < 1e-12);
        assert!(row.variance > 0.0);
        assert!(row.identity_holds);
        assert!(row.identity_residual.abs() < 1e-15);
        assert_eq!(row.replicates_used, 4);
    }

    #[test]
    fn test_single_replicate_degenerates_to_bias_squared() {
        let mut t = single(0.2, vec![100], 1);
        t.record_row(0, 0, 0, &[0.7]).unwrap();
        let row = &bias_variance_table(&t)[0];
        assert!(row.variance.is_nan());
        assert!((row.bias - 0.5).abs() < 1e-12);
        assert_eq!(row.mse, row.bias * row.bias);
        assert_eq!(row.identity_residual, 0.0);
        assert!(row.identity_holds);
    }

    #[test]
    fn test_observables_without_truth_are_skipped() {
        let mut t = ResultTensor::new(
            vec![ProtocolKind::DirectNaive],
            vec![ObservableMeta {
                id: "x".into(),
                weight: 1,
                ground_truth: None,
            }],
            vec![10],
            2,
        )
        .unwrap();
        t.record_row(0, 0, 0, &[0.1]).unwrap();
        assert!(bias_variance_table(&t).is_empty());
    }

    #[test]
    fn test_abandoned_only_gives_undefined_row() {
        let mut t = single(0.0, vec![10], 2);
        t.mark_abandoned(0, 0, 0).unwrap();
        let row = &bias_variance_table(&t)[0];
        assert_eq!(row.replicates_used, 0);
        assert!(row.bias.is_nan());
    }
}
