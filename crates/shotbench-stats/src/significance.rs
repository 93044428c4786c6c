//! Paired significance tests and the shot-savings factor with a bootstrap CI.
//!
//! Replicate `r` of protocol A and replicate `r` of protocol B share a seed,
//! so per-replicate mean squared errors are compared as pairs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shotbench_core::{ProtocolKind, ResultTensor, derive_stream_seed};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::summary::{finite, mean, paired_row_means, quantile_sorted, sample_std};

/// Tests for one protocol pair at one budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRow {
    pub protocol_a: ProtocolKind,
    pub protocol_b: ProtocolKind,
    pub budget: u64,
    /// Replicates completed by both protocols with a defined paired SE.
    pub n_pairs: usize,
    /// Mean of `SE_A - SE_B` over the pairs.
    pub mean_diff: f64,
    /// Two-sided paired t-test p-value.
    pub diff_p_value: f64,
    /// `None` when the p-value is undefined.
    pub reject_null: Option<bool>,
    pub ks_statistic: f64,
    pub ks_p_value: f64,
    /// Shot-savings factor `mean(SE_B) / mean(SE_A)`; above 1 favours A.
    pub ssf: f64,
    pub ssf_ci_low: f64,
    pub ssf_ci_high: f64,
}

/// Two-sided paired t-test on differences. Returns `(mean, p_value)`.
///
/// The p-value is NaN with fewer than two differences or zero spread.
pub fn paired_t_test(diffs: &[f64]) -> (f64, f64) {
    let m = mean(diffs);
    let n = diffs.len();
    if n < 2 {
        return (m, f64::NAN);
    }
    let sd = sample_std(diffs);
    if !(sd.is_finite() && sd > 0.0) {
        return (m, f64::NAN);
    }
    let t = m / (sd / (n as f64).sqrt());
    let p = match StudentsT::new(0.0, 1.0, (n - 1) as f64) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };
    (m, p)
}

/// Two-sample Kolmogorov-Smirnov test. Returns `(D, p_value)`.
///
/// Uses the asymptotic Kolmogorov distribution with `n_eff = n*m / (n + m)`.
/// Both are NaN when either side has fewer than two values.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> (f64, f64) {
    if a.len() < 2 || b.len() < 2 {
        return (f64::NAN, f64::NAN);
    }
    let mut xs = a.to_vec();
    let mut ys = b.to_vec();
    xs.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    ys.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let (n, m) = (xs.len() as f64, ys.len() as f64);

    let (mut i, mut j) = (0usize, 0usize);
    let mut d_max = 0.0f64;
    while i < xs.len() && j < ys.len() {
        let v = xs[i].min(ys[j]);
        while i < xs.len() && xs[i] <= v {
            i += 1;
        }
        while j < ys.len() && ys[j] <= v {
            j += 1;
        }
        d_max = d_max.max((i as f64 / n - j as f64 / m).abs());
    }

    let n_eff = n * m / (n + m);
    let sqrt_n = n_eff.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d_max;
    // The alternating series does not converge near zero; the limit there is 1.
    if lambda < 0.2 {
        return (d_max, 1.0);
    }
    let mut p = 0.0;
    for k in 1..=100i32 {
        let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
        p += sign * (-2.0 * (k as f64 * lambda).powi(2)).exp();
    }
    (d_max, (2.0 * p).clamp(0.0, 1.0))
}

/// Shot-savings factor with a percentile bootstrap CI at 2.5% / 97.5%.
///
/// Returns `(ssf, ci_low, ci_high)`. All NaN with fewer than two pairs or
/// when A's mean SE is zero.
pub fn ssf_bootstrap(se_a: &[f64], se_b: &[f64], resamples: usize, seed: u64) -> (f64, f64, f64) {
    let n = se_a.len().min(se_b.len());
    let undefined = (f64::NAN, f64::NAN, f64::NAN);
    if n < 2 {
        return undefined;
    }
    let ratio = |sum_a: f64, sum_b: f64| {
        if sum_a > 0.0 {
            sum_b / sum_a
        } else {
            f64::NAN
        }
    };
    let ssf = ratio(se_a[..n].iter().sum(), se_b[..n].iter().sum());
    if !ssf.is_finite() {
        return undefined;
    }
    if resamples == 0 {
        return (ssf, f64::NAN, f64::NAN);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let (mut sum_a, mut sum_b) = (0.0, 0.0);
        for _ in 0..n {
            let k = rng.random_range(0..n);
            sum_a += se_a[k];
            sum_b += se_b[k];
        }
        stats.push(ratio(sum_a, sum_b));
    }
    let mut stats = finite(stats);
    if stats.is_empty() {
        return (ssf, f64::NAN, f64::NAN);
    }
    stats.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    (
        ssf,
        quantile_sorted(&stats, 0.025),
        quantile_sorted(&stats, 0.975),
    )
}

/// Pooled finite squared errors of protocol `p` at budget `b`.
fn pooled_squared_errors(tensor: &ResultTensor, p: usize, b: usize) -> Vec<f64> {
    (0..tensor.num_observables())
        .flat_map(|o| finite(tensor.squared_errors(p, o, b)))
        .collect()
}

/// Significance rows for protocols `(a, b)` at every budget.
///
/// `stream_base` offsets the bootstrap stream so every pair and budget draws
/// from its own seed.
pub fn significance_table(
    tensor: &ResultTensor,
    a: usize,
    b: usize,
    alpha: f64,
    resamples: usize,
    bootstrap_seed: u64,
    stream_base: u64,
) -> Vec<SignificanceRow> {
    let mut rows = Vec::with_capacity(tensor.num_budgets());
    for (bi, &budget) in tensor.shot_grid().iter().enumerate() {
        let mut se_a = Vec::new();
        let mut se_b = Vec::new();
        for r in 0..tensor.replicates() {
            if !(tensor.is_complete(a, bi, r) && tensor.is_complete(b, bi, r)) {
                continue;
            }
            let pair = paired_row_means(tensor, &[a, b], bi, r);
            if pair[0].is_finite() && pair[1].is_finite() {
                se_a.push(pair[0]);
                se_b.push(pair[1]);
            }
        }
        let diffs: Vec<f64> = se_a.iter().zip(&se_b).map(|(x, y)| x - y).collect();
        let (mean_diff, diff_p_value) = paired_t_test(&diffs);
        let (ks_statistic, ks_p_value) = ks_two_sample(
            &pooled_squared_errors(tensor, a, bi),
            &pooled_squared_errors(tensor, b, bi),
        );
        let seed = derive_stream_seed(bootstrap_seed, "ssf", stream_base + bi as u64);
        let (ssf, ssf_ci_low, ssf_ci_high) = ssf_bootstrap(&se_a, &se_b, resamples, seed);

        rows.push(SignificanceRow {
            protocol_a: tensor.protocols()[a],
            protocol_b: tensor.protocols()[b],
            budget,
            n_pairs: diffs.len(),
            mean_diff,
            diff_p_value,
            reject_null: diff_p_value.is_finite().then(|| diff_p_value < alpha),
            ks_statistic,
            ks_p_value,
            ssf,
            ssf_ci_low,
            ssf_ci_high,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_t_detects_a_consistent_shift() {
        let diffs = [-0.10, -0.11, -0.09, -0.10, -0.12, -0.08];
        let (m, p) = paired_t_test(&diffs);
        assert!((m + 0.1).abs() < 1e-12);
        assert!(p < 1e-4);
    }

    #[test]
    fn test_paired_t_symmetric_differences_are_not_significant() {
        let (m, p) = paired_t_test(&[0.1, -0.1, 0.2, -0.2]);
        assert!(m.abs() < 1e-12);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_paired_t_undefined_cases() {
        assert!(paired_t_test(&[0.3]).1.is_nan());
        assert!(paired_t_test(&[0.2, 0.2, 0.2]).1.is_nan());
        assert!(paired_t_test(&[]).0.is_nan());
    }

    #[test]
    fn test_ks_identical_samples() {
        let a = [0.1, 0.2, 0.3, 0.4];
        let (d, p) = ks_two_sample(&a, &a);
        assert_eq!(d, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let a: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let b: Vec<f64> = (100..150).map(|i| i as f64).collect();
        let (d, p) = ks_two_sample(&a, &b);
        assert_eq!(d, 1.0);
        assert!(p < 1e-6);
    }

    #[test]
    fn test_ks_needs_two_points_per_side() {
        let (d, p) = ks_two_sample(&[0.1], &[0.2, 0.3]);
        assert!(d.is_nan() && p.is_nan());
    }

    #[test]
    fn test_ssf_bootstrap_brackets_the_point_estimate() {
        let a = [0.1, 0.12, 0.09, 0.11, 0.1, 0.08];
        let b: Vec<f64> = a.iter().map(|x| 2.0 * x).collect();
        let (ssf, lo, hi) = ssf_bootstrap(&a, &b, 500, 7);
        assert!((ssf - 2.0).abs() < 1e-12);
        // B is exactly 2A on every pair, so every resample gives 2.
        assert!((lo - 2.0).abs() < 1e-12);
        assert!((hi - 2.0).abs() < 1e-12);

        let b = [0.3, 0.1, 0.25, 0.2, 0.15, 0.22];
        let (ssf, lo, hi) = ssf_bootstrap(&a, &b, 500, 7);
        assert!(lo <= ssf && ssf <= hi);
        assert_eq!(ssf_bootstrap(&a, &b, 500, 7), (ssf, lo, hi));
    }

    #[test]
    fn test_ssf_undefined_cases() {
        assert!(ssf_bootstrap(&[0.1], &[0.2], 100, 1).0.is_nan());
        assert!(ssf_bootstrap(&[0.0, 0.0], &[0.2, 0.1], 100, 1).0.is_nan());
    }
}
