//! N*: the shot budget at which a protocol reaches the target error.
//!
//! Two readings:
//! - grid scan: the smallest evaluated budget meeting the target, never
//!   extrapolated (`None` when no grid point qualifies),
//! - power law: fit `SE(N) = a * N^(-b)` by least squares in log-log space
//!   and solve `a * N^(-b) = epsilon`.

use serde::{Deserialize, Serialize};
use shotbench_core::{ProtocolKind, ResultTensor};

use crate::aggregate::{max_se_curve, mean_se_curve};

/// Least-squares fit of `SE(N) = a * N^(-b)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    pub a: f64,
    pub b: f64,
    /// Coefficient of determination in log-log space. NaN when log SE has no spread.
    pub r_squared: f64,
    /// Grid points with positive, finite SE that entered the fit.
    pub points_used: usize,
}

impl PowerLawFit {
    pub const UNDEFINED: PowerLawFit = PowerLawFit {
        a: f64::NAN,
        b: f64::NAN,
        r_squared: f64::NAN,
        points_used: 0,
    };

    /// Fit over the points with positive, finite SE. Needs at least two.
    pub fn fit(budgets: &[u64], se: &[f64]) -> Self {
        let points: Vec<(f64, f64)> = budgets
            .iter()
            .zip(se)
            .filter(|&(&n, &s)| n > 0 && s.is_finite() && s > 0.0)
            .map(|(&n, &s)| ((n as f64).ln(), s.ln()))
            .collect();
        let k = points.len();
        if k < 2 {
            return Self {
                points_used: k,
                ..Self::UNDEFINED
            };
        }

        let kf = k as f64;
        let mx = points.iter().map(|p| p.0).sum::<f64>() / kf;
        let my = points.iter().map(|p| p.1).sum::<f64>() / kf;
        let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
        let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
        if sxx <= 0.0 {
            return Self {
                points_used: k,
                ..Self::UNDEFINED
            };
        }
        let slope = sxy / sxx;
        let intercept = my - slope * mx;

        let ss_tot: f64 = points.iter().map(|p| (p.1 - my).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|p| (p.1 - (intercept + slope * p.0)).powi(2))
            .sum();
        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        };

        Self {
            a: intercept.exp(),
            b: -slope,
            r_squared,
            points_used: k,
        }
    }

    /// Budget solving `a * N^(-b) = epsilon`; `None` unless the fit decays (`b > 0`).
    pub fn nstar(&self, epsilon: f64) -> Option<f64> {
        if !(self.a.is_finite() && self.b.is_finite() && self.b > 0.0 && epsilon > 0.0) {
            return None;
        }
        let n = (self.a / epsilon).powf(1.0 / self.b);
        n.is_finite().then_some(n)
    }
}

/// N* figures for one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NStarReport {
    pub protocol: ProtocolKind,
    /// Smallest grid budget with max SE <= epsilon.
    pub nstar_worst_case: Option<u64>,
    /// Smallest grid budget with mean SE <= epsilon.
    pub nstar_average: Option<u64>,
    pub powerlaw_mean: PowerLawFit,
    pub powerlaw_max: PowerLawFit,
    /// Power-law N* on the mean-SE curve.
    pub nstar_powerlaw_mean: Option<f64>,
    /// Power-law N* on the max-SE curve.
    pub nstar_powerlaw_max: Option<f64>,
}

/// Smallest budget whose value is at most `epsilon`.
pub fn grid_nstar(budgets: &[u64], values: &[f64], epsilon: f64) -> Option<u64> {
    budgets
        .iter()
        .zip(values)
        .find(|&(_, &v)| v.is_finite() && v <= epsilon)
        .map(|(&n, _)| n)
}

pub fn nstar_reports(tensor: &ResultTensor, epsilon: f64) -> Vec<NStarReport> {
    let grid = tensor.shot_grid();
    tensor
        .protocols()
        .iter()
        .enumerate()
        .map(|(p, &protocol)| {
            let mean_curve = mean_se_curve(tensor, p);
            let max_curve = max_se_curve(tensor, p);
            let powerlaw_mean = PowerLawFit::fit(grid, &mean_curve);
            let powerlaw_max = PowerLawFit::fit(grid, &max_curve);
            NStarReport {
                protocol,
                nstar_worst_case: grid_nstar(grid, &max_curve, epsilon),
                nstar_average: grid_nstar(grid, &mean_curve, epsilon),
                nstar_powerlaw_mean: powerlaw_mean.nstar(epsilon),
                nstar_powerlaw_max: powerlaw_max.nstar(epsilon),
                powerlaw_mean,
                powerlaw_max,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_power_law_is_recovered() {
        let budgets = [100u64, 1000, 10000];
        let se: Vec<f64> = budgets.iter().map(|&n| 2.0 / n as f64).collect();
        let fit = PowerLawFit::fit(&budgets, &se);
        assert!((fit.a - 2.0).abs() < 1e-9);
        assert!((fit.b - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(fit.points_used, 3);
        let n = fit.nstar(0.001).unwrap();
        assert!((n - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_point_is_undefined() {
        let fit = PowerLawFit::fit(&[100], &[0.1]);
        assert!(fit.a.is_nan());
        assert!(fit.r_squared.is_nan());
        assert_eq!(fit.points_used, 1);
        assert!(fit.nstar(0.01).is_none());
    }

    #[test]
    fn test_non_positive_points_are_skipped() {
        let fit = PowerLawFit::fit(&[100, 1000, 10000], &[0.0, f64::NAN, 0.1]);
        assert_eq!(fit.points_used, 1);
        assert!(fit.b.is_nan());
    }

    #[test]
    fn test_flat_curve_has_undefined_r_squared_and_no_nstar() {
        let fit = PowerLawFit::fit(&[100, 1000], &[0.5, 0.5]);
        assert!(fit.b.abs() < 1e-12);
        assert!(fit.r_squared.is_nan());
        assert!(fit.nstar(0.1).is_none());
    }

    #[test]
    fn test_grid_nstar_never_extrapolates() {
        let budgets = [100u64, 300, 1000];
        assert_eq!(grid_nstar(&budgets, &[0.5, 0.05, 0.01], 0.05), Some(300));
        assert_eq!(grid_nstar(&budgets, &[0.5, 0.2, 0.1], 0.05), None);
        assert_eq!(grid_nstar(&budgets, &[f64::NAN, 0.0, 0.0], 0.05), Some(300));
    }
}
