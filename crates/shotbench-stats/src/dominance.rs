//! Dominance, crossover and per-observable winners between protocol pairs.

use serde::{Deserialize, Serialize};
use shotbench_core::{ProtocolKind, ResultTensor};

use crate::aggregate::{mean_se_curve, observable_curve};

/// Which protocol led before the first crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverDirection {
    /// A had the lower error at small budgets, B at large budgets.
    AThenB,
    BThenA,
}

/// Mean-SE curve comparison for protocols A and B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominanceReport {
    pub protocol_a: ProtocolKind,
    pub protocol_b: ProtocolKind,
    /// A's mean SE <= B's at every grid point where both are defined.
    ///
    /// Both flags are set when the curves are equal at every compared point.
    pub always_a_better: bool,
    /// B's mean SE <= A's at every grid point where both are defined.
    pub always_b_better: bool,
    /// First crossover budget, interpolated in log N.
    pub crossover_n: Option<f64>,
    pub crossover_direction: Option<CrossoverDirection>,
    /// Number of sign changes of `SE_A - SE_B` along the grid.
    pub n_crossovers: usize,
    /// Grid points where both curves are defined.
    pub points_compared: usize,
    /// Shot-savings ratio `N*_B / N*_A` from the power-law fits.
    pub ssr: Option<f64>,
}

/// Fractions of observables by winning pattern across the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableCrossover {
    pub protocol_a: ProtocolKind,
    pub protocol_b: ProtocolKind,
    pub frac_a_always_better: f64,
    pub frac_b_always_better: f64,
    pub frac_crossover: f64,
    /// Observables defined for both protocols at every grid point.
    pub observables_used: usize,
}

/// Sign comparison of two error curves along the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveComparison {
    pub always_a_better: bool,
    pub always_b_better: bool,
    pub crossover_n: Option<f64>,
    pub crossover_direction: Option<CrossoverDirection>,
    pub n_crossovers: usize,
    pub points_compared: usize,
}

/// Compare two curves over `budgets`. Points where either side is undefined are skipped.
pub fn compare_curves(budgets: &[u64], se_a: &[f64], se_b: &[f64]) -> CurveComparison {
    let points: Vec<(f64, f64)> = budgets
        .iter()
        .zip(se_a.iter().zip(se_b))
        .filter(|&(_, (a, b))| a.is_finite() && b.is_finite())
        .map(|(&n, (a, b))| (n as f64, a - b))
        .collect();
    let mut out = CurveComparison {
        always_a_better: false,
        always_b_better: false,
        crossover_n: None,
        crossover_direction: None,
        n_crossovers: 0,
        points_compared: points.len(),
    };
    if points.is_empty() {
        return out;
    }

    out.always_a_better = points.iter().all(|&(_, d)| d <= 0.0);
    out.always_b_better = points.iter().all(|&(_, d)| d >= 0.0);

    // Walk the strictly signed points; zeros between two opposite signs mark the crossing.
    let mut last_signed: Option<usize> = None;
    for i in 0..points.len() {
        let d = points[i].1;
        if d == 0.0 {
            continue;
        }
        if let Some(j) = last_signed {
            let prev = points[j].1;
            if prev.signum() != d.signum() {
                out.n_crossovers += 1;
                if out.crossover_n.is_none() {
                    out.crossover_n = Some(if i > j + 1 {
                        points[j + 1].0
                    } else {
                        let (n0, n1) = (points[j].0.ln(), points[i].0.ln());
                        let t = prev / (prev - d);
                        (n0 + t * (n1 - n0)).exp()
                    });
                    out.crossover_direction = Some(if prev < 0.0 {
                        CrossoverDirection::AThenB
                    } else {
                        CrossoverDirection::BThenA
                    });
                }
            }
        }
        last_signed = Some(i);
    }
    out
}

/// Dominance for the pair `(a, b)` of protocol indices.
pub fn dominance(
    tensor: &ResultTensor,
    a: usize,
    b: usize,
    nstar_a: Option<f64>,
    nstar_b: Option<f64>,
) -> DominanceReport {
    let curve_a = mean_se_curve(tensor, a);
    let curve_b = mean_se_curve(tensor, b);
    let cmp = compare_curves(tensor.shot_grid(), &curve_a, &curve_b);
    let ssr = match (nstar_a, nstar_b) {
        (Some(na), Some(nb)) if na > 0.0 => Some(nb / na),
        _ => None,
    };
    DominanceReport {
        protocol_a: tensor.protocols()[a],
        protocol_b: tensor.protocols()[b],
        always_a_better: cmp.always_a_better,
        always_b_better: cmp.always_b_better,
        crossover_n: cmp.crossover_n,
        crossover_direction: cmp.crossover_direction,
        n_crossovers: cmp.n_crossovers,
        points_compared: cmp.points_compared,
        ssr,
    }
}

/// Per-observable winners for the pair `(a, b)`. A wins ties.
pub fn observable_crossover(tensor: &ResultTensor, a: usize, b: usize) -> ObservableCrossover {
    let per_budget_a: Vec<Vec<f64>> = (0..tensor.num_budgets())
        .map(|bi| observable_curve(tensor, a, bi))
        .collect();
    let per_budget_b: Vec<Vec<f64>> = (0..tensor.num_budgets())
        .map(|bi| observable_curve(tensor, b, bi))
        .collect();

    let (mut a_always, mut b_always, mut crossed, mut used) = (0usize, 0usize, 0usize, 0usize);
    for o in 0..tensor.num_observables() {
        let pairs: Vec<(f64, f64)> = (0..tensor.num_budgets())
            .map(|bi| (per_budget_a[bi][o], per_budget_b[bi][o]))
            .collect();
        if pairs.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            continue;
        }
        used += 1;
        let a_wins: Vec<bool> = pairs.iter().map(|(x, y)| x <= y).collect();
        if a_wins.iter().all(|&w| w) {
            a_always += 1;
        } else if a_wins.iter().all(|&w| !w) {
            b_always += 1;
        } else {
            crossed += 1;
        }
    }

    let frac = |count: usize| {
        if used == 0 {
            f64::NAN
        } else {
            count as f64 / used as f64
        }
    };
    ObservableCrossover {
        protocol_a: tensor.protocols()[a],
        protocol_b: tensor.protocols()[b],
        frac_a_always_better: frac(a_always),
        frac_b_always_better: frac(b_always),
        frac_crossover: frac(crossed),
        observables_used: used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolated_crossover_in_log_n() {
        // SE_A constant 0.5; SE_B 0.9 then 0.1: symmetric differences cross at the log midpoint.
        let cmp = compare_curves(&[100, 1000], &[0.5, 0.5], &[0.9, 0.1]);
        assert!(!cmp.always_a_better && !cmp.always_b_better);
        let n = cmp.crossover_n.unwrap();
        assert!((n - (100.0f64 * 1000.0).sqrt()).abs() < 1e-6);
        assert!(n > 100.0 && n < 1000.0);
        assert_eq!(cmp.crossover_direction, Some(CrossoverDirection::AThenB));
        assert_eq!((cmp.n_crossovers, cmp.points_compared), (1, 2));
    }

    #[test]
    fn test_always_better_has_no_crossover() {
        let cmp = compare_curves(&[1, 2, 3], &[0.1, 0.2, 0.3], &[0.1, 0.4, 0.5]);
        assert!(cmp.always_a_better);
        assert!(!cmp.always_b_better);
        assert!(cmp.crossover_n.is_none());
        assert!(cmp.crossover_direction.is_none());
        assert_eq!(cmp.n_crossovers, 0);
    }

    #[test]
    fn test_identical_curves_set_both_flags() {
        let cmp = compare_curves(&[10, 100], &[0.2, 0.02], &[0.2, 0.02]);
        assert!(cmp.always_a_better && cmp.always_b_better);
        assert!(cmp.crossover_n.is_none());
        assert_eq!(cmp.n_crossovers, 0);
    }

    #[test]
    fn test_zero_at_grid_point_is_the_crossover() {
        let cmp = compare_curves(&[10, 20, 40], &[0.2, 0.3, 0.6], &[0.3, 0.3, 0.4]);
        assert_eq!(cmp.crossover_n, Some(20.0));
        assert_eq!(cmp.crossover_direction, Some(CrossoverDirection::AThenB));
        assert_eq!(cmp.n_crossovers, 1);
    }

    #[test]
    fn test_undefined_points_are_skipped() {
        let cmp = compare_curves(&[10, 20], &[f64::NAN, 0.1], &[0.5, f64::NAN]);
        assert!(!cmp.always_a_better && !cmp.always_b_better);
        assert!(cmp.crossover_n.is_none());
        assert_eq!(cmp.points_compared, 0);
    }

    #[test]
    fn test_multiple_crossings_report_the_first() {
        let cmp = compare_curves(
            &[1, 10, 100, 1000],
            &[0.5, 0.5, 0.5, 0.5],
            &[0.4, 0.6, 0.4, 0.6],
        );
        assert_eq!(cmp.n_crossovers, 3);
        assert_eq!(cmp.crossover_direction, Some(CrossoverDirection::BThenA));
        let n = cmp.crossover_n.unwrap();
        assert!(n > 1.0 && n < 10.0);
    }
}
