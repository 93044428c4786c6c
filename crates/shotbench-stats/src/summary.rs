//! Small numeric reducers shared by the statistics families.
//!
//! Callers filter non-finite values first with [`finite`]; empty inputs give NaN.

use shotbench_core::ResultTensor;

/// Keep only finite values.
pub fn finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    values.into_iter().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}

/// Population variance (divide by n). NaN with fewer than two values.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (divide by n - 1). NaN with fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Linear-interpolation quantile of already sorted values, `q` in `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Replicate-first aggregation: mean squared error of observable `o` over the
/// completed replicates at `(p, b)`. NaN when none is defined.
pub fn observable_mse(tensor: &ResultTensor, p: usize, o: usize, b: usize) -> f64 {
    mean(&finite(tensor.squared_errors(p, o, b)))
}

/// Replicate-mean absolute error of observable `o` at `(p, b)`.
pub fn observable_mae(tensor: &ResultTensor, p: usize, o: usize, b: usize) -> f64 {
    let values = finite(
        tensor
            .completed_replicates(p, b)
            .into_iter()
            .map(|r| tensor.cell(p, o, b, r).abs_error),
    );
    mean(&values)
}

/// Mean squared error of each protocol's row `(p, b, r)` over the observables
/// whose squared error is finite in every listed row.
///
/// All NaN when no observable qualifies.
pub fn paired_row_means(
    tensor: &ResultTensor,
    protocols: &[usize],
    b: usize,
    r: usize,
) -> Vec<f64> {
    let common: Vec<usize> = (0..tensor.num_observables())
        .filter(|&o| {
            protocols
                .iter()
                .all(|&p| tensor.cell(p, o, b, r).squared_error.is_finite())
        })
        .collect();
    protocols
        .iter()
        .map(|&p| {
            let errors: Vec<f64> = common
                .iter()
                .map(|&o| tensor.cell(p, o, b, r).squared_error)
                .collect();
            mean(&errors)
        })
        .collect()
}

/// Index of the smallest finite value; ties go to the earliest index.
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some(j) if values[j] <= v => {}
            _ => best = Some(i),
        }
    }
    best
}
