//! # shotbench-stats
//!
//! Statistical comparison of a filled [`ResultTensor`]: completeness, aggregate
//! error tables, N* (grid and power law), dominance and crossover, per-observable
//! winners, bias-variance decomposition, pilot-based protocol selection and
//! paired significance tests.
//!
//! Every reducer is a pure function of the tensor. Undefined quantities are
//! NaN or `None`, never zero.
//!
//! ```no_run
//! # use shotbench_core::{BenchmarkConfig, ResultTensor};
//! # fn demo(config: &BenchmarkConfig, tensor: &ResultTensor) {
//! use shotbench_stats::{ComparisonConfig, compare};
//!
//! let comparison = compare(tensor, &ComparisonConfig::from(config));
//! for row in &comparison.nstar {
//!     println!("{}: N* = {:?}", row.protocol, row.nstar_average);
//! }
//! # }
//! ```

pub mod aggregate;
pub mod bias_variance;
pub mod dominance;
pub mod nstar;
pub mod pilot;
pub mod record;
pub mod significance;
pub mod summary;

use serde::{Deserialize, Serialize};
use shotbench_core::{BenchmarkConfig, ResultTensor, derive_stream_seed};

pub use aggregate::{AggregateRow, CompletenessRow, LocalityRow};
pub use bias_variance::BiasVarianceRow;
pub use dominance::{CrossoverDirection, DominanceReport, ObservableCrossover};
pub use nstar::{NStarReport, PowerLawFit};
pub use pilot::PilotSelection;
pub use record::BenchmarkRun;
pub use significance::SignificanceRow;

/// Parameters of the comparison engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub target_epsilon: f64,
    pub delta: f64,
    pub pilot_fractions: Vec<f64>,
    pub pilot_target_n: Option<u64>,
    pub bootstrap_resamples: usize,
    pub significance_alpha: f64,
    pub bootstrap_seed: u64,
}

impl From<&BenchmarkConfig> for ComparisonConfig {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            target_epsilon: config.target_epsilon,
            delta: config.delta,
            pilot_fractions: config.pilot_fractions.clone(),
            pilot_target_n: Some(config.pilot_target()),
            bootstrap_resamples: config.bootstrap_resamples,
            significance_alpha: config.significance_alpha,
            bootstrap_seed: derive_stream_seed(config.run_seed, "bootstrap", 0),
        }
    }
}

/// Every statistic derived from one tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub completeness: Vec<CompletenessRow>,
    pub aggregates: Vec<AggregateRow>,
    pub locality: Vec<LocalityRow>,
    pub nstar: Vec<NStarReport>,
    pub dominance: Vec<DominanceReport>,
    pub per_observable_crossover: Vec<ObservableCrossover>,
    pub bias_variance: Vec<BiasVarianceRow>,
    pub pilot_selection: Vec<PilotSelection>,
    pub significance: Vec<SignificanceRow>,
}

/// Unordered protocol pairs `(a, b)` with `a < b`.
pub fn protocol_pairs(num_protocols: usize) -> Vec<(usize, usize)> {
    (0..num_protocols)
        .flat_map(|a| (a + 1..num_protocols).map(move |b| (a, b)))
        .collect()
}

/// Run every reducer family over `tensor`.
///
/// Pilot selection reads every evaluated budget; all other families see only
/// the tensor's statistics grid. The families are independent and run on
/// scoped threads; the result does not depend on scheduling.
pub fn compare(evaluated: &ResultTensor, config: &ComparisonConfig) -> Comparison {
    let view = evaluated.statistics_view();
    let tensor = &view;
    let pairs = protocol_pairs(tensor.num_protocols());
    let pairs = &pairs;
    log::info!(
        "comparing {} protocols ({} pairs) over {} budgets ({} evaluated)",
        tensor.num_protocols(),
        pairs.len(),
        tensor.num_budgets(),
        evaluated.num_budgets()
    );

    std::thread::scope(|s| {
        let nstar_and_dominance = s.spawn(move || {
            let nstar = nstar::nstar_reports(tensor, config.target_epsilon);
            let dominance: Vec<DominanceReport> = pairs
                .iter()
                .map(|&(a, b)| {
                    dominance::dominance(
                        tensor,
                        a,
                        b,
                        nstar[a].nstar_powerlaw_mean,
                        nstar[b].nstar_powerlaw_mean,
                    )
                })
                .collect();
            (nstar, dominance)
        });
        let crossover = s.spawn(move || {
            pairs
                .iter()
                .map(|&(a, b)| dominance::observable_crossover(tensor, a, b))
                .collect::<Vec<_>>()
        });
        let bias_variance = s.spawn(move || bias_variance::bias_variance_table(tensor));
        let pilot = s.spawn(move || {
            pilot::pilot_selection(evaluated, &config.pilot_fractions, config.pilot_target_n)
        });
        let significance = s.spawn(move || {
            let budgets = tensor.num_budgets() as u64;
            pairs
                .iter()
                .enumerate()
                .flat_map(|(k, &(a, b))| {
                    significance::significance_table(
                        tensor,
                        a,
                        b,
                        config.significance_alpha,
                        config.bootstrap_resamples,
                        config.bootstrap_seed,
                        k as u64 * budgets,
                    )
                })
                .collect::<Vec<_>>()
        });

        let completeness = aggregate::completeness(tensor);
        let aggregates = aggregate::aggregate_table(tensor);
        let locality = aggregate::locality_table(tensor);

        let (nstar, dominance) = join(nstar_and_dominance);
        Comparison {
            completeness,
            aggregates,
            locality,
            nstar,
            dominance,
            per_observable_crossover: join(crossover),
            bias_variance: join(bias_variance),
            pilot_selection: join(pilot),
            significance: join(significance),
        }
    })
}

fn join<T>(handle: std::thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|e| std::panic::resume_unwind(e))
}

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
