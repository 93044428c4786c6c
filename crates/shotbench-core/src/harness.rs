//! Benchmark harness: fills a [`ResultTensor`] on a pool of scoped threads.
//!
//! Every `(protocol, budget, replicate)` cell is independent. Workers pull cell
//! indices from a shared counter; each cell seeds its protocol with
//! [`derive_seed`]`(run_seed, budget, replicate)`, which is the same for every
//! protocol, so replicate `r` at budget `N` sees matched randomness across
//! protocols. The harness does no aggregation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::backend::ShotBackend;
use crate::config::BenchmarkConfig;
use crate::error::{AcquisitionError, BenchError, Result};
use crate::observable::ObservableSet;
use crate::protocols::Protocol;
use crate::seed::derive_seed;
use crate::tensor::ResultTensor;

/// Outcome of one cell before it is written to the tensor.
enum CellOutcome {
    Estimates(Vec<f64>),
    Abandoned(AcquisitionError),
    Invalid(BenchError),
}

struct CellJob {
    p: usize,
    b: usize,
    r: usize,
}

/// Run every prepared protocol over the evaluation grid and replicates.
///
/// - Acquisition failures abandon only the affected row (logged, left NaN).
/// - An estimate outside its protocol's valid range aborts the run with
///   [`BenchError::EstimateOutOfRange`].
/// - When `cancel` is raised, cells not yet started stay `NotRun` and the
///   partially filled tensor is returned.
pub fn run_benchmark(
    protocols: &[Protocol],
    observables: &ObservableSet,
    backend: &dyn ShotBackend,
    config: &BenchmarkConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ResultTensor> {
    config.validate()?;
    if observables.is_empty() {
        return Err(BenchError::EmptyObservableSet);
    }
    if backend.num_qubits() != observables.num_qubits() {
        return Err(BenchError::BackendMismatch {
            backend: backend.num_qubits(),
            observables: observables.num_qubits(),
        });
    }

    let kinds = protocols.iter().map(Protocol::kind).collect();
    let grid = config.evaluation_grid();
    let mut tensor =
        ResultTensor::for_observables(kinds, observables, grid.clone(), config.replicates)?
            .with_statistics_grid(config.shot_grid.clone())?;

    // Budget-major so protocols sharing a seed run close together.
    let mut jobs = Vec::with_capacity(protocols.len() * grid.len() * config.replicates);
    for b in 0..grid.len() {
        for r in 0..config.replicates {
            for p in 0..protocols.len() {
                jobs.push(CellJob { p, b, r });
            }
        }
    }

    let workers = config.resolved_workers().clamp(1, jobs.len().max(1));
    log::info!(
        "running {} cells ({} protocols x {} budgets x {} replicates) on {workers} workers",
        jobs.len(),
        protocols.len(),
        grid.len(),
        config.replicates
    );

    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let (next, abort, jobs, grid) = (&next, &abort, &jobs, &grid);
    let stopped = move || {
        abort.load(Ordering::Relaxed) || cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    };

    let mut results: Vec<(usize, CellOutcome)> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(move || {
                    let mut local = Vec::new();
                    while !stopped() {
                        let j = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(j) else {
                            break;
                        };
                        let protocol = &protocols[job.p];
                        let budget = grid[job.b];
                        let seed = derive_seed(config.run_seed, budget, job.r);
                        let outcome = match protocol.estimate(backend, observables, budget, seed) {
                            Ok(estimates) => {
                                match protocol.check_estimates(observables, &estimates) {
                                    Ok(()) => CellOutcome::Estimates(
                                        estimates.iter().map(|e| e.value).collect(),
                                    ),
                                    Err(e) => {
                                        abort.store(true, Ordering::Relaxed);
                                        CellOutcome::Invalid(e)
                                    }
                                }
                            }
                            Err(e) => CellOutcome::Abandoned(e),
                        };
                        log::debug!(
                            "cell {} N={budget} r={} done",
                            protocol.kind(),
                            job.r
                        );
                        local.push((j, outcome));
                    }
                    local
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });

    results.sort_by_key(|(j, _)| *j);
    for (j, outcome) in results {
        let job = &jobs[j];
        match outcome {
            CellOutcome::Estimates(values) => tensor.record_row(job.p, job.b, job.r, &values)?,
            CellOutcome::Abandoned(err) => {
                log::warn!(
                    "abandoned {} at N={} replicate {}: {err}",
                    protocols[job.p].kind(),
                    grid[job.b],
                    job.r
                );
                tensor.mark_abandoned(job.p, job.b, job.r)?;
            }
            CellOutcome::Invalid(err) => return Err(err),
        }
    }

    let (acquired, abandoned, not_run) = tensor.status_counts();
    if not_run > 0 {
        log::warn!("run stopped early: {not_run} rows were not run");
    }
    log::info!("collected {acquired} rows ({abandoned} abandoned, {not_run} not run)");
    Ok(tensor)
}
