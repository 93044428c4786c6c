//! The raw result tensor.
//!
//! Dense `(protocol, observable, budget, replicate)` storage of estimates and
//! their pointwise errors, plus a status per `(protocol, budget, replicate)`
//! row. The harness fills it; the comparison engine only reads it.
//!
//! The evaluated grid may hold budgets that exist only for pilot selection.
//! The statistics grid names the configured budgets every other statistic
//! runs over; [`ResultTensor::statistics_view`] cuts the tensor down to it.

use serde::{Deserialize, Serialize};

use crate::config::validate_shot_grid;
use crate::error::{BenchError, Result};
use crate::observable::ObservableSet;
use crate::protocols::ProtocolKind;

/// What the tensor needs to know about an observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableMeta {
    pub id: String,
    /// Locality (number of non-identity factors).
    pub weight: usize,
    pub ground_truth: Option<f64>,
}

/// One estimate and its errors against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub estimate: f64,
    pub squared_error: f64,
    pub abs_error: f64,
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        estimate: f64::NAN,
        squared_error: f64::NAN,
        abs_error: f64::NAN,
    };

    /// Build a cell; errors are NaN when there is no truth or no estimate.
    pub fn new(estimate: f64, truth: Option<f64>) -> Self {
        match truth {
            Some(t) if !estimate.is_nan() => {
                let diff = estimate - t;
                Cell {
                    estimate,
                    squared_error: diff * diff,
                    abs_error: diff.abs(),
                }
            }
            _ => Cell {
                estimate,
                squared_error: f64::NAN,
                abs_error: f64::NAN,
            },
        }
    }
}

/// Collection state of one `(protocol, budget, replicate)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Never attempted (e.g. the run was cancelled).
    NotRun,
    Acquired,
    /// Shot acquisition failed; every cell in the row is NaN.
    Abandoned,
}

/// Raw benchmark output. Immutable once collection finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTensor {
    protocols: Vec<ProtocolKind>,
    observables: Vec<ObservableMeta>,
    shot_grid: Vec<u64>,
    /// Subset of `shot_grid` the statistics use. Empty means all of it.
    #[serde(default)]
    statistics_grid: Vec<u64>,
    replicates: usize,
    cells: Vec<Cell>,
    status: Vec<RowStatus>,
}

impl ResultTensor {
    /// Allocate an empty tensor; every row starts as [`RowStatus::NotRun`].
    pub fn new(
        protocols: Vec<ProtocolKind>,
        observables: Vec<ObservableMeta>,
        shot_grid: Vec<u64>,
        replicates: usize,
    ) -> Result<Self> {
        validate_shot_grid(&shot_grid)?;
        if replicates == 0 {
            return Err(BenchError::ZeroReplicates);
        }
        if protocols.is_empty() {
            return Err(BenchError::EmptyProtocolList);
        }
        for (i, p) in protocols.iter().enumerate() {
            if protocols[..i].contains(p) {
                return Err(BenchError::DuplicateProtocol(p.to_string()));
            }
        }
        if observables.is_empty() {
            return Err(BenchError::EmptyObservableSet);
        }
        let n_cells = protocols.len() * observables.len() * shot_grid.len() * replicates;
        let n_rows = protocols.len() * shot_grid.len() * replicates;
        Ok(Self {
            protocols,
            observables,
            statistics_grid: shot_grid.clone(),
            shot_grid,
            replicates,
            cells: vec![Cell::EMPTY; n_cells],
            status: vec![RowStatus::NotRun; n_rows],
        })
    }

    /// Allocate a tensor for an observable set.
    pub fn for_observables(
        protocols: Vec<ProtocolKind>,
        observables: &ObservableSet,
        shot_grid: Vec<u64>,
        replicates: usize,
    ) -> Result<Self> {
        let meta = observables
            .iter()
            .map(|o| ObservableMeta {
                id: o.id.clone(),
                weight: o.weight(),
                ground_truth: o.ground_truth,
            })
            .collect();
        Self::new(protocols, meta, shot_grid, replicates)
    }

    pub fn protocols(&self) -> &[ProtocolKind] {
        &self.protocols
    }

    pub fn observables(&self) -> &[ObservableMeta] {
        &self.observables
    }

    pub fn shot_grid(&self) -> &[u64] {
        &self.shot_grid
    }

    /// Budgets the statistics run over (the configured grid).
    pub fn statistics_grid(&self) -> &[u64] {
        if self.statistics_grid.is_empty() {
            &self.shot_grid
        } else {
            &self.statistics_grid
        }
    }

    /// Restrict the statistics to `grid`, which must be a valid grid of
    /// evaluated budgets.
    pub fn with_statistics_grid(mut self, grid: Vec<u64>) -> Result<Self> {
        validate_shot_grid(&grid)?;
        if let Some(&n) = grid.iter().find(|n| !self.shot_grid.contains(n)) {
            return Err(BenchError::BudgetNotEvaluated(n));
        }
        self.statistics_grid = grid;
        Ok(self)
    }

    /// Copy of the tensor holding only the statistics-grid budgets.
    pub fn statistics_view(&self) -> ResultTensor {
        let keep: Vec<usize> = self
            .statistics_grid()
            .iter()
            .filter_map(|&n| self.budget_index(n))
            .collect();
        if keep.len() == self.shot_grid.len() {
            return self.clone();
        }
        let grid: Vec<u64> = keep.iter().map(|&b| self.shot_grid[b]).collect();

        let mut cells = Vec::with_capacity(
            self.protocols.len() * self.observables.len() * keep.len() * self.replicates,
        );
        let mut status = Vec::with_capacity(self.protocols.len() * keep.len() * self.replicates);
        for p in 0..self.protocols.len() {
            for o in 0..self.observables.len() {
                for &b in &keep {
                    for r in 0..self.replicates {
                        cells.push(*self.cell(p, o, b, r));
                    }
                }
            }
            for &b in &keep {
                for r in 0..self.replicates {
                    status.push(self.row_status(p, b, r));
                }
            }
        }

        ResultTensor {
            protocols: self.protocols.clone(),
            observables: self.observables.clone(),
            statistics_grid: grid.clone(),
            shot_grid: grid,
            replicates: self.replicates,
            cells,
            status,
        }
    }

    pub fn replicates(&self) -> usize {
        self.replicates
    }

    pub fn num_protocols(&self) -> usize {
        self.protocols.len()
    }

    pub fn num_observables(&self) -> usize {
        self.observables.len()
    }

    pub fn num_budgets(&self) -> usize {
        self.shot_grid.len()
    }

    pub fn protocol_index(&self, kind: ProtocolKind) -> Option<usize> {
        self.protocols.iter().position(|&p| p == kind)
    }

    pub fn budget_index(&self, budget: u64) -> Option<usize> {
        self.shot_grid.iter().position(|&n| n == budget)
    }

    /// True when at least one observable has ground truth.
    pub fn has_ground_truth(&self) -> bool {
        self.observables.iter().any(|o| o.ground_truth.is_some())
    }

    fn cell_index(&self, p: usize, o: usize, b: usize, r: usize) -> usize {
        ((p * self.observables.len() + o) * self.shot_grid.len() + b) * self.replicates + r
    }

    fn row_index(&self, p: usize, b: usize, r: usize) -> usize {
        (p * self.shot_grid.len() + b) * self.replicates + r
    }

    fn check_row(&self, p: usize, b: usize, r: usize) -> Result<()> {
        for (index, len) in [
            (p, self.protocols.len()),
            (b, self.shot_grid.len()),
            (r, self.replicates),
        ] {
            if index >= len {
                return Err(BenchError::DimensionMismatch {
                    expected: len,
                    actual: index + 1,
                });
            }
        }
        Ok(())
    }

    /// Store one row of estimates (one per observable) and mark it acquired.
    pub fn record_row(&mut self, p: usize, b: usize, r: usize, estimates: &[f64]) -> Result<()> {
        self.check_row(p, b, r)?;
        if estimates.len() != self.observables.len() {
            return Err(BenchError::DimensionMismatch {
                expected: self.observables.len(),
                actual: estimates.len(),
            });
        }
        for (o, &estimate) in estimates.iter().enumerate() {
            let idx = self.cell_index(p, o, b, r);
            self.cells[idx] = Cell::new(estimate, self.observables[o].ground_truth);
        }
        let row = self.row_index(p, b, r);
        self.status[row] = RowStatus::Acquired;
        Ok(())
    }

    /// Mark a row as abandoned; its cells are reset to NaN.
    pub fn mark_abandoned(&mut self, p: usize, b: usize, r: usize) -> Result<()> {
        self.check_row(p, b, r)?;
        for o in 0..self.observables.len() {
            let idx = self.cell_index(p, o, b, r);
            self.cells[idx] = Cell::EMPTY;
        }
        let row = self.row_index(p, b, r);
        self.status[row] = RowStatus::Abandoned;
        Ok(())
    }

    pub fn cell(&self, p: usize, o: usize, b: usize, r: usize) -> &Cell {
        &self.cells[self.cell_index(p, o, b, r)]
    }

    pub fn row_status(&self, p: usize, b: usize, r: usize) -> RowStatus {
        self.status[self.row_index(p, b, r)]
    }

    pub fn is_complete(&self, p: usize, b: usize, r: usize) -> bool {
        self.row_status(p, b, r) == RowStatus::Acquired
    }

    /// Replicate indices with an acquired row at `(p, b)`.
    pub fn completed_replicates(&self, p: usize, b: usize) -> Vec<usize> {
        (0..self.replicates)
            .filter(|&r| self.is_complete(p, b, r))
            .collect()
    }

    /// Squared errors of observable `o` over the completed replicates at `(p, b)`.
    pub fn squared_errors(&self, p: usize, o: usize, b: usize) -> Vec<f64> {
        self.completed_replicates(p, b)
            .into_iter()
            .map(|r| self.cell(p, o, b, r).squared_error)
            .collect()
    }

    /// `(p, b)` pairs with fewer than `replicates` acquired rows.
    pub fn incomplete_cells(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for p in 0..self.protocols.len() {
            for b in 0..self.shot_grid.len() {
                if self.completed_replicates(p, b).len() < self.replicates {
                    out.push((p, b));
                }
            }
        }
        out
    }

    /// Count rows by status: `(acquired, abandoned, not_run)`.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.status.iter().fold((0, 0, 0), |(a, x, n), s| match s {
            RowStatus::Acquired => (a + 1, x, n),
            RowStatus::Abandoned => (a, x + 1, n),
            RowStatus::NotRun => (a, x, n + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(truths: &[Option<f64>]) -> Vec<ObservableMeta> {
        truths
            .iter()
            .enumerate()
            .map(|(i, &t)| ObservableMeta {
                id: format!("o{i}"),
                weight: 1,
                ground_truth: t,
            })
            .collect()
    }

    fn tensor() -> ResultTensor {
        ResultTensor::new(
            vec![ProtocolKind::DirectNaive, ProtocolKind::ClassicalShadowsV0],
            meta(&[Some(0.5), None]),
            vec![100, 1000],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_squared_error_is_abs_error_squared() {
        let mut t = tensor();
        t.record_row(0, 1, 2, &[0.2, 0.9]).unwrap();
        let c = t.cell(0, 0, 1, 2);
        assert!((c.squared_error - c.abs_error * c.abs_error).abs() < 1e-15);
        assert!((c.abs_error - 0.3).abs() < 1e-12);

        // No truth: estimate kept, errors undefined.
        let c = t.cell(0, 1, 1, 2);
        assert_eq!(c.estimate, 0.9);
        assert!(c.squared_error.is_nan());
        assert!(c.abs_error.is_nan());
    }

    #[test]
    fn test_row_status_tracking() {
        let mut t = tensor();
        assert_eq!(t.row_status(1, 0, 0), RowStatus::NotRun);
        t.record_row(1, 0, 0, &[0.0, 0.0]).unwrap();
        t.mark_abandoned(1, 0, 1).unwrap();
        assert_eq!(t.completed_replicates(1, 0), vec![0]);
        assert!(t.cell(1, 0, 0, 1).estimate.is_nan());
        assert_eq!(t.status_counts(), (1, 1, 10));
        assert_eq!(t.incomplete_cells().len(), 4);

        for b in 0..2 {
            for r in 0..3 {
                for p in 0..2 {
                    t.record_row(p, b, r, &[0.5, 0.5]).unwrap();
                }
            }
        }
        assert!(t.incomplete_cells().is_empty());
    }

    #[test]
    fn test_dimension_checks() {
        let mut t = tensor();
        assert_eq!(
            t.record_row(0, 0, 0, &[0.1]),
            Err(BenchError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(t.record_row(0, 0, 3, &[0.1, 0.2]).is_err());
        assert!(t.mark_abandoned(2, 0, 0).is_err());
    }

    #[test]
    fn test_statistics_view_keeps_configured_budgets() {
        let mut t = ResultTensor::new(
            vec![ProtocolKind::DirectNaive, ProtocolKind::ClassicalShadowsV0],
            meta(&[Some(0.0), Some(1.0)]),
            vec![10, 100, 1000],
            2,
        )
        .unwrap()
        .with_statistics_grid(vec![100, 1000])
        .unwrap();
        for p in 0..2 {
            for b in 0..3 {
                for r in 0..2 {
                    let v = (p * 100 + b * 10 + r) as f64 / 1000.0;
                    t.record_row(p, b, r, &[v, -v]).unwrap();
                }
            }
        }
        t.mark_abandoned(1, 2, 0).unwrap();

        let view = t.statistics_view();
        assert_eq!(view.shot_grid(), &[100, 1000]);
        assert_eq!(view.statistics_grid(), &[100, 1000]);
        for p in 0..2 {
            for o in 0..2 {
                for b in 0..2 {
                    for r in 0..2 {
                        assert_eq!(
                            view.cell(p, o, b, r).estimate.to_bits(),
                            t.cell(p, o, b + 1, r).estimate.to_bits()
                        );
                        assert_eq!(view.row_status(p, b, r), t.row_status(p, b + 1, r));
                    }
                }
            }
        }
        assert_eq!(view.row_status(1, 1, 0), RowStatus::Abandoned);
    }

    #[test]
    fn test_statistics_grid_must_be_evaluated() {
        let t = tensor();
        assert_eq!(t.statistics_grid(), &[100, 1000]);
        assert_eq!(
            t.clone().with_statistics_grid(vec![100, 500]),
            Err(BenchError::BudgetNotEvaluated(500))
        );
        assert!(t.clone().with_statistics_grid(vec![1000, 100]).is_err());
        let view = t.statistics_view();
        assert_eq!(view.shot_grid(), t.shot_grid());
        assert_eq!(view.status_counts(), t.status_counts());
    }

    #[test]
    fn test_construction_rejects_bad_dimensions() {
        let m = meta(&[None]);
        assert!(ResultTensor::new(vec![], m.clone(), vec![1], 1).is_err());
        assert!(ResultTensor::new(vec![ProtocolKind::DirectNaive], vec![], vec![1], 1).is_err());
        assert!(ResultTensor::new(vec![ProtocolKind::DirectNaive], m.clone(), vec![1], 0).is_err());
        assert!(
            ResultTensor::new(vec![ProtocolKind::DirectNaive], m.clone(), vec![10, 5], 1).is_err()
        );
        assert!(
            ResultTensor::new(
                vec![ProtocolKind::DirectNaive, ProtocolKind::DirectNaive],
                m,
                vec![1],
                1
            )
            .is_err()
        );
    }
}
