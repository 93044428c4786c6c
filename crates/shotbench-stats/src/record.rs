//! The run record: configuration, completeness and every derived statistic.
//!
//! A [`BenchmarkRun`] is assembled once from the configuration and the filled
//! tensor and never mutated. Undefined statistics are NaN in memory and
//! serialize as JSON `null`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use shotbench_core::{BenchmarkConfig, ProtocolKind, ResultTensor};
use uuid::Uuid;

use crate::{Comparison, ComparisonConfig, compare};

/// Record format version.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRun {
    pub version: u32,
    pub id: String,
    pub run_name: String,
    pub created_unix: u64,
    pub tool_version: String,
    pub run_seed: u64,
    pub protocols: Vec<ProtocolKind>,
    pub num_observables: usize,
    pub num_qubits: usize,
    /// Budgets as configured; every statistic except pilot selection uses these.
    pub shot_grid: Vec<u64>,
    /// Budgets actually evaluated, including added pilot budgets.
    pub evaluated_grid: Vec<u64>,
    pub replicates: usize,
    pub target_epsilon: f64,
    pub delta: f64,
    pub ground_truth_available: bool,
    #[serde(flatten)]
    pub comparison: Comparison,
}

impl BenchmarkRun {
    /// Run the comparison engine over `tensor` and wrap the result.
    pub fn assemble(config: &BenchmarkConfig, tensor: &ResultTensor, num_qubits: usize) -> Self {
        let comparison = compare(tensor, &ComparisonConfig::from(config));
        Self::from_comparison(config, tensor, num_qubits, comparison)
    }

    pub fn from_comparison(
        config: &BenchmarkConfig,
        tensor: &ResultTensor,
        num_qubits: usize,
        comparison: Comparison,
    ) -> Self {
        let created_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            version: RECORD_VERSION,
            id: Uuid::new_v4().to_string(),
            run_name: config.run_name.clone(),
            created_unix,
            tool_version: crate::VERSION.to_string(),
            run_seed: config.run_seed,
            protocols: tensor.protocols().to_vec(),
            num_observables: tensor.num_observables(),
            num_qubits,
            shot_grid: tensor.statistics_grid().to_vec(),
            evaluated_grid: tensor.shot_grid().to_vec(),
            replicates: tensor.replicates(),
            target_epsilon: config.target_epsilon,
            delta: config.delta,
            ground_truth_available: tensor.has_ground_truth(),
            comparison,
        }
    }

    /// True when every (protocol, budget) cell collected all replicates.
    pub fn is_complete(&self) -> bool {
        self.comparison.completeness.iter().all(|row| row.complete)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
