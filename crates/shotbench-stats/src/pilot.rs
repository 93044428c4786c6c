//! Pilot-fraction protocol selection.
//!
//! For a pilot fraction `f`, each replicate picks the protocol with the lowest
//! error at the pilot budget `round(f * target_n)` and is then scored at
//! `target_n` on the same replicate index. Picks are judged against ground
//! truth (the "truth_based" criterion), so selection is undefined without it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shotbench_core::{ProtocolKind, ResultTensor};

use crate::summary::{argmin, paired_row_means};

pub const CRITERION_TRUTH_BASED: &str = "truth_based";

/// Selection quality for one pilot fraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotSelection {
    pub pilot_fraction: f64,
    /// `round(pilot_fraction * target_n)`.
    pub requested_pilot_n: u64,
    /// Largest evaluated budget not above the requested one.
    pub pilot_n: Option<u64>,
    pub target_n: u64,
    /// Fraction of replicates whose pilot pick is the oracle best at `target_n`.
    pub selection_accuracy: f64,
    /// Mean over replicates of `SE(pick) - SE(oracle)` at `target_n`.
    pub regret: f64,
    pub criterion_type: String,
    pub replicates_used: usize,
    /// How often each protocol was picked.
    pub pick_counts: BTreeMap<ProtocolKind, usize>,
}

impl PilotSelection {
    fn undefined(pilot_fraction: f64, requested_pilot_n: u64, target_n: u64) -> Self {
        Self {
            pilot_fraction,
            requested_pilot_n,
            pilot_n: None,
            target_n,
            selection_accuracy: f64::NAN,
            regret: f64::NAN,
            criterion_type: CRITERION_TRUTH_BASED.to_string(),
            replicates_used: 0,
            pick_counts: BTreeMap::new(),
        }
    }
}

/// Evaluate every pilot fraction against `target_n` (largest grid budget when `None`).
pub fn pilot_selection(
    tensor: &ResultTensor,
    pilot_fractions: &[f64],
    target_n: Option<u64>,
) -> Vec<PilotSelection> {
    let grid = tensor.shot_grid();
    let target_n = target_n.or_else(|| grid.last().copied()).unwrap_or(0);
    pilot_fractions
        .iter()
        .map(|&f| select_one(tensor, f, target_n))
        .collect()
}

fn select_one(tensor: &ResultTensor, fraction: f64, target_n: u64) -> PilotSelection {
    let requested = (fraction * target_n as f64).round() as u64;
    let mut out = PilotSelection::undefined(fraction, requested, target_n);
    if requested == 0 || !tensor.has_ground_truth() {
        return out;
    }
    let Some(tb) = tensor.budget_index(target_n) else {
        return out;
    };
    let Some(pb) = tensor.shot_grid().iter().rposition(|&n| n <= requested) else {
        return out;
    };
    out.pilot_n = Some(tensor.shot_grid()[pb]);

    let protocols: Vec<usize> = (0..tensor.num_protocols()).collect();
    let replicates: Vec<usize> = (0..tensor.replicates())
        .filter(|&r| {
            protocols
                .iter()
                .all(|&p| tensor.is_complete(p, pb, r) && tensor.is_complete(p, tb, r))
        })
        .collect();

    let mut hits = 0usize;
    let mut regret_sum = 0.0;
    let mut used = 0usize;
    for r in replicates {
        let pilot_se = paired_row_means(tensor, &protocols, pb, r);
        let target_se = paired_row_means(tensor, &protocols, tb, r);
        let (Some(pick), Some(oracle)) = (argmin(&pilot_se), argmin(&target_se)) else {
            continue;
        };
        if !target_se[pick].is_finite() {
            continue;
        }
        used += 1;
        if pick == oracle {
            hits += 1;
        }
        regret_sum += (target_se[pick] - target_se[oracle]).max(0.0);
        *out
            .pick_counts
            .entry(tensor.protocols()[pick])
            .or_insert(0) += 1;
    }

    if used > 0 {
        out.selection_accuracy = hits as f64 / used as f64;
        out.regret = regret_sum / used as f64;
    }
    out.replicates_used = used;
    out
}
