//! Console summary and Markdown report for a [`BenchmarkRun`].
//!
//! Undefined statistics render as "—" so a missing value never reads as zero.

use std::fmt::Write as _;

use shotbench_stats::{BenchmarkRun, CrossoverDirection};

use super::{fmt_num, fmt_opt};

/// Print the headline tables to stdout.
pub fn print_summary(run: &BenchmarkRun) {
    let c = &run.comparison;
    let incomplete: Vec<_> = c.completeness.iter().filter(|r| !r.complete).collect();
    if !incomplete.is_empty() {
        println!("\nIncomplete cells:");
        for row in &incomplete {
            println!(
                "  {:<26} N={:<7} {}/{} replicates ({} abandoned, {} not run)",
                row.protocol.as_str(),
                row.budget,
                row.completed,
                row.expected,
                row.abandoned,
                row.not_run
            );
        }
    }

    println!("\n{}", "=".repeat(78));
    println!(
        "{:<26} {:>10} {:>10} {:>12} {:>14}",
        "Protocol", "N*(avg)", "N*(max)", "N*(power)", "R^2 (mean)"
    );
    println!("{}", "-".repeat(78));
    for r in &c.nstar {
        println!(
            "{:<26} {:>10} {:>10} {:>12} {:>14}",
            r.protocol.as_str(),
            r.nstar_average.map_or_else(|| "—".to_string(), |n| n.to_string()),
            r.nstar_worst_case.map_or_else(|| "—".to_string(), |n| n.to_string()),
            fmt_opt(r.nstar_powerlaw_mean, 0),
            fmt_num(r.powerlaw_mean.r_squared, 4),
        );
    }
    println!(
        "\nN* is the smallest budget with mean squared error <= {} (power law extrapolates).",
        run.target_epsilon
    );

    if let Some(best) = best_at_largest_budget(run) {
        println!("Lowest mean SE at N={}: {}", best.1, best.0);
    }
}

/// Protocol with the lowest mean SE at the largest configured budget.
fn best_at_largest_budget(run: &BenchmarkRun) -> Option<(String, u64)> {
    let largest = *run.shot_grid.last()?;
    run.comparison
        .aggregates
        .iter()
        .filter(|r| r.budget == largest && r.mean_se.is_finite())
        .min_by(|a, b| {
            a.mean_se
                .partial_cmp(&b.mean_se)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|r| (r.protocol.to_string(), largest))
}

fn direction(d: Option<CrossoverDirection>) -> &'static str {
    match d {
        Some(CrossoverDirection::AThenB) => "A then B",
        Some(CrossoverDirection::BThenA) => "B then A",
        None => "—",
    }
}

fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

/// Render the full Markdown report.
pub fn render_markdown(run: &BenchmarkRun) -> String {
    let c = &run.comparison;
    let mut md = String::new();
    let _ = writeln!(md, "# shotbench report: {}\n", run.run_name);
    let _ = writeln!(md, "- Run id: `{}`", run.id);
    let _ = writeln!(md, "- Created: unix {}", run.created_unix);
    let _ = writeln!(md, "- Seed: {}", run.run_seed);
    let _ = writeln!(
        md,
        "- Protocols: {}",
        run.protocols
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(
        md,
        "- Observables: {} on {} qubits",
        run.num_observables, run.num_qubits
    );
    let _ = writeln!(md, "- Shot grid: {:?} (evaluated {:?})", run.shot_grid, run.evaluated_grid);
    let _ = writeln!(md, "- Replicates: {}", run.replicates);
    let _ = writeln!(md, "- Target: epsilon = {}, delta = {}", run.target_epsilon, run.delta);
    if !run.ground_truth_available {
        let _ = writeln!(md, "\n> Ground truth was not available: error statistics are undefined.");
    }

    md.push_str("\n## Completeness\n\n");
    md.push_str("| Protocol | N | Completed | Abandoned | Not run | Complete |\n");
    md.push_str("|----------|---|-----------|-----------|---------|----------|\n");
    for r in &c.completeness {
        let _ = writeln!(
            md,
            "| {} | {} | {}/{} | {} | {} | {} |",
            r.protocol,
            r.budget,
            r.completed,
            r.expected,
            r.abandoned,
            r.not_run,
            yes_no(r.complete)
        );
    }

    md.push_str("\n## Error by budget\n\n");
    md.push_str("| Protocol | N | Mean SE | Median SE | Max SE | Mean abs error | Observables |\n");
    md.push_str("|----------|---|---------|-----------|--------|----------------|-------------|\n");
    for r in &c.aggregates {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} |",
            r.protocol,
            r.budget,
            fmt_num(r.mean_se, 6),
            fmt_num(r.median_se, 6),
            fmt_num(r.max_se, 6),
            fmt_num(r.mean_abs_error, 5),
            r.observables_used
        );
    }

    md.push_str("\n## Error by locality\n\n");
    md.push_str("| Protocol | N | Weight | Mean SE | Observables |\n");
    md.push_str("|----------|---|--------|---------|-------------|\n");
    for r in &c.locality {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} |",
            r.protocol,
            r.budget,
            r.weight,
            fmt_num(r.mean_se, 6),
            r.observables_used
        );
    }

    md.push_str("\n## N*\n\n");
    md.push_str("| Protocol | N* (mean SE) | N* (max SE) | Power law a | b | R² | N* (power, mean) | N* (power, max) |\n");
    md.push_str("|----------|--------------|-------------|-------------|---|----|------------------|-----------------|\n");
    for r in &c.nstar {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            r.protocol,
            r.nstar_average.map_or_else(|| "—".to_string(), |n| n.to_string()),
            r.nstar_worst_case.map_or_else(|| "—".to_string(), |n| n.to_string()),
            fmt_num(r.powerlaw_mean.a, 4),
            fmt_num(r.powerlaw_mean.b, 4),
            fmt_num(r.powerlaw_mean.r_squared, 4),
            fmt_opt(r.nstar_powerlaw_mean, 0),
            fmt_opt(r.nstar_powerlaw_max, 0),
        );
    }

    md.push_str("\n## Dominance\n\n");
    md.push_str("\"Always better\" means mean SE at most the other's at every grid point; equal curves mark both.\n\n");
    md.push_str("| A | B | A always better | B always better | Crossover N | Direction | Crossings | SSR |\n");
    md.push_str("|---|---|-----------------|-----------------|-------------|-----------|-----------|-----|\n");
    for d in &c.dominance {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            d.protocol_a,
            d.protocol_b,
            yes_no(d.always_a_better),
            yes_no(d.always_b_better),
            fmt_opt(d.crossover_n, 0),
            direction(d.crossover_direction),
            d.n_crossovers,
            fmt_opt(d.ssr, 3),
        );
    }

    md.push_str("\n## Per-observable winners\n\n");
    md.push_str("| A | B | A always | B always | Crossover | Observables |\n");
    md.push_str("|---|---|----------|----------|-----------|-------------|\n");
    for o in &c.per_observable_crossover {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} |",
            o.protocol_a,
            o.protocol_b,
            fmt_num(o.frac_a_always_better, 3),
            fmt_num(o.frac_b_always_better, 3),
            fmt_num(o.frac_crossover, 3),
            o.observables_used
        );
    }

    md.push_str("\n## Pilot selection\n\n");
    md.push_str("| Fraction | Pilot N | Target N | Accuracy | Regret | Replicates | Criterion |\n");
    md.push_str("|----------|---------|----------|----------|--------|------------|-----------|\n");
    for s in &c.pilot_selection {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} |",
            s.pilot_fraction,
            s.pilot_n.map_or_else(|| "—".to_string(), |n| n.to_string()),
            s.target_n,
            fmt_num(s.selection_accuracy, 3),
            fmt_num(s.regret, 6),
            s.replicates_used,
            s.criterion_type
        );
    }

    md.push_str("\n## Significance\n\n");
    md.push_str("| A | B | N | Pairs | Mean diff | p (paired t) | Reject | KS D | p (KS) | SSF | SSF 95% CI |\n");
    md.push_str("|---|---|---|-------|-----------|--------------|--------|------|--------|-----|------------|\n");
    for s in &c.significance {
        let reject = match s.reject_null {
            Some(true) => "yes",
            Some(false) => "no",
            None => "—",
        };
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | [{}, {}] |",
            s.protocol_a,
            s.protocol_b,
            s.budget,
            s.n_pairs,
            fmt_num(s.mean_diff, 6),
            fmt_num(s.diff_p_value, 4),
            reject,
            fmt_num(s.ks_statistic, 4),
            fmt_num(s.ks_p_value, 4),
            fmt_num(s.ssf, 3),
            fmt_num(s.ssf_ci_low, 3),
            fmt_num(s.ssf_ci_high, 3),
        );
    }

    md.push_str("\n## Bias and variance\n\n");
    let violations = c.bias_variance.iter().filter(|r| !r.identity_holds).count();
    let _ = writeln!(
        md,
        "{} rows, {} failing the identity mse = bias² + variance.\n",
        c.bias_variance.len(),
        violations
    );
    md.push_str("| Protocol | N | Observable | Truth | Mean estimate | Bias | Variance | MSE |\n");
    md.push_str("|----------|---|------------|-------|---------------|------|----------|-----|\n");
    for r in &c.bias_variance {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            r.protocol,
            r.budget,
            r.observable,
            fmt_num(r.ground_truth, 4),
            fmt_num(r.mean_estimate, 4),
            fmt_num(r.bias, 5),
            fmt_num(r.variance, 6),
            fmt_num(r.mse, 6),
        );
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotbench_core::{BenchmarkConfig, ObservableMeta, ProtocolKind, ResultTensor};

    fn run(truth: Option<f64>) -> BenchmarkRun {
        let config = BenchmarkConfig {
            run_name: "unit".into(),
            protocols: vec![ProtocolKind::DirectNaive, ProtocolKind::DirectGrouped],
            shot_grid: vec![10, 100],
            replicates: 1,
            pilot_fractions: vec![0.1],
            ..BenchmarkConfig::default()
        };
        let mut t = ResultTensor::new(
            config.protocols.clone(),
            vec![ObservableMeta {
                id: "ZZ".into(),
                weight: 2,
                ground_truth: truth,
            }],
            vec![10, 100],
            1,
        )
        .unwrap();
        t.record_row(0, 0, 0, &[0.5]).unwrap();
        t.record_row(0, 1, 0, &[0.9]).unwrap();
        t.record_row(1, 0, 0, &[0.7]).unwrap();
        t.mark_abandoned(1, 1, 0).unwrap();
        BenchmarkRun::assemble(&config, &t, 2)
    }

    #[test]
    fn test_markdown_has_every_section() {
        let md = render_markdown(&run(Some(1.0)));
        for heading in [
            "## Completeness",
            "## Error by budget",
            "## Error by locality",
            "## N*",
            "## Dominance",
            "## Per-observable winners",
            "## Pilot selection",
            "## Significance",
            "## Bias and variance",
        ] {
            assert!(md.contains(heading), "missing {heading}");
        }
        assert!(md.contains("| direct_grouped | 100 | 0/1 | 1 | 0 | no |"));
        assert!(md.contains("truth_based"));
    }

    #[test]
    fn test_missing_truth_renders_dashes() {
        let md = render_markdown(&run(None));
        assert!(md.contains("Ground truth was not available"));
        assert!(md.contains("| direct_naive | 10 | — | — | — | — | 0 |"));
    }

    #[test]
    fn test_best_protocol_at_largest_budget() {
        let r = run(Some(1.0));
        assert_eq!(
            best_at_largest_budget(&r),
            Some(("direct_naive".to_string(), 100))
        );
    }
}
