//! `shotbench run`: simulate, collect, compare, report.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use shotbench_core::{
    BenchmarkConfig, CalibrationProvider, DeviceNoise, ObservableSet, ProductState,
    ProductStateBackend, Protocol, ResultTensor, ShotBackend, TabulatedTruth, UnreliableBackend,
    derive_stream_seed, run_benchmark,
};
use shotbench_stats::BenchmarkRun;

use super::{CommandResult, parse_list, parse_protocols, report};

pub struct RunCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub seed: Option<u64>,
    pub name: Option<&'a str>,
    pub protocols: Option<&'a str>,
    pub shots: Option<&'a str>,
    pub replicates: Option<usize>,
    pub epsilon: Option<f64>,
    pub pilot_fractions: Option<&'a str>,
    pub workers: Option<usize>,
    pub qubits: usize,
    pub observables: usize,
    pub max_weight: usize,
    pub state: &'a str,
    pub readout_error: f64,
    pub gate_error: f64,
    pub failure_rate: f64,
    pub with_truth: bool,
    /// JSON `{"label": value}` file replacing the simulated state's exact values.
    pub truth_path: Option<&'a str>,
    pub output_path: Option<&'a str>,
    pub report_path: Option<&'a str>,
    pub tensor_path: Option<&'a str>,
}

/// Load the JSON config (or defaults) and apply flag overrides.
pub fn resolve_config(
    cfg: &RunCommandConfig<'_>,
) -> Result<BenchmarkConfig, Box<dyn std::error::Error>> {
    let mut config = match cfg.config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read config {path}: {e}"))?;
            serde_json::from_str::<BenchmarkConfig>(&text)
                .map_err(|e| format!("invalid config {path}: {e}"))?
        }
        None => BenchmarkConfig::default(),
    };

    match (cfg.seed, cfg.config_path) {
        (Some(seed), _) => config.run_seed = seed,
        (None, Some(_)) => {}
        (None, None) => config.run_seed = os_seed()?,
    }
    if let Some(name) = cfg.name {
        config.run_name = name.to_string();
    }
    if let Some(raw) = cfg.protocols {
        config.protocols = parse_protocols(raw)?;
    }
    if let Some(raw) = cfg.shots {
        config.shot_grid = parse_list(raw, "shot budget")?;
    }
    if let Some(r) = cfg.replicates {
        config.replicates = r;
    }
    if let Some(eps) = cfg.epsilon {
        config.target_epsilon = eps;
    }
    if let Some(raw) = cfg.pilot_fractions {
        config.pilot_fractions = parse_list(raw, "pilot fraction")?;
    }
    if let Some(w) = cfg.workers {
        config.workers = w;
    }
    config.validate()?;
    Ok(config)
}

fn os_seed() -> Result<u64, Box<dyn std::error::Error>> {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).map_err(|e| format!("OS random source failed: {e}"))?;
    Ok(u64::from_le_bytes(buf))
}

/// Build the simulated state, observables and run everything.
///
/// Returns the record and the raw tensor.
pub fn execute(
    cfg: &RunCommandConfig<'_>,
    config: &BenchmarkConfig,
    cancel: Option<&AtomicBool>,
) -> Result<(BenchmarkRun, ResultTensor), Box<dyn std::error::Error>> {
    let state_seed = derive_stream_seed(config.run_seed, "state", 0);
    let state = match cfg.state {
        "zero" => ProductState::zero(cfg.qubits)?,
        "plus" => ProductState::plus(cfg.qubits)?,
        _ => ProductState::random(cfg.qubits, state_seed)?,
    };
    let mut observables = ObservableSet::random_local(
        cfg.qubits,
        cfg.observables,
        cfg.max_weight,
        derive_stream_seed(config.run_seed, "observables", 0),
    )?;
    if !cfg.with_truth {
        log::warn!("ground truth withheld; error statistics will be undefined");
    } else if let Some(path) = cfg.truth_path {
        observables = observables.with_ground_truth(&load_truth(path)?)?;
        let missing = observables.iter().filter(|o| o.ground_truth.is_none()).count();
        if missing > 0 {
            log::warn!("{missing} observables have no entry in {path}; their errors are undefined");
        }
    } else {
        observables = observables.with_ground_truth(&state)?;
    }

    let noise = DeviceNoise::uniform(cfg.qubits, cfg.readout_error, cfg.gate_error);
    let device = ProductStateBackend::new(state, noise)?;
    let flaky;
    let backend: &dyn ShotBackend = if cfg.failure_rate > 0.0 {
        flaky = UnreliableBackend::new(device.clone(), cfg.failure_rate)?;
        &flaky
    } else {
        &device
    };

    log::info!(
        "run '{}' seed={} protocols={} observables={} qubits={} grid={:?} replicates={}",
        config.run_name,
        config.run_seed,
        config.protocols.len(),
        observables.len(),
        cfg.qubits,
        config.evaluation_grid(),
        config.replicates
    );

    let calibration: &dyn CalibrationProvider = &device;
    let protocols = Protocol::prepare_all(config, &observables, Some(calibration))?;
    let t0 = Instant::now();
    let tensor = run_benchmark(&protocols, &observables, backend, config, cancel)?;
    log::info!("collection finished in {:.2}s", t0.elapsed().as_secs_f64());

    let run = BenchmarkRun::assemble(config, &tensor, cfg.qubits);
    Ok((run, tensor))
}

fn load_truth(path: &str) -> Result<TabulatedTruth, Box<dyn std::error::Error>> {
    let text =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read truth file {path}: {e}"))?;
    let truth = serde_json::from_str(&text).map_err(|e| format!("invalid truth file {path}: {e}"))?;
    Ok(truth)
}

fn write_file(path: &str, contents: &str, what: &str) -> CommandResult {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).map_err(|e| format!("failed to write {what} to {path}: {e}"))?;
    println!("{what} saved to: {path}");
    Ok(())
}

pub fn run(cfg: RunCommandConfig<'_>) -> CommandResult {
    let config = resolve_config(&cfg)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }

    let (run, tensor) = execute(&cfg, &config, Some(cancel.as_ref()))?;
    if cancel.load(Ordering::SeqCst) {
        println!("Interrupted: statistics cover the cells collected so far.");
    }

    report::print_summary(&run);

    if let Some(path) = cfg.output_path {
        write_file(path, &run.to_json()?, "Run record")?;
    }
    if let Some(path) = cfg.report_path {
        write_file(path, &report::render_markdown(&run), "Report")?;
    }
    if let Some(path) = cfg.tensor_path {
        write_file(path, &serde_json::to_string(&tensor)?, "Result tensor")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotbench_core::ProtocolKind;

    fn cfg<'a>() -> RunCommandConfig<'a> {
        RunCommandConfig {
            config_path: None,
            seed: Some(3),
            name: Some("unit"),
            protocols: Some("direct_grouped,classical_shadows_v0"),
            shots: Some("50,200"),
            replicates: Some(3),
            epsilon: None,
            pilot_fractions: Some("0.25"),
            workers: Some(1),
            qubits: 3,
            observables: 5,
            max_weight: 2,
            state: "random",
            readout_error: 0.0,
            gate_error: 0.0,
            failure_rate: 0.0,
            with_truth: true,
            truth_path: None,
            output_path: None,
            report_path: None,
            tensor_path: None,
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = resolve_config(&cfg()).unwrap();
        assert_eq!(config.run_seed, 3);
        assert_eq!(config.run_name, "unit");
        assert_eq!(
            config.protocols,
            vec![ProtocolKind::DirectGrouped, ProtocolKind::ClassicalShadowsV0]
        );
        assert_eq!(config.shot_grid, vec![50, 200]);
        assert_eq!(config.pilot_fractions, vec![0.25]);
    }

    #[test]
    fn test_config_file_is_read_and_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"run_seed": 77, "shot_grid": [10, 20], "replicates": 2}"#,
        )
        .unwrap();
        let path = path.to_string_lossy().to_string();
        let c = RunCommandConfig {
            config_path: Some(&path),
            seed: None,
            shots: None,
            replicates: None,
            ..cfg()
        };
        let config = resolve_config(&c).unwrap();
        assert_eq!(config.run_seed, 77);
        assert_eq!(config.shot_grid, vec![10, 20]);
        assert_eq!(config.replicates, 2);
        assert_eq!(config.run_name, "unit");
    }

    #[test]
    fn test_invalid_grid_is_rejected() {
        let c = RunCommandConfig {
            shots: Some("200,50"),
            ..cfg()
        };
        assert!(resolve_config(&c).is_err());
    }

    #[test]
    fn test_execute_is_reproducible() {
        let c = cfg();
        let config = resolve_config(&c).unwrap();
        let (a, ta) = execute(&c, &config, None).unwrap();
        let (b, tb) = execute(&c, &config, None).unwrap();
        assert_eq!(ta, tb);
        assert_eq!(a.evaluated_grid, b.evaluated_grid);
        assert_ne!(a.id, b.id);
        assert!(a.is_complete());
    }

    #[test]
    fn test_truth_file_supplies_ground_truth() {
        let c = cfg();
        let config = resolve_config(&c).unwrap();
        let (_, simulated) = execute(&c, &config, None).unwrap();
        let ids: Vec<String> = simulated.observables().iter().map(|o| o.id.clone()).collect();

        // Every observable but the last gets a tabulated value.
        let table: std::collections::HashMap<&str, f64> = ids[..ids.len() - 1]
            .iter()
            .map(|id| (id.as_str(), 0.125))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truth.json");
        std::fs::write(&path, serde_json::to_string(&table).unwrap()).unwrap();
        let path = path.to_string_lossy().to_string();

        let c = RunCommandConfig {
            truth_path: Some(&path),
            ..cfg()
        };
        let (run, tensor) = execute(&c, &config, None).unwrap();
        let truths: Vec<Option<f64>> = tensor.observables().iter().map(|o| o.ground_truth).collect();
        assert!(truths[..ids.len() - 1].iter().all(|&t| t == Some(0.125)));
        assert_eq!(truths[ids.len() - 1], None);
        assert!(run.ground_truth_available);
    }

    #[test]
    fn test_bad_truth_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truth.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let path = path.to_string_lossy().to_string();
        let c = RunCommandConfig {
            truth_path: Some(&path),
            ..cfg()
        };
        let config = resolve_config(&c).unwrap();
        let err = execute(&c, &config, None).unwrap_err();
        assert!(err.to_string().starts_with("invalid truth file"));
    }

    #[test]
    fn test_outputs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/run.json").to_string_lossy().to_string();
        let md = dir.path().join("report.md").to_string_lossy().to_string();
        let c = RunCommandConfig {
            output_path: Some(&out),
            report_path: Some(&md),
            ..cfg()
        };
        let config = resolve_config(&c).unwrap();
        let (run, _) = execute(&c, &config, None).unwrap();
        write_file(&out, &run.to_json().unwrap(), "Run record").unwrap();
        write_file(&md, &report::render_markdown(&run), "Report").unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["run_name"], "unit");
        assert!(json["pilot_selection"].is_array());
        assert!(std::fs::read_to_string(&md).unwrap().starts_with("# shotbench report: unit"));
    }
}
