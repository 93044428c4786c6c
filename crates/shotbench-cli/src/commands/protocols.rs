//! `shotbench protocols` and `shotbench config`.

use shotbench_core::{BenchmarkConfig, ProtocolKind};

use super::CommandResult;

pub fn run() {
    println!("{:<26} {:<12} Description", "Protocol", "Calibration");
    println!("{}", "-".repeat(86));
    for kind in ProtocolKind::ALL {
        let calibration = if kind.needs_calibration() { "yes" } else { "-" };
        println!(
            "{:<26} {:<12} {}",
            kind.as_str(),
            calibration,
            kind.description()
        );
    }
}

pub fn print_default_config() -> CommandResult {
    println!(
        "{}",
        serde_json::to_string_pretty(&BenchmarkConfig::default())?
    );
    Ok(())
}
