//! CLI for shotbench: benchmark observable-estimation protocols across shot budgets.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shotbench")]
#[command(about = "shotbench: how many shots does each estimation protocol need?")]
#[command(version = shotbench_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every protocol over the shot grid on a simulated product state and compare them
    Run {
        /// JSON configuration file; flags below override its fields
        #[arg(long)]
        config: Option<String>,

        /// Run seed (drawn from the OS when neither this nor --config sets it)
        #[arg(long)]
        seed: Option<u64>,

        /// Run name carried into the record
        #[arg(long)]
        name: Option<String>,

        /// Comma-separated protocol ids, or "all"
        #[arg(long)]
        protocols: Option<String>,

        /// Comma-separated, strictly increasing shot budgets
        #[arg(long)]
        shots: Option<String>,

        /// Replicates per (protocol, budget)
        #[arg(long)]
        replicates: Option<usize>,

        /// Squared-error target for N*
        #[arg(long)]
        epsilon: Option<f64>,

        /// Comma-separated pilot fractions in (0, 1]
        #[arg(long)]
        pilot_fractions: Option<String>,

        /// Worker threads (0 = available parallelism)
        #[arg(long)]
        workers: Option<usize>,

        /// Number of qubits of the simulated state
        #[arg(long, default_value = "4")]
        qubits: usize,

        /// Number of random observables
        #[arg(long, default_value = "16")]
        observables: usize,

        /// Maximum observable weight
        #[arg(long, default_value = "2")]
        max_weight: usize,

        /// Simulated product state
        #[arg(long, default_value = "random", value_parser = ["zero", "plus", "random"])]
        state: String,

        /// Per-qubit readout flip probability
        #[arg(long, default_value = "0.0")]
        readout_error: f64,

        /// Per-qubit depolarizing error of the X/Y basis rotation
        #[arg(long, default_value = "0.0")]
        gate_error: f64,

        /// Probability that a shot request fails and its row is abandoned
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Withhold ground truth (error statistics become undefined)
        #[arg(long)]
        no_truth: bool,

        /// JSON file of exact expectation values keyed by Pauli label
        #[arg(long, conflicts_with = "no_truth")]
        truth: Option<String>,

        /// Write the run record as JSON
        #[arg(long)]
        output: Option<String>,

        /// Write a Markdown report
        #[arg(long)]
        report: Option<String>,

        /// Write the raw result tensor as JSON
        #[arg(long)]
        tensor: Option<String>,
    },

    /// List the available protocols
    Protocols,

    /// Print the default configuration as JSON
    Config,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            seed,
            name,
            protocols,
            shots,
            replicates,
            epsilon,
            pilot_fractions,
            workers,
            qubits,
            observables,
            max_weight,
            state,
            readout_error,
            gate_error,
            failure_rate,
            no_truth,
            truth,
            output,
            report,
            tensor,
        } => commands::run::run(commands::run::RunCommandConfig {
            config_path: config.as_deref(),
            seed,
            name: name.as_deref(),
            protocols: protocols.as_deref(),
            shots: shots.as_deref(),
            replicates,
            epsilon,
            pilot_fractions: pilot_fractions.as_deref(),
            workers,
            qubits,
            observables,
            max_weight,
            state: &state,
            readout_error,
            gate_error,
            failure_rate,
            with_truth: !no_truth,
            truth_path: truth.as_deref(),
            output_path: output.as_deref(),
            report_path: report.as_deref(),
            tensor_path: tensor.as_deref(),
        }),
        Commands::Protocols => {
            commands::protocols::run();
            Ok(())
        }
        Commands::Config => commands::protocols::print_default_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
