//! # shotbench-core
//!
//! **How many shots does it take to know an expectation value?**
//!
//! `shotbench-core` runs quantum-observable estimation protocols (direct
//! measurement baselines and classical shadows) over a grid of shot budgets and
//! independent replicates, and records every raw estimate in a
//! [`ResultTensor`]. The statistics live in `shotbench-stats`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shotbench_core::{
//!     BenchmarkConfig, CalibrationProvider, ObservableSet, ProductState,
//!     ProductStateBackend, Protocol, run_benchmark,
//! };
//!
//! let state = ProductState::random(4, 7).unwrap();
//! let observables = ObservableSet::random_local(4, 12, 2, 7)
//!     .unwrap()
//!     .with_ground_truth(&state)
//!     .unwrap();
//! let backend = ProductStateBackend::ideal(state);
//!
//! let config = BenchmarkConfig::default();
//! let calibration: &dyn CalibrationProvider = &backend;
//! let protocols = Protocol::prepare_all(&config, &observables, Some(calibration)).unwrap();
//! let tensor = run_benchmark(&protocols, &observables, &backend, &config, None).unwrap();
//! println!("{} budgets evaluated", tensor.shot_grid().len());
//! ```
//!
//! ## Architecture
//!
//! Observables + truth → Protocols → Harness → ResultTensor
//!
//! Protocols see the device only through the [`ShotBackend`] trait. Every
//! random stream is derived from `run_seed` with SHA-256 ([`seed`]), and a
//! replicate's seed never depends on the protocol, so replicate `r` is a
//! matched noise realization across protocols.

pub mod backend;
pub mod calibration;
pub mod config;
pub mod error;
pub mod grouping;
pub mod harness;
pub mod observable;
pub mod pauli;
pub mod protocols;
pub mod seed;
pub mod tensor;

pub use backend::{
    CalibrationProvider, DeviceNoise, ProductState, ProductStateBackend, ShotBackend,
    UnreliableBackend,
};
pub use calibration::{FidelityTable, MIN_FIDELITY, calibrate};
pub use config::{BenchmarkConfig, validate_shot_grid};
pub use error::{AcquisitionError, BenchError, Result};
pub use grouping::{group_setting, qwc_groups};
pub use harness::run_benchmark;
pub use observable::{GroundTruthProvider, Observable, ObservableSet, TabulatedTruth};
pub use pauli::{Basis, MAX_QUBITS, MeasurementSetting, Pauli, PauliString};
pub use protocols::{ObservableEstimate, Protocol, ProtocolKind};
pub use seed::{derive_seed, derive_stream_seed};
pub use tensor::{Cell, ObservableMeta, ResultTensor, RowStatus};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
