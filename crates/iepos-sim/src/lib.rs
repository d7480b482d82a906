//! # IEPOS Simulator
//!
//! Runs I-EPOS (or the exhaustive baseline) over a simulated tree.
//!
//! ## Pieces
//!
//! - [`config`]: layered settings (file, `.env`, `IEPOS_*` environment)
//! - [`dataset`]: Gaussian and file-backed plan menus
//! - [`runtime`]: one tokio task per node, talking over channels
//! - [`experiment`]: the phase driver
//! - [`report`]: per-phase cost and work summaries

pub mod config;
pub mod dataset;
pub mod experiment;
pub mod report;
pub mod runtime;

pub use config::SimConfig;
pub use dataset::{FileDataset, NoiseDataset};
pub use experiment::{Experiment, PhaseRunner};
pub use report::PhaseSummary;
pub use runtime::TreeRuntime;

/// Simulator version
pub const SIM_VERSION: &str = env!("CARGO_PKG_VERSION");
