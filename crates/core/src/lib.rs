//! Shared building blocks for the bandit lab: the error taxonomy and the
//! layered configuration used by the engine, the diagnostics and the CLI.

pub mod config;
pub mod error;

pub use config::LabConfig;
pub use error::{LabError, LabResult};
