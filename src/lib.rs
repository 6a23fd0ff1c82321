//! pkgsmoke - install-and-smoke-test harness for the Pareto Security CLI
//!
//! This library exposes the scenario model, the target adapter and every
//! pipeline stage so the binary and the integration tests share one code path.

pub mod aggregate;
pub mod check;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod installer;
pub mod logging;
pub mod models;
pub mod output;
pub mod readiness;
pub mod scenario;
pub mod target;
