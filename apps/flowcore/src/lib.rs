//! # flowcore
//!
//! Command-line front end for `flowcore-core`: configuration, scenario
//! playback, chain export and offline verification.

pub mod cli;
pub mod config;
pub mod error;
pub mod scenario;

pub use config::Config;
pub use error::CliError;
pub use scenario::{Scenario, ScenarioOutcome, Step};
