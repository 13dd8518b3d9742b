//! Errors surfaced by the CLI.

use flowcore_core::FlowError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot render config: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File {} is {size} bytes, the limit is {limit}", .path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// A scenario step refers to something that was never declared.
    #[error("Step {step}: unknown {kind} '{name}'")]
    UnknownAlias {
        step: usize,
        kind: &'static str,
        name: String,
    },

    /// A scenario step reuses an alias already bound to another particle.
    #[error("Step {step}: particle alias '{name}' is already bound")]
    DuplicateAlias { step: usize, name: String },

    /// `verify` or `law --strict` found a problem.
    #[error("{0}")]
    Rejected(String),
}
