//! # Flowcore CLI Module
//!
//! This module implements the CLI interface for Flowcore.
//!
//! ## Available Commands
//!
//! - `run` - Play a scenario file against a fresh flow
//! - `demo` - Play the built-in demo scenario
//! - `verify` - Audit an exported chain
//! - `replay` - Rebuild the particle store from an exported chain
//! - `law` - Evaluate the Flow Law over an exported chain
//! - `config` - Print the effective configuration

mod commands;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::error::CliError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Flowcore - particle lifecycle and event chain
///
/// Every idea is a particle; every intent is a link on a tamper-evident chain.
#[derive(Parser, Debug)]
#[command(name = "flowcore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a scenario file against a fresh flow
    Run {
        /// Path to the scenario (JSON)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Write the resulting chain to this file (JSON)
        #[arg(short, long)]
        emit_chain: Option<PathBuf>,

        /// Number of recent chain links to show (0 = all)
        #[arg(short, long, default_value = "5")]
        tail: usize,
    },

    /// Play the built-in demo scenario
    Demo {
        /// Number of recent chain links to show (0 = all)
        #[arg(short, long, default_value = "0")]
        tail: usize,
    },

    /// Audit an exported chain and report every failing link
    Verify {
        /// Path to the exported chain (JSON)
        #[arg(long)]
        chain: PathBuf,

        /// Expected head digest (hex); fails if the chain does not end there
        #[arg(long)]
        digest: Option<String>,
    },

    /// Rebuild the particle store from an exported chain
    Replay {
        /// Path to the exported chain (JSON)
        #[arg(long)]
        chain: PathBuf,
    },

    /// Evaluate the Flow Law over the particles recorded on an exported chain
    Law {
        /// Path to the exported chain (JSON)
        #[arg(long)]
        chain: PathBuf,

        /// Exit with an error when any violation is reported
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration
    Config,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), CliError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Run {
            scenario,
            emit_chain,
            tail,
        }) => cmd_run(config, json_mode, &scenario, emit_chain.as_deref(), tail),
        Some(Commands::Demo { tail }) => cmd_demo(config, json_mode, tail),
        Some(Commands::Verify { chain, digest }) => {
            cmd_verify(config, json_mode, &chain, digest.as_deref())
        }
        Some(Commands::Replay { chain }) => cmd_replay(config, json_mode, &chain),
        Some(Commands::Law { chain, strict }) => cmd_law(config, json_mode, &chain, strict),
        Some(Commands::Config) => cmd_config(config, json_mode),
        None => {
            // No subcommand - play the demo by default
            cmd_demo(config, json_mode, 0)
        }
    }
}
