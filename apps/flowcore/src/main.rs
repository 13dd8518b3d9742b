//! # Flowcore
//!
//! The main binary for the Flowcore particle lifecycle substrate.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                apps/flowcore (THE BINARY)             │
//! │                                                       │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────┐  │
//! │  │    CLI     │   │   Scenario   │   │   Config   │  │
//! │  │   (clap)   │   │ (serde_json) │   │   (toml)   │  │
//! │  └─────┬──────┘   └──────┬───────┘   └─────┬──────┘  │
//! │        └─────────────────┼─────────────────┘         │
//! │                          ▼                            │
//! │                 ┌─────────────────┐                   │
//! │                 │  flowcore-core  │                   │
//! │                 │   (THE LOGIC)   │                   │
//! │                 └─────────────────┘                   │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! flowcore demo
//! flowcore run -s scenario.json --emit-chain chain.json
//! flowcore verify --chain chain.json
//! flowcore law --chain chain.json --strict
//! ```

use clap::Parser;
use flowcore::cli;
use flowcore::config::{Config, LogConfig, LogFormat};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used by `--verbose` when `RUST_LOG` is unset.
const VERBOSE_LOG_FILTER: &str = "flowcore=debug,flowcore_core=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // Tracing needs the [log] section, so the config is read first and any
    // load error is reported once the subscriber is up.
    let config = Config::load(&cli.config);
    let defaults = LogConfig::default();
    init_tracing(
        config.as_ref().map_or(&defaults, |c| &c.log),
        cli.verbose,
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. Logs go to stderr so `--json-mode` output
/// on stdout stays machine-readable.
///
/// FLOWCORE_LOG_FORMAT=json overrides `[log] format`; RUST_LOG overrides
/// `[log] filter` and `--verbose`.
fn init_tracing(log: &LogConfig, verbose: bool) {
    let format = std::env::var("FLOWCORE_LOG_FORMAT")
        .map(|value| LogFormat::from_env_value(&value))
        .unwrap_or(log.format);

    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        log.filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the Flowcore startup banner.
fn print_banner() {
    println!(
        r#"
  FLOWCORE

  Particle Lifecycle & Event Chain v{}

  Append-only • Hash-linked • Replayable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
