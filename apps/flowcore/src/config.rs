//! # Configuration
//!
//! `flowcore.toml` settings. Every section and every key is optional; a
//! missing file yields the defaults.
//!
//! ```toml
//! [law]
//! overflow_threshold = 10
//!
//! [store]
//! transitions = "permissive"   # or "strict"
//!
//! [clock]
//! mode = "manual"              # or "system"
//! start = 1700000000000
//! step = 1
//!
//! [log]
//! format = "text"              # or "json"
//! filter = "flowcore=info,flowcore_core=info"
//! ```

use crate::error::CliError;
use flowcore_core::{
    Clock, Flow, FlowLaw, LawConfig, ManualClock, SystemClock, Timestamp, TransitionPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "flowcore.toml";

/// Default tracing filter when neither `RUST_LOG` nor `[log] filter` is set.
pub const DEFAULT_LOG_FILTER: &str = "flowcore=info,flowcore_core=info";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub law: LawConfig,
    pub store: StoreConfig,
    pub clock: ClockConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub transitions: TransitionPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    #[default]
    System,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub mode: ClockMode,
    /// First reading of a manual clock, in milliseconds.
    pub start: u64,
    /// Milliseconds a manual clock advances per reading.
    pub step: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: ClockMode::System,
            start: 0,
            step: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse the `FLOWCORE_LOG_FORMAT` value. Anything but `json` is text.
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The clock described by `[clock]`.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self.clock.mode {
            ClockMode::System => Arc::new(SystemClock),
            ClockMode::Manual => Arc::new(ManualClock::ticking(
                Timestamp(self.clock.start),
                self.clock.step,
            )),
        }
    }

    /// A fresh, empty flow wired from this configuration.
    pub fn flow(&self) -> Flow {
        Flow::builder()
            .clock(self.clock())
            .law(FlowLaw::from_config(self.law))
            .policy(self.store.transitions)
            .build()
    }
}
