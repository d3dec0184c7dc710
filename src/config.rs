/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Engine configuration.
//!
//! Every field has a default so a partial JSON document is enough:
//!
//! ```
//! use docnum_rs::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "default_ttl_seconds": 600 }"#).unwrap();
//! assert_eq!(config.default_ttl_seconds, 600);
//! assert_eq!(config.max_number, 999_999);
//! ```

use crate::numbering::GoldenCriteria;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("failed to parse engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the engine cannot work with.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Tunables for the allocator, sessions and sweeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Inactivity window after which an unfinished session is reclaimed.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Upper bound for per-request TTL overrides.
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: u64,
    /// How long a fully assigned session keeps accepting retries.
    #[serde(default = "default_drain_grace_seconds")]
    pub drain_grace_seconds: u64,
    /// Interval between two reclamation sweeps.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// First number handed out by a fresh sequence.
    #[serde(default = "default_base_start")]
    pub base_start: u64,
    /// Largest number any sequence may hand out.
    #[serde(default = "default_max_number")]
    pub max_number: u64,
    /// How many candidates a golden search inspects before giving up.
    #[serde(default = "default_golden_search_window")]
    pub golden_search_window: u64,
    /// Keep numbers matching `default_golden` out of sequential allocation.
    #[serde(default = "default_true")]
    pub reserve_golden_for_admins: bool,
    /// Rules used by `reserve_golden_for_admins` and golden suggestions.
    #[serde(default)]
    pub default_golden: GoldenCriteria,
    /// Prefix printed before formatted numbers.
    #[serde(default = "default_doc_prefix")]
    pub doc_prefix: String,
    /// Zero-padding width of formatted numbers.
    #[serde(default = "default_number_width")]
    pub number_width: usize,
    /// Command channel size of each equipment worker.
    #[serde(default = "default_worker_channel_capacity")]
    pub worker_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl_seconds(),
            max_ttl_seconds: default_max_ttl_seconds(),
            drain_grace_seconds: default_drain_grace_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            base_start: default_base_start(),
            max_number: default_max_number(),
            golden_search_window: default_golden_search_window(),
            reserve_golden_for_admins: true,
            default_golden: GoldenCriteria::default(),
            doc_prefix: default_doc_prefix(),
            number_width: default_number_width(),
            worker_channel_capacity: default_worker_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Invalid`] when [`validate`](Self::validate) fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_seconds == 0 {
            return Err(invalid("default_ttl_seconds", "must be positive"));
        }
        if self.max_ttl_seconds < self.default_ttl_seconds {
            return Err(invalid(
                "max_ttl_seconds",
                format!("must be >= default_ttl_seconds ({})", self.default_ttl_seconds),
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(invalid("sweep_interval_seconds", "must be positive"));
        }
        if self.base_start == 0 {
            return Err(invalid("base_start", "numbers start at 1"));
        }
        if self.max_number < self.base_start {
            return Err(invalid(
                "max_number",
                format!("must be >= base_start ({})", self.base_start),
            ));
        }
        if self.golden_search_window == 0 {
            return Err(invalid("golden_search_window", "must be positive"));
        }
        if self.worker_channel_capacity == 0 {
            return Err(invalid("worker_channel_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Default session TTL.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Clamps a caller-requested TTL to `[1s, max_ttl_seconds]`, falling back to
    /// the default when none is given.
    #[must_use]
    pub fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        match requested {
            None => self.default_ttl(),
            Some(ttl) => ttl.clamp(
                Duration::from_secs(1),
                Duration::from_secs(self.max_ttl_seconds),
            ),
        }
    }

    /// Grace window of a drained session.
    #[must_use]
    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_seconds)
    }

    /// Interval between sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn default_ttl_seconds() -> u64 {
    1800
}

fn default_max_ttl_seconds() -> u64 {
    86_400
}

fn default_drain_grace_seconds() -> u64 {
    30
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_base_start() -> u64 {
    1
}

fn default_max_number() -> u64 {
    999_999
}

fn default_golden_search_window() -> u64 {
    1_000_000
}

fn default_true() -> bool {
    true
}

fn default_doc_prefix() -> String {
    "УТЗ".to_string()
}

fn default_number_width() -> usize {
    6
}

fn default_worker_channel_capacity() -> usize {
    1024
}
