//! Runtime configuration.
//!
//! Read once from the environment when the runtime starts:
//!
//! - `HAVER_LOG`: an `env_logger` filter, e.g. `debug` or `haver_rt::reactor=trace`
//! - `HAVER_LOG_LEVEL`: the initial script log level, 0 (error) to 4 (trace)

use crate::hurl::MAX_DEPTH;

pub const LOG_FILTER_VAR: &str = "HAVER_LOG";
pub const LOG_LEVEL_VAR: &str = "HAVER_LOG_LEVEL";

/// Script log level used when nothing else is configured (info).
pub const DEFAULT_LOG_LEVEL: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub log_filter: String,
    pub log_level: i64,
    pub chan_initial_slots: usize,
    pub default_list_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            log_filter: "info".to_string(),
            log_level: DEFAULT_LOG_LEVEL,
            chan_initial_slots: 16,
            default_list_capacity: 8,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unparseable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = RuntimeConfig::default();
        if let Some(filter) = lookup(LOG_FILTER_VAR).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(level) = lookup(LOG_LEVEL_VAR).and_then(|l| l.trim().parse::<i64>().ok()) {
            config.log_level = level.clamp(0, 4);
        }
        config
    }

    /// Maximum number of nested protected regions per thread. Fixed.
    pub fn max_try_depth(&self) -> usize {
        MAX_DEPTH
    }
}
