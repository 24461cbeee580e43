//! Environment-driven configuration of the sampling binary.

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use crate::mounts::DEFAULT_MOUNTS_PATH;

pub const MOUNTS_ENV: &str = "CGROUP_SAMPLER_MOUNTS";
pub const INTERVAL_ENV: &str = "CGROUP_SAMPLER_INTERVAL_MS";
pub const MEMORY_STATS_ENV: &str = "CGROUP_SAMPLER_MEMORY_STATS";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{var}`: {source}")]
    InvalidInterval {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("`{var}` must be greater than zero")]
    ZeroInterval { var: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Mount table used for controller discovery.
    pub mounts_path: PathBuf,
    /// Time between two samples.
    pub interval: Duration,
    /// Memory stat names to report; empty reports all.
    pub memory_stats: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mounts_path: PathBuf::from(DEFAULT_MOUNTS_PATH),
            interval: DEFAULT_INTERVAL,
            memory_stats: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for unset keys.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInterval`] if the interval is not an integer.
    /// - [`Error::ZeroInterval`] if the interval is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = lookup(MOUNTS_ENV).filter(|path| !path.is_empty()) {
            config.mounts_path = PathBuf::from(path);
        }

        if let Some(value) = lookup(INTERVAL_ENV) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|source| Error::InvalidInterval {
                    var: INTERVAL_ENV,
                    value: value.clone(),
                    source,
                })?;
            if millis == 0 {
                return Err(Error::ZeroInterval { var: INTERVAL_ENV });
            }
            config.interval = Duration::from_millis(millis);
        }

        if let Some(names) = lookup(MEMORY_STATS_ENV) {
            config.memory_stats = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(config)
    }
}
