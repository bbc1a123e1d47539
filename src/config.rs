//! Runtime configuration.
//!
//! Settings come from an optional TOML file and may be overridden per-flag on
//! the command line. A missing file just yields the defaults; a present but
//! malformed file is an error, and questionable values produce warnings
//! rather than silently misbehaving.

use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use core::time::Duration;
use ohno::IntoAppError;
use serde::Deserialize;
use std::fs;
use std::io;

/// File name searched for in the working directory when no path is given.
const DEFAULT_CONFIG_FILE: &str = "pip-rank.toml";

/// The registries a run can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pypi,
    Github,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How many entries each ranked summary view shows.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum in-flight requests per source.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock budget for the fetch phase, in seconds. Unset means no limit.
    #[serde(default)]
    pub time_budget: Option<u64>,

    /// Number of days to keep cached source responses before re-fetching.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u64,

    /// Which sources to query. An empty list disables fetching entirely,
    /// which the scheduler rejects.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceKind>,
}

const fn default_top_k() -> usize {
    3
}

const fn default_concurrency() -> usize {
    10
}

const fn default_cache_ttl_days() -> u64 {
    30
}

fn default_sources() -> Vec<SourceKind> {
    vec![SourceKind::Pypi, SourceKind::Github]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            concurrency: default_concurrency(),
            time_budget: None,
            cache_ttl_days: default_cache_ttl_days(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Load configuration from a file or use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file cannot be read, or if
    /// any file found cannot be parsed.
    pub fn load(config_path: Option<&Utf8PathBuf>) -> Result<(Self, Vec<String>)> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration from {path}"))?;
            (path.clone(), text)
        } else {
            let path = Utf8Path::new(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(path) {
                Ok(text) => (path.to_path_buf(), text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Self::default(), Vec::new())),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration from {path}")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing TOML configuration from {final_path}"))?;

        let mut warnings = Vec::new();
        config.validate(&mut warnings);
        Ok((config, warnings))
    }

    /// The effective cache TTL. Day counts too large to express in seconds
    /// saturate instead of overflowing.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_days.saturating_mul(24 * 60 * 60))
    }

    /// Detect non-sensical values. These are warnings rather than errors;
    /// the effective value is clamped where needed downstream.
    fn validate(&self, warnings: &mut Vec<String>) {
        if self.top_k == 0 {
            warnings.push("top_k is 0, summary views will be empty".to_string());
        }

        if self.concurrency == 0 {
            warnings.push("concurrency is 0, treating it as 1".to_string());
        }

        if self.time_budget == Some(0) {
            warnings.push("time_budget is 0 seconds, every fetch will be cut off".to_string());
        }

        if self.cache_ttl_days == 0 {
            warnings.push("cache_ttl_days is 0, every run will re-fetch everything".to_string());
        }

        let mut seen = self.sources.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.sources.len() {
            warnings.push("duplicate entries in sources are ignored".to_string());
        }
    }
}
