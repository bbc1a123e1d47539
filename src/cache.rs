//! TTL-checked JSON document cache for source responses.
//!
//! One JSON document per (source, identity), keyed by a sanitized file name.
//! Freshness is judged from the timestamp embedded in the document rather
//! than filesystem metadata, and future timestamps (clock skew) are treated
//! as fresh.

use crate::Result;
use crate::sources::SourceRecord;
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "cache";

/// Load a document from a file, returning `None` on any miss (absent file,
/// unparseable content, or expired TTL).
pub fn load_fresh<T, F>(path: impl AsRef<Path>, ttl: Duration, get_timestamp: F, now: DateTime<Utc>, context: &str) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
    F: FnOnce(&T) -> DateTime<Utc>,
{
    let path = path.as_ref();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!(target: LOG_TARGET, "Cache miss for {context}: {e}");
            return None;
        }
    };

    let data: T = match serde_json::from_reader(BufReader::new(file)) {
        Ok(data) => data,
        Err(e) => {
            log::debug!(target: LOG_TARGET, "Cache miss for {context}: {e}");
            return None;
        }
    };

    let age = now.signed_duration_since(get_timestamp(&data));
    if age.num_seconds() < 0 {
        log::debug!(target: LOG_TARGET, "Cache timestamp in the future for {context} (clock skew), treating as fresh");
        return Some(data);
    }

    let age = age.to_std().unwrap_or(Duration::MAX);
    if age < ttl {
        log::debug!(target: LOG_TARGET, "Cache hit for {context} (age: {:.1} days)", age.as_secs_f64() / 86400.0);
        Some(data)
    } else {
        log::debug!(target: LOG_TARGET, "Cache expired for {context} (age: {:.1} days)", age.as_secs_f64() / 86400.0);
        None
    }
}

/// Save a document to a file, creating parent directories as needed.
pub fn save<T>(data: &T, path: impl AsRef<Path>) -> Result<()>
where
    T: Serialize,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent.display()))?;
    }

    let file = File::create(path).into_app_err_with(|| format!("unable to create cache file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, data).into_app_err_with(|| format!("unable to write cache file '{}'", path.display()))?;
    writer
        .flush()
        .into_app_err_with(|| format!("unable to flush cache file '{}'", path.display()))?;
    Ok(())
}

/// Replace characters that are unsafe in file names.
#[must_use]
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Handle to one source's cache directory.
#[derive(Debug, Clone)]
pub struct SourceCache {
    dir: PathBuf,
    ttl: Duration,
}

/// A cached source response plus when it was fetched. Both `Found` and
/// `NotFound` records are cacheable; a definitive "does not exist" answer is
/// as good as data within the TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDocument {
    pub fetched_at: DateTime<Utc>,
    pub record: SourceRecord,
}

impl SourceCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { dir: dir.into(), ttl }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_path_component(key)))
    }

    /// Look up a fresh cached document for `key`.
    #[must_use]
    pub fn load(&self, key: &str, now: DateTime<Utc>) -> Option<CachedDocument> {
        load_fresh(self.path_for(key), self.ttl, |doc: &CachedDocument| doc.fetched_at, now, key)
    }

    /// Store a document for `key`; failures are logged, never propagated,
    /// since a cold cache only costs a refetch.
    pub fn store(&self, key: &str, doc: &CachedDocument) {
        if let Err(e) = save(doc, self.path_for(key)) {
            log::warn!(target: LOG_TARGET, "Could not cache data for {key}: {e}");
        }
    }
}
