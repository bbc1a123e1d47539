//! Package-index source client.
//!
//! Queries the JSON API at `pypi.org` for the pinned release and for the
//! project's latest release, plus `pypistats.org` for recent download counts.
//! The download call is best-effort: when it fails the record is still
//! `Found`, just without the download metrics.

use super::http::get_with_retry;
use super::{MetricMap, Source, SourceRecord};
use crate::cache::{CachedDocument, SourceCache};
use crate::identity::PackageId;
use crate::metrics::{DOWNLOADS_LAST_MONTH, LATEST_RELEASE_DATE, MetricValue, RELEASE_DATE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;

const LOG_TARGET: &str = "pypi";

const INDEX_BASE_URL: &str = "https://pypi.org/pypi";
const STATS_BASE_URL: &str = "https://pypistats.org/api/packages";

/// Source client for the Python package index.
#[derive(Debug)]
pub struct PyPiSource {
    client: Client,
    cache: Option<SourceCache>,
}

impl PyPiSource {
    #[must_use]
    pub const fn new(client: Client, cache: Option<SourceCache>) -> Self {
        Self { client, cache }
    }

    async fn fetch_uncached(&self, id: &PackageId) -> SourceRecord {
        let url = format!("{INDEX_BASE_URL}/{}/{}/json", id.name(), id.version());
        let response = match get_with_retry(&self.client, &url).await {
            Ok(response) => response,
            Err(failure) => return SourceRecord::Failed(failure),
        };

        if response.status() == StatusCode::NOT_FOUND {
            return SourceRecord::NotFound;
        }

        let doc: Value = match response.json().await {
            Ok(doc) => doc,
            Err(e) => return SourceRecord::Failed(super::FetchFailure::fatal(format!("malformed response from '{url}': {e}"))),
        };

        let mut metrics = MetricMap::new();
        if let Some(ts) = extract_release_date(&doc) {
            let _ = metrics.insert(RELEASE_DATE.to_string(), MetricValue::Timestamp(ts));
        }

        // Latest release comes from the unversioned endpoint.
        match self.fetch_latest_release(id).await {
            Ok(Some(ts)) => {
                let _ = metrics.insert(LATEST_RELEASE_DATE.to_string(), MetricValue::Timestamp(ts));
            }
            Ok(None) => {}
            Err(e) => log::warn!(target: LOG_TARGET, "Could not fetch latest release for {}: {e}", id.name()),
        }

        // Download counts are best-effort; absence is not failure.
        match self.fetch_downloads(id).await {
            Ok(Some(count)) => {
                let _ = metrics.insert(DOWNLOADS_LAST_MONTH.to_string(), MetricValue::Count(count));
            }
            Ok(None) => {}
            Err(e) => log::warn!(target: LOG_TARGET, "Could not fetch download stats for {}: {e}", id.name()),
        }

        SourceRecord::Found(metrics)
    }

    async fn fetch_latest_release(&self, id: &PackageId) -> Result<Option<DateTime<Utc>>, super::FetchFailure> {
        let url = format!("{INDEX_BASE_URL}/{}/json", id.name());
        let response = get_with_retry(&self.client, &url).await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| super::FetchFailure::fatal(format!("malformed response from '{url}': {e}")))?;
        Ok(extract_release_date(&doc))
    }

    async fn fetch_downloads(&self, id: &PackageId) -> Result<Option<u64>, super::FetchFailure> {
        let url = format!("{STATS_BASE_URL}/{}/recent", id.name());
        let response = get_with_retry(&self.client, &url).await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| super::FetchFailure::fatal(format!("malformed response from '{url}': {e}")))?;
        Ok(extract_last_month_downloads(&doc))
    }
}

#[async_trait]
impl Source for PyPiSource {
    fn name(&self) -> &'static str {
        "pypi"
    }

    async fn fetch(&self, id: &PackageId) -> SourceRecord {
        let now = Utc::now();
        let key = id.to_string();

        if let Some(cache) = &self.cache
            && let Some(doc) = cache.load(&key, now)
        {
            return doc.record;
        }

        let record = self.fetch_uncached(id).await;

        // A pinned release that does not exist will not appear later, so
        // NotFound is cached on the same terms as data.
        if let Some(cache) = &self.cache
            && !matches!(record, SourceRecord::Failed(_))
        {
            cache.store(
                &key,
                &CachedDocument {
                    fetched_at: now,
                    record: record.clone(),
                },
            );
        }

        record
    }
}

/// Pull the upload time of the first distribution file from a release document.
fn extract_release_date(doc: &Value) -> Option<DateTime<Utc>> {
    let raw = doc.get("urls")?.get(0)?.get("upload_time_iso_8601")?.as_str()?;
    raw.parse::<DateTime<Utc>>().ok()
}

/// Pull `data.last_month` from a download-stats document.
fn extract_last_month_downloads(doc: &Value) -> Option<u64> {
    doc.get("data")?.get("last_month")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_extract_release_date() {
        let doc = json!({
            "info": { "name": "flask" },
            "urls": [
                { "upload_time_iso_8601": "2023-09-30T14:36:12.345678Z" },
                { "upload_time_iso_8601": "2023-09-30T14:36:15.000000Z" }
            ]
        });
        let ts = extract_release_date(&doc).unwrap();
        assert_eq!(ts.date_naive(), Utc.with_ymd_and_hms(2023, 9, 30, 0, 0, 0).unwrap().date_naive());
    }

    #[test]
    fn test_extract_release_date_missing() {
        assert!(extract_release_date(&json!({ "info": {} })).is_none());
        assert!(extract_release_date(&json!({ "urls": [] })).is_none());
        assert!(extract_release_date(&json!({ "urls": [{ "upload_time_iso_8601": "garbage" }] })).is_none());
    }

    #[test]
    fn test_extract_last_month_downloads() {
        let doc = json!({ "data": { "last_day": 10, "last_month": 12345 }, "package": "flask" });
        assert_eq!(extract_last_month_downloads(&doc), Some(12345));
        assert_eq!(extract_last_month_downloads(&json!({ "data": {} })), None);
        assert_eq!(extract_last_month_downloads(&json!({})), None);
    }
}
