//! Repository-hosting source client.
//!
//! A package's repository is not part of its identity, so this client first
//! asks the package index for project metadata, infers an owner/repo pair
//! from it, and only then queries the GitHub REST API. Packages whose
//! repository cannot be inferred are `NotFound` for this source, which the
//! report calls out separately from fetch failures.

use super::http::{REQUEST_TIMEOUT, get_with_retry};
use super::repo_url::infer_repo;
use super::{FetchFailure, MetricMap, Source, SourceRecord};
use crate::Result;
use crate::cache::{CachedDocument, SourceCache};
use crate::identity::PackageId;
use crate::metrics::{FORKS, MetricValue, OPEN_ISSUES, REPO_URL, STARS, UPDATED_AT, WATCHERS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohno::IntoAppError;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;

const API_BASE_URL: &str = "https://api.github.com/repos";
const INDEX_BASE_URL: &str = "https://pypi.org/pypi";

/// Source client for the GitHub REST API.
///
/// Two separate HTTP clients are held on purpose: the access token is a
/// default header on the API client only, and the package-index lookup goes
/// through a credential-free client so the token is never sent to the index.
#[derive(Debug)]
pub struct GitHubSource {
    api_client: Client,
    index_client: Client,
    cache: Option<SourceCache>,
}

/// Default headers for `api.github.com` requests. The token, when present,
/// is marked sensitive so it never shows up in debug output.
fn api_headers(token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
    let _ = headers.insert(USER_AGENT, HeaderValue::from_static("pip-rank"));

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("token {token}")).into_app_err("invalid GitHub token")?;
        value.set_sensitive(true);
        let _ = headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Default headers for package-index requests. Never carries credentials.
fn index_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let _ = headers.insert(USER_AGENT, HeaderValue::from_static("pip-rank"));
    headers
}

impl GitHubSource {
    /// Build the clients with the GitHub media type and an optional access
    /// token. Unauthenticated requests work but hit a much lower rate limit.
    pub fn new(token: Option<&str>, cache: Option<SourceCache>) -> Result<Self> {
        let api_client = Client::builder()
            .default_headers(api_headers(token)?)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .into_app_err("unable to build HTTP client")?;

        let index_client = Client::builder()
            .default_headers(index_headers())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .into_app_err("unable to build HTTP client")?;

        Ok(Self {
            api_client,
            index_client,
            cache,
        })
    }

    /// Locate the package's repository via the index's project metadata.
    async fn locate_repo(&self, id: &PackageId) -> Result<Option<super::RepoRef>, FetchFailure> {
        let url = format!("{INDEX_BASE_URL}/{}/json", id.name());
        let response = get_with_retry(&self.index_client, &url).await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| FetchFailure::fatal(format!("malformed response from '{url}': {e}")))?;
        let info = doc.get("info").cloned().unwrap_or(Value::Null);
        Ok(infer_repo(id.name(), &info))
    }

    async fn fetch_uncached(&self, id: &PackageId) -> SourceRecord {
        let repo = match self.locate_repo(id).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return SourceRecord::NotFound,
            Err(failure) => return SourceRecord::Failed(failure),
        };

        let url = format!("{API_BASE_URL}/{repo}");
        let response = match get_with_retry(&self.api_client, &url).await {
            Ok(response) => response,
            Err(failure) => return SourceRecord::Failed(failure),
        };

        // An inferred URL can point at a deleted or renamed repository.
        if response.status() == StatusCode::NOT_FOUND {
            return SourceRecord::NotFound;
        }

        let doc: Value = match response.json().await {
            Ok(doc) => doc,
            Err(e) => return SourceRecord::Failed(FetchFailure::fatal(format!("malformed response from '{url}': {e}"))),
        };

        SourceRecord::Found(extract_repo_metrics(&doc))
    }
}

#[async_trait]
impl Source for GitHubSource {
    fn name(&self) -> &'static str {
        "github"
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

        // NotFound is as definitive as Found within the TTL; only failures
        // are worth re-trying on the next run.
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

/// Pull the activity metrics out of a repository document. Fields the API
/// omits simply stay absent from the map.
fn extract_repo_metrics(doc: &Value) -> MetricMap {
    let mut metrics = MetricMap::new();

    let counts = [
        ("stargazers_count", STARS),
        ("forks_count", FORKS),
        ("subscribers_count", WATCHERS),
        ("open_issues_count", OPEN_ISSUES),
    ];
    for (field, name) in counts {
        if let Some(n) = doc.get(field).and_then(Value::as_u64) {
            let _ = metrics.insert(name.to_string(), MetricValue::Count(n));
        }
    }

    if let Some(url) = doc.get("html_url").and_then(Value::as_str) {
        let _ = metrics.insert(REPO_URL.to_string(), MetricValue::Text(url.to_string()));
    }

    if let Some(ts) = doc
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
    {
        let _ = metrics.insert(UPDATED_AT.to_string(), MetricValue::Timestamp(ts));
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_repo_metrics() {
        let doc = json!({
            "full_name": "pallets/flask",
            "html_url": "https://github.com/pallets/flask",
            "stargazers_count": 65000,
            "forks_count": 16000,
            "subscribers_count": 2100,
            "open_issues_count": 5,
            "updated_at": "2026-08-20T07:15:00Z"
        });

        let metrics = extract_repo_metrics(&doc);
        assert_eq!(metrics.get(STARS), Some(&MetricValue::Count(65000)));
        assert_eq!(metrics.get(FORKS), Some(&MetricValue::Count(16000)));
        assert_eq!(metrics.get(WATCHERS), Some(&MetricValue::Count(2100)));
        assert_eq!(metrics.get(OPEN_ISSUES), Some(&MetricValue::Count(5)));
        assert_eq!(
            metrics.get(REPO_URL),
            Some(&MetricValue::Text("https://github.com/pallets/flask".to_string()))
        );
        assert!(metrics.get(UPDATED_AT).is_some_and(|v| v.as_timestamp().is_some()));
    }

    #[test]
    fn test_extract_repo_metrics_partial_document() {
        let doc = json!({ "stargazers_count": 12, "updated_at": "not a date" });
        let metrics = extract_repo_metrics(&doc);
        assert_eq!(metrics.get(STARS), Some(&MetricValue::Count(12)));
        assert!(!metrics.contains_key(UPDATED_AT));
        assert!(!metrics.contains_key(FORKS));
    }

    #[test]
    fn test_new_rejects_invalid_token() {
        assert!(GitHubSource::new(Some("bad\ntoken"), None).is_err());
        assert!(GitHubSource::new(Some("ghp_abc123"), None).is_ok());
        assert!(GitHubSource::new(None, None).is_ok());
    }

    #[test]
    fn test_token_only_on_api_headers() {
        let api = api_headers(Some("ghp_abc123")).unwrap();
        let auth = api.get(AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());

        // The index lookup must never carry the token.
        let index = index_headers();
        assert!(!index.contains_key(AUTHORIZATION));
        assert!(index.contains_key(USER_AGENT));

        assert!(!api_headers(None).unwrap().contains_key(AUTHORIZATION));
    }
}
