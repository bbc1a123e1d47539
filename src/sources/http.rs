//! Resilient HTTP GET with retry classification and exponential backoff.
//!
//! Network errors and 5xx responses are transient; 429 (and 403 carrying a
//! `Retry-After` header, GitHub's secondary rate limit) are retried after the
//! requested delay; all other statuses are final. A fixed maximum attempt
//! count caps total latency per call, and exhausting it yields a
//! [`FetchFailure`] rather than an error.

use super::FetchFailure;
use core::time::Duration;
use reqwest::{Client, Response, StatusCode};

const LOG_TARGET: &str = "http";

/// Per-request timeout applied to every client this crate builds. Without
/// one, a server that accepts the connection but never responds would stall
/// its call forever.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum retry attempts on top of the original request.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default delay for a 429 without a usable `Retry-After` header.
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);

/// How a single response (or transport error) should be handled.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// Final answer, hand the response to the caller.
    Done,
    /// Transient; retry after the backoff delay (or the given override).
    Retry(Option<Duration>),
    /// Not worth retrying.
    Fatal,
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())?
        .parse()
        .ok()
}

/// Classify a response for retry purposes.
fn classify(response: &Response) -> Disposition {
    let status = response.status();

    if status.is_server_error() {
        return Disposition::Retry(None);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let delay = parse_retry_after(response.headers()).map_or(DEFAULT_RATE_LIMIT_DELAY, Duration::from_secs);
        return Disposition::Retry(Some(delay));
    }

    // Secondary rate limit: 403 with Retry-After means wait, plain 403 is final.
    if status == StatusCode::FORBIDDEN {
        return match parse_retry_after(response.headers()) {
            Some(delay) => Disposition::Retry(Some(Duration::from_secs(delay))),
            None => Disposition::Fatal,
        };
    }

    Disposition::Done
}

/// Send an HTTP GET with bounded retry and exponential backoff.
///
/// The returned response may still carry a non-retryable error status (404,
/// 401, ...); callers classify those domain-specifically. Exhausted retries
/// and transport errors come back as `Err(FetchFailure)`.
pub(crate) async fn get_with_retry(client: &Client, url: &str) -> Result<Response, FetchFailure> {
    let mut attempt: u32 = 0;

    loop {
        let outcome = match client.get(url).send().await {
            Ok(response) => match classify(&response) {
                Disposition::Done => return Ok(response),
                Disposition::Fatal => {
                    return Err(FetchFailure::fatal(format!("HTTP {} from '{url}'", response.status())));
                }
                Disposition::Retry(delay) => (format!("HTTP {} from '{url}'", response.status()), delay),
            },
            // Connection failures and client-side timeouts are always transient.
            Err(e) => (format!("request to '{url}' failed: {e}"), None),
        };

        let (reason, delay_override) = outcome;
        if attempt >= MAX_RETRY_ATTEMPTS {
            log::debug!(target: LOG_TARGET, "Giving up after {attempt} retries: {reason}");
            return Err(FetchFailure::retryable(reason));
        }

        let delay = delay_override.unwrap_or_else(|| RETRY_BASE_DELAY * 2u32.pow(attempt));
        log::debug!(target: LOG_TARGET, "Retrying in {}ms (attempt {}): {reason}", delay.as_millis(), attempt + 1);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
