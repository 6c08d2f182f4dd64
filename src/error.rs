//! The shared error taxonomy: a single hierarchy with a common base
//! (`Error::Other`) and typed leaves, each mapped from
//! a specific server signal.

use crate::retry::Retryable;
use std::time::Duration;
use thiserror::Error;
use tryhard::RetryPolicy;

/// Body/header substrings used to recognize Wayback's blocked- and
/// rate-limit signals.
///
/// These are not formally specified by Wayback and have shifted over
/// time, so they're kept in one place and exposed as `pub const` slices
/// rather than buried in match arms, so operators can extend them without
/// touching the control flow that uses them.
pub mod patterns {
    /// Body substrings indicating a robots.txt-driven exclusion.
    pub const BLOCKED_BY_ROBOTS: &[&str] = &["RobotAccessControlException", "robots.txt"];

    /// Body substrings indicating the site was blocked at the archive's
    /// request (takedown / administrative exclusion).
    pub const BLOCKED_SITE: &[&str] = &[
        "AdministrativeAccessControlException",
        "Blocked Site Error",
        "this content is blocked",
    ];

    /// Body substrings indicating the archive-specific rate-limit page
    /// (as distinct from a bare HTTP 429).
    pub const RATE_LIMITED: &[&str] = &["has blocked your", "too many requests"];

    /// Body substrings indicating no capture exists for the requested URL.
    pub const NO_MEMENTO: &[&str] = &["is not available in the Wayback Machine", "Impatient?"];
}

/// The shared error type for all fallible operations in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A CDX line or memento header set didn't match the expected shape.
    #[error("Unexpected response format: {0}")]
    UnexpectedResponseFormat(String),

    /// The input did not look like a Wayback archive URL.
    #[error(transparent)]
    NotAWaybackUrl(#[from] crate::archive_url::Error),

    /// The archive indicated the target is excluded by robots.txt.
    #[error("Blocked by robots.txt: {url}")]
    BlockedByRobots { url: String },

    /// The archive indicated the target was blocked at the site owner's
    /// request (takedown).
    #[error("Site blocked: {url}")]
    BlockedSite { url: String },

    /// The archive has no capture for the requested URL at all.
    #[error("No memento found for {url}")]
    NoMemento { url: String },

    /// The archive refused to play back a specific memento (bad
    /// timestamp divergence, redirect depth exceeded, etc).
    #[error("Memento playback error for {url} at {requested_timestamp}: {reason}")]
    MementoPlayback {
        url: String,
        requested_timestamp: String,
        reason: String,
    },

    /// HTTP 429, or an archive-specific rate-limit body. Carries the
    /// `Retry-After` value in seconds, if one was sent.
    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimit { retry_after: Option<u64> },

    /// Retries were exhausted. Carries the elapsed wall-clock time across
    /// all attempts and a human-readable description of the last cause.
    #[error("Retries exhausted after {elapsed:?}: {cause}")]
    WaybackRetry { elapsed: Duration, cause: String },

    /// The session was used after `close()`.
    #[error("Session is closed")]
    SessionClosed,

    /// A caller-supplied [`crate::cancel::Cancellation`] was signalled at a
    /// suspension point.
    #[error("Operation cancelled")]
    Cancelled,

    /// The underlying HTTP transport failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other condition not covered by a specific leaf.
    #[error("Wayback error: {0}")]
    Other(String),
}

impl Error {
    /// The URL this error is about, when one is known, for callers that
    /// want to retry at a higher level.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::BlockedByRobots { url } => Some(url),
            Error::BlockedSite { url } => Some(url),
            Error::NoMemento { url } => Some(url),
            Error::MementoPlayback { url, .. } => Some(url),
            _ => None,
        }
    }

    /// The `Retry-After` value carried by a `RateLimit` error, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for Error {
    fn log_level() -> Option<log::Level> {
        Some(log::Level::Warn)
    }

    fn default_initial_delay() -> Duration {
        Duration::from_secs(2)
    }

    fn custom_retry_policy(&self) -> Option<RetryPolicy> {
        match self {
            // Connection errors and retryable HTTP statuses back off
            // exponentially via the default strategy.
            Error::Http(e) if is_transient(e) => None,
            // Rate limits get a strict floor: max(backoff, retry_after, 60s).
            Error::RateLimit { retry_after } => {
                let floor = retry_after.unwrap_or(0).max(60);
                Some(RetryPolicy::Delay(Duration::from_secs(floor)))
            }
            // Everything else (semantic conditions, cancellation) is
            // never retried: retrying cannot change the outcome.
            _ => Some(RetryPolicy::Break),
        }
    }
}

/// Parse a `Retry-After` header value, which may be either a plain
/// integer second count or an HTTP-date, into a second count.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let target = chrono::DateTime::parse_from_rfc2822(value)
        .ok()?
        .with_timezone(&chrono::Utc);
    Some((target - chrono::Utc::now()).num_seconds().max(0) as u64)
}

/// Whether a `reqwest::Error` represents a transient condition this
/// crate's retry loop should treat as retryable: connection errors, read
/// timeouts, and the retryable HTTP statuses.
pub fn is_transient(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    matches!(
        error.status().map(|s| s.as_u16()),
        Some(429) | Some(500) | Some(502) | Some(503) | Some(504)
    )
}
