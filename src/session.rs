//! Session state: a pooled HTTP client shared by the search iterator
//! and the memento fetcher, carrying rate limiters, retry
//! configuration, a user agent, and a closed flag. One pool and one
//! set of limiters is shared by both operations.

use crate::cancel::Cancellation;
use crate::error::Error;
use crate::rate_limit::Pacer;
use std::time::Duration;

pub const DEFAULT_CDX_BASE_URL: &str = "https://web.archive.org/cdx/search/cdx";
pub const DEFAULT_MEMENTO_BASE_URL: &str = crate::archive_url::DEFAULT_BASE_URL;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SEARCH_RETRIES: u32 = 6;
const DEFAULT_MEMENTO_RETRIES: u32 = 3;

fn default_user_agent() -> String {
    format!("wayback/{} (+https://crates.io/crates/wayback)", env!("CARGO_PKG_VERSION"))
}

/// Shared, pooled HTTP access to the Wayback Machine's CDX and memento
/// endpoints.
///
/// A `Session` is not safe for concurrent mutation by multiple callers
/// at once: its rate limiters serialize access to a single logical
/// caller. Concurrent use requires one session per concurrent user.
pub struct Session {
    client: reqwest::Client,
    pacer: Pacer,
    cdx_base_url: String,
    memento_base_url: String,
    search_retries: u32,
    memento_retries: u32,
    closed: bool,
}

impl Session {
    /// Build a session with the library defaults: a 60s per-read
    /// timeout, no auto-following of redirects (the memento fetcher
    /// navigates the redirect graph itself), and the default user
    /// agent.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn cdx_base_url(&self) -> &str {
        &self.cdx_base_url
    }

    pub fn memento_base_url(&self) -> &str {
        &self.memento_base_url
    }

    pub fn search_retries(&self) -> u32 {
        self.search_retries
    }

    pub fn memento_retries(&self) -> u32 {
        self.memento_retries
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Close this session. Subsequent operations raise
    /// `Error::SessionClosed`. `reqwest::Client`'s pool is torn down
    /// when the last
    /// clone of the underlying client is dropped, so closing here just
    /// flips the guard flag checked by every public entry point.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Every public entry point checks this first: it's a design
    /// invariant, not an optimization.
    pub fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Wait for the search rate limiter, then check cancellation and
    /// the closed flag.
    pub async fn pace_search(&self, cancellation: &Cancellation) -> Result<(), Error> {
        self.check_open()?;
        self.pacer.pace_search().await;
        cancellation.check()?;
        self.check_open()
    }

    /// Wait for the memento rate limiter, then check cancellation and
    /// the closed flag.
    pub async fn pace_memento(&self, cancellation: &Cancellation) -> Result<(), Error> {
        self.check_open()?;
        self.pacer.pace_memento().await;
        cancellation.check()?;
        self.check_open()
    }
}

/// Builder for [`Session`], using fluent `with_*` configuration methods.
pub struct SessionBuilder {
    user_agent: String,
    timeout: Option<Duration>,
    cdx_base_url: String,
    memento_base_url: String,
    search_calls_per_second: f64,
    memento_calls_per_second: f64,
    search_retries: u32,
    memento_retries: u32,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: Some(DEFAULT_TIMEOUT),
            cdx_base_url: DEFAULT_CDX_BASE_URL.to_string(),
            memento_base_url: DEFAULT_MEMENTO_BASE_URL.to_string(),
            search_calls_per_second: 1.0,
            memento_calls_per_second: 30.0,
            search_retries: DEFAULT_SEARCH_RETRIES,
            memento_retries: DEFAULT_MEMENTO_RETRIES,
        }
    }
}

impl SessionBuilder {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Per-read socket timeout. `None` disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the CDX search endpoint, e.g. to point at a mock server
    /// in tests.
    pub fn with_cdx_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdx_base_url = url.into();
        self
    }

    /// Override the memento playback endpoint, e.g. to point at a mock
    /// server in tests.
    pub fn with_memento_base_url(mut self, url: impl Into<String>) -> Self {
        self.memento_base_url = url.into();
        self
    }

    pub fn with_rate_limits(mut self, search_per_sec: f64, memento_per_sec: f64) -> Self {
        self.search_calls_per_second = search_per_sec;
        self.memento_calls_per_second = memento_per_sec;
        self
    }

    pub fn with_retries(mut self, search_retries: u32, memento_retries: u32) -> Self {
        self.search_retries = search_retries;
        self.memento_retries = memento_retries;
        self
    }

    pub fn build(self) -> Result<Session, Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent)
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = self.timeout {
            builder = builder.read_timeout(timeout);
        }

        let client = builder.build()?;

        Ok(Session {
            client,
            pacer: Pacer::new(self.search_calls_per_second, self.memento_calls_per_second),
            cdx_base_url: self.cdx_base_url,
            memento_base_url: self.memento_base_url,
            search_retries: self.search_retries,
            memento_retries: self.memento_retries,
            closed: false,
        })
    }
}
