//! The lazy, paginated CDX search iterator: hides the resume-key
//! pagination protocol, deduplicates across page boundaries, and
//! survives a mid-stream failure without losing already yielded
//! records.
//!
//! Built on `futures::stream::try_unfold` over the plain-text +
//! resume-key dialect the CDX search endpoint speaks.

use crate::cancel::Cancellation;
use crate::cdx::CdxRecord;
use crate::error::{parse_retry_after, patterns, Error};
use crate::retry;
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet, VecDeque};

/// SURT matching strategy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchType {
    Exact,
    Prefix,
    Host,
    Domain,
}

impl MatchType {
    fn as_query_value(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Host => "host",
            MatchType::Domain => "domain",
        }
    }
}

/// Parameters for a single `search` call.
#[derive(Clone, Debug)]
pub struct SearchParams {
    url: String,
    match_type: Option<MatchType>,
    /// True when `match_type` was inferred from a trailing `*` rather
    /// than requested explicitly; an explicit `with_match_type` call
    /// after that is a conflicting request.
    wildcard_inferred: bool,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
    limit: i64,
    fast_latest: Option<bool>,
    resolve_revisits: bool,
    filter_field: Vec<String>,
    collapse: Option<String>,
}

/// Default page size. Without a limit the server does not paginate
/// and large result sets silently truncate, so this must stay a
/// non-null positive value.
const DEFAULT_LIMIT: i64 = 1000;

impl SearchParams {
    /// Build search parameters for `url`.
    ///
    /// A URL ending in `*` is treated as a prefix match with the `*`
    /// stripped; combining that with an explicit [`Self::with_match_type`]
    /// is rejected when the params are turned into a query.
    pub fn new(url: impl Into<String>) -> Result<Self, Error> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::Other("search URL must not be empty".to_string()));
        }

        let (url, match_type, wildcard_inferred) = if let Some(stripped) = url.strip_suffix('*') {
            (stripped.to_string(), Some(MatchType::Prefix), true)
        } else {
            (url, None, false)
        };

        Ok(Self {
            url,
            match_type,
            wildcard_inferred,
            from_date: None,
            to_date: None,
            limit: DEFAULT_LIMIT,
            fast_latest: None,
            resolve_revisits: false,
            filter_field: Vec::new(),
            collapse: None,
        })
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Result<Self, Error> {
        if self.wildcard_inferred {
            return Err(Error::Other(
                "an explicit match_type cannot be combined with a *-terminated URL".to_string(),
            ));
        }
        self.match_type = Some(match_type);
        Ok(self)
    }

    pub fn with_date_range(
        mut self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.from_date = from_date;
        self.to_date = to_date;
        self
    }

    /// Positive = first N rows per page; negative = last N. Overrides the
    /// default of 1000.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_fast_latest(mut self, fast_latest: bool) -> Self {
        self.fast_latest = Some(fast_latest);
        self
    }

    pub fn with_resolve_revisits(mut self, resolve_revisits: bool) -> Self {
        self.resolve_revisits = resolve_revisits;
        self
    }

    /// Add a `field:pattern` filter expression. All added filters apply
    /// conjunctively.
    pub fn with_filter_field(mut self, filter: impl Into<String>) -> Self {
        self.filter_field.push(filter.into());
        self
    }

    pub fn with_collapse(mut self, field: impl Into<String>) -> Self {
        self.collapse = Some(field.into());
        self
    }

    fn query_pairs(&self, resume_key: Option<&str>) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("url".to_string(), self.url.clone()),
            ("limit".to_string(), self.limit.to_string()),
            ("showResumeKey".to_string(), "true".to_string()),
        ];

        if let Some(match_type) = self.match_type {
            pairs.push(("matchType".to_string(), match_type.as_query_value().to_string()));
        }
        if let Some(from_date) = self.from_date {
            pairs.push(("from".to_string(), crate::timestamp::format(&from_date)));
        }
        if let Some(to_date) = self.to_date {
            pairs.push(("to".to_string(), crate::timestamp::format(&to_date)));
        }
        if let Some(fast_latest) = self.fast_latest {
            pairs.push(("fastLatest".to_string(), fast_latest.to_string()));
        }
        if self.resolve_revisits {
            pairs.push(("resolveRevisits".to_string(), "true".to_string()));
        }
        for filter in &self.filter_field {
            pairs.push(("filter".to_string(), filter.clone()));
        }
        if let Some(collapse) = &self.collapse {
            pairs.push(("collapse".to_string(), collapse.clone()));
        }
        if let Some(resume_key) = resume_key {
            pairs.push(("resumeKey".to_string(), resume_key.to_string()));
        }

        pairs
    }
}

type Fingerprint = (DateTime<Utc>, String, String);

struct State<'a> {
    session: &'a Session,
    params: SearchParams,
    cancellation: Cancellation,
    resume_key: Option<String>,
    first_page: bool,
    done: bool,
    buffer: VecDeque<CdxRecord>,
    seen: HashSet<Fingerprint>,
    /// For `resolve_revisits`: the most recently seen non-revisit
    /// `(mime_type, status_code)` for each digest.
    revisit_originals: HashMap<String, (String, Option<u16>)>,
}

/// Search the CDX index for `url`, returning a lazy stream of records in
/// ascending timestamp order.
///
/// The returned stream is not restartable: if a page request fails
/// after retries are exhausted, the error is yielded once and the
/// stream ends; records already yielded remain valid.
pub fn search<'a>(
    session: &'a Session,
    params: SearchParams,
    cancellation: Cancellation,
) -> impl Stream<Item = Result<CdxRecord, Error>> + 'a {
    let state = State {
        session,
        params,
        cancellation,
        resume_key: None,
        first_page: true,
        done: false,
        buffer: VecDeque::new(),
        seen: HashSet::new(),
        revisit_originals: HashMap::new(),
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.buffer.pop_front() {
                return Ok(Some((record, state)));
            }

            if state.done {
                return Ok(None);
            }

            state.session.check_open()?;
            state.cancellation.check()?;

            match fetch_page(&state).await {
                Ok((records, resume_key)) => {
                    log::info!("Resume key: {:?}", resume_key);

                    state.done = resume_key.is_none();
                    state.resume_key = resume_key;
                    state.first_page = false;

                    for record in records {
                        let fingerprint = (
                            record.timestamp,
                            record.url.clone(),
                            record.digest.clone(),
                        );
                        if !state.seen.insert(fingerprint) {
                            continue;
                        }

                        let record = if state.params.resolve_revisits {
                            resolve_revisit(&mut state.revisit_originals, record)
                        } else {
                            record
                        };

                        state.buffer.push_back(record);
                    }
                }
                Err(Error::BlockedByRobots { .. }) | Err(Error::BlockedSite { .. })
                    if !state.first_page =>
                {
                    // Blocked signals on a later page terminate the
                    // iterator cleanly; earlier records stand.
                    state.done = true;
                    return Ok(None);
                }
                Err(error) => return Err(error),
            }
        }
    })
}

fn resolve_revisit(
    originals: &mut HashMap<String, (String, Option<u16>)>,
    mut record: CdxRecord,
) -> CdxRecord {
    if record.is_revisit() {
        if let Some((mime_type, status_code)) = originals.get(&record.digest) {
            record.mime_type = mime_type.clone();
            record.status_code = *status_code;
        }
    } else {
        originals.insert(
            record.digest.clone(),
            (record.mime_type.clone(), record.status_code),
        );
    }
    record
}

async fn fetch_page(state: &State<'_>) -> Result<(Vec<CdxRecord>, Option<String>), Error> {
    let pairs = state.params.query_pairs(state.resume_key.as_deref());
    let base_url = state.session.cdx_base_url().to_string();

    if let Ok(search_url) = reqwest::Url::parse_with_params(&base_url, &pairs) {
        log::debug!("Search URL: {}", search_url);
    }

    let body = retry::retry(state.session.search_retries(), || {
        let pairs = pairs.clone();
        let base_url = base_url.clone();
        let requested_url = state.params.url.clone();
        async move {
            state.session.pace_search(&state.cancellation).await?;
            let response = state
                .session
                .http()
                .get(&base_url)
                .query(&pairs)
                .send()
                .await?;
            classify_search_response(response, &requested_url).await
        }
    })
    .await?;

    parse_page(&body).map_err(|error| {
        let preview_len = body.len().min(300);
        log::debug!(
            "CDX response was not valid: {} (body_preview: {:?})",
            error,
            &body[..preview_len]
        );
        error
    })
}

async fn classify_search_response(
    response: reqwest::Response,
    requested_url: &str,
) -> Result<String, Error> {
    let status = response.status();

    if status.is_server_error() {
        return Err(response
            .error_for_status()
            .expect_err("status checked above")
            .into());
    }

    let headers = response.headers().clone();
    let body = response.text().await?;

    if status == StatusCode::FORBIDDEN {
        if patterns::BLOCKED_BY_ROBOTS.iter().any(|p| body.contains(p)) {
            return Err(Error::BlockedByRobots {
                url: requested_url.to_string(),
            });
        }
        if patterns::BLOCKED_SITE.iter().any(|p| body.contains(p)) {
            return Err(Error::BlockedSite {
                url: requested_url.to_string(),
            });
        }
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimit {
            retry_after: parse_retry_after(&headers),
        });
    }

    if status.is_success() && patterns::RATE_LIMITED.iter().any(|p| body.contains(p)) {
        return Err(Error::RateLimit {
            retry_after: parse_retry_after(&headers),
        });
    }

    if !status.is_success() {
        return Err(Error::UnexpectedResponseFormat(format!(
            "CDX search returned unexpected status {}",
            status
        )));
    }

    Ok(body)
}

/// Parse one CDX response body: each non-empty line up to the
/// blank-line-then-resume-key sentinel is a record; a resume key after
/// the sentinel means another page follows.
fn parse_page(body: &str) -> Result<(Vec<CdxRecord>, Option<String>), Error> {
    let mut lines = body.lines().peekable();
    let mut records = Vec::new();

    while let Some(line) = lines.next() {
        if line.is_empty() {
            // Blank line: everything remaining is the resume key (at
            // most one more non-empty line).
            let resume_key = lines.find(|l| !l.is_empty()).map(|l| l.to_string());
            return Ok((records, resume_key));
        }
        records.push(CdxRecord::parse_line(line)?);
    }

    Ok((records, None))
}
