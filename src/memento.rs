//! The Memento value type and the redirect-graph fetcher: the hardest
//! single piece of this crate, since it has to tell apart Wayback's two
//! unrelated uses of a 3xx response — a navigation artifact pointing at
//! a nearby capture of the same page, and a historical fact about what
//! the page itself did at capture time.

use crate::archive_url::{self, PlaybackMode};
use crate::cancel::Cancellation;
use crate::cdx::CdxRecord;
use crate::error::{parse_retry_after, patterns, Error};
use crate::headers::Headers;
use crate::retry;
use crate::session::Session;
use crate::timestamp;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;

/// How many historically-redirected hops to follow before giving up.
const MAX_HISTORICAL_REDIRECTS: u32 = 10;

/// How many seconds an archival-internal redirect's landed timestamp
/// may diverge from the one requested before `exact=true` rejects it.
const EXACT_TOLERANCE_SECONDS: i64 = 1;

/// One entry of a parsed `Link` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub rel: String,
    pub datetime: Option<DateTime<Utc>>,
}

/// A successfully resolved archival capture, together with its HTTP
/// payload.
#[derive(Clone, Debug)]
pub struct Memento {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub mode: PlaybackMode,
    pub memento_url: String,
    pub status_code: u16,
    pub headers: Headers,
    pub encoding: Option<String>,
    pub content: Bytes,
    pub text: String,
    pub ok: bool,
    pub is_redirect: bool,
    /// Mementos traversed via *historical* redirects to reach this one,
    /// oldest first.
    pub history: Vec<Memento>,
    /// Every archive URL visited, including archival-internal hops that
    /// never became a `history` entry.
    pub debug_history: Vec<String>,
    /// TimeMap/navigation relations parsed from the final response's
    /// `Link` header, keyed by relation name.
    pub links: HashMap<String, Link>,
    closed: bool,
}

impl Memento {
    /// Release this memento's body.
    ///
    /// This crate materializes the body eagerly (`reqwest::Response::
    /// bytes()`) rather than streaming it, so there is no live socket
    /// left to release by the time a caller holds a `Memento`. This
    /// method exists for API parity with scoped-resource callers and
    /// simply marks the value closed.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Where to resolve a memento from: a bare URL plus timestamp, a CDX
/// record naming both, or a full archive URL.
#[derive(Clone, Debug)]
pub enum MementoTarget {
    Url {
        url: String,
        timestamp: DateTime<Utc>,
    },
    Record(CdxRecord),
    ArchiveUrl(String),
}

impl MementoTarget {
    fn resolve(&self, default_mode: &PlaybackMode) -> Result<(String, DateTime<Utc>, PlaybackMode), Error> {
        match self {
            MementoTarget::Url { url, timestamp } => {
                Ok((url.clone(), *timestamp, default_mode.clone()))
            }
            MementoTarget::Record(record) => {
                Ok((record.url.clone(), record.timestamp, default_mode.clone()))
            }
            MementoTarget::ArchiveUrl(raw) => {
                let parsed = archive_url::parse(raw)?;
                Ok((parsed.url, parsed.timestamp, parsed.mode))
            }
        }
    }
}

impl From<&CdxRecord> for MementoTarget {
    fn from(record: &CdxRecord) -> Self {
        MementoTarget::Record(record.clone())
    }
}

impl From<CdxRecord> for MementoTarget {
    fn from(record: CdxRecord) -> Self {
        MementoTarget::Record(record)
    }
}

/// Parameters controlling redirect-graph navigation.
#[derive(Clone, Debug)]
pub struct MementoOptions {
    pub mode: PlaybackMode,
    /// Reject archival-internal redirects that land outside a small
    /// tolerance of the requested timestamp.
    pub exact: bool,
    /// Whether `exact`'s tolerance also applies to each historical
    /// redirect hop in a chain. Defaults to the value of `exact`.
    pub exact_redirects: Option<bool>,
    /// Maximum divergence, in seconds, between the requested and landed
    /// timestamp, checked after archival-internal redirects resolve.
    pub target_window: Duration,
    pub follow_redirects: bool,
}

impl Default for MementoOptions {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::Original,
            exact: true,
            exact_redirects: None,
            target_window: Duration::from_secs(86_400),
            follow_redirects: true,
        }
    }
}

struct Hop {
    status: StatusCode,
    headers: HeaderMap,
    location: Option<String>,
    memento_datetime: Option<DateTime<Utc>>,
    body: Bytes,
}

/// Resolve a memento, navigating Wayback's redirect graph.
pub async fn get_memento(
    session: &Session,
    target: MementoTarget,
    options: &MementoOptions,
    cancellation: &Cancellation,
) -> Result<Memento, Error> {
    session.check_open()?;

    let (original_url, original_timestamp, mode) = target.resolve(&options.mode)?;

    let mut debug_history = Vec::new();
    let mut history = Vec::new();

    let mut current_url = original_url;
    let mut current_timestamp = original_timestamp;
    let mut current_mode = mode;
    let mut window_base = original_timestamp;
    let mut historical_hops: u32 = 0;

    loop {
        cancellation.check()?;

        let (hop, landed_timestamp, archive_url_str) = loop {
            cancellation.check()?;
            let archive_url_str =
                archive_url::format(&current_url, &current_timestamp, &current_mode);
            debug_history.push(archive_url_str.clone());

            let hop = fetch_hop(
                session,
                &current_url,
                current_timestamp,
                &current_mode,
                cancellation,
            )
            .await?;

            if !hop.status.is_redirection() {
                let landed = hop.memento_datetime.unwrap_or(current_timestamp);
                break (hop, landed, archive_url_str);
            }

            let location = hop.location.clone().ok_or_else(|| Error::MementoPlayback {
                url: current_url.clone(),
                requested_timestamp: timestamp::format(&current_timestamp),
                reason: "redirect response missing Location header".to_string(),
            })?;

            let parsed = archive_url::parse_with_base(session.memento_base_url(), &location)?;

            if parsed.url != current_url {
                let landed = hop.memento_datetime.unwrap_or(current_timestamp);
                break (hop, landed, archive_url_str);
            }

            // Archival-internal: same original URL, different
            // timestamp or playback mode. Not a historical fact; not
            // recorded in `history`, only `debug_history`.
            let exact_here = if historical_hops == 0 {
                options.exact
            } else {
                options.exact_redirects.unwrap_or(options.exact)
            };

            if exact_here {
                let diff = (parsed.timestamp - current_timestamp).num_seconds().abs();
                if diff > EXACT_TOLERANCE_SECONDS {
                    return Err(Error::MementoPlayback {
                        url: current_url.clone(),
                        requested_timestamp: timestamp::format(&current_timestamp),
                        reason: format!(
                            "archive redirected to a different timestamp under exact=true ({} -> {})",
                            timestamp::format(&current_timestamp),
                            timestamp::format(&parsed.timestamp)
                        ),
                    });
                }
            }

            current_timestamp = parsed.timestamp;
            current_mode = parsed.mode;
        };

        let diff = (landed_timestamp - window_base).num_seconds().unsigned_abs();
        if diff > options.target_window.as_secs() {
            return Err(Error::MementoPlayback {
                url: current_url.clone(),
                requested_timestamp: timestamp::format(&window_base),
                reason: format!(
                    "landed timestamp {} is outside the target window of {:?}",
                    timestamp::format(&landed_timestamp),
                    options.target_window
                ),
            });
        }

        if !hop.status.is_redirection() {
            return build_memento(
                &hop,
                &current_url,
                landed_timestamp,
                &current_mode,
                &archive_url_str,
                history,
                debug_history,
            );
        }

        // Historical redirect: the archived origin itself returned a
        // 3xx pointing at a different original URL.
        if !options.follow_redirects {
            return Err(Error::MementoPlayback {
                url: current_url.clone(),
                requested_timestamp: timestamp::format(&landed_timestamp),
                reason: "archive response is a historical redirect and follow_redirects is false"
                    .to_string(),
            });
        }

        historical_hops += 1;
        if historical_hops > MAX_HISTORICAL_REDIRECTS {
            return Err(Error::MementoPlayback {
                url: current_url.clone(),
                requested_timestamp: timestamp::format(&landed_timestamp),
                reason: format!(
                    "exceeded the maximum of {} historical redirects",
                    MAX_HISTORICAL_REDIRECTS
                ),
            });
        }

        let location = hop
            .location
            .clone()
            .expect("redirection hops always carry a Location header at this point");
        let parsed = archive_url::parse_with_base(session.memento_base_url(), &location)?;

        let prior = build_memento(
            &hop,
            &current_url,
            landed_timestamp,
            &current_mode,
            &archive_url_str,
            Vec::new(),
            debug_history.clone(),
        )?;
        history.push(prior);

        current_url = parsed.url;
        current_timestamp = parsed.timestamp;
        current_mode = parsed.mode;
        window_base = current_timestamp;
    }
}

/// Fetch one hop of the memento endpoint.
///
/// The request goes to the session's configured memento base URL (which
/// tests point at a mock server), but `url`/`timestamp`/`mode` are the
/// canonical coordinates used for error context and, by the caller, for
/// the public `memento_url`/`debug_history` values — those always read
/// as real `web.archive.org` URLs regardless of where the bytes came
/// from.
async fn fetch_hop(
    session: &Session,
    url: &str,
    timestamp: DateTime<Utc>,
    mode: &PlaybackMode,
    cancellation: &Cancellation,
) -> Result<Hop, Error> {
    let fetch_url = archive_url::format_with_base(session.memento_base_url(), url, &timestamp, mode);
    let requested_url = url.to_string();

    log::debug!("Memento URL: {}", fetch_url);

    retry::retry(session.memento_retries(), || {
        let fetch_url = fetch_url.clone();
        let requested_url = requested_url.clone();
        async move {
            session.pace_memento(cancellation).await?;
            let response = session.http().get(&fetch_url).send().await?;
            classify_response(response, &requested_url, timestamp).await
        }
    })
    .await
}

/// Turn a raw memento-endpoint response into a classified [`Hop`],
/// mapping the archive's error signals to this crate's error taxonomy.
///
/// The critical nuance: a memento of a page that itself returned 429
/// at capture time is valid archived data, not a client-side rate
/// limit. `has_memento_signal` tells the two apart by checking for
/// headers the archive only sends when it actually served a memento
/// payload (`Memento-Datetime`, any `X-Archive-Orig-*`).
async fn classify_response(
    response: reqwest::Response,
    requested_url: &str,
    requested_timestamp: DateTime<Utc>,
) -> Result<Hop, Error> {
    let status = response.status();

    if status.is_server_error() {
        return Err(response
            .error_for_status()
            .expect_err("status checked above")
            .into());
    }

    let headers = response.headers().clone();
    let location = headers
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let memento_datetime = headers
        .get("memento-datetime")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let has_memento_signal = memento_datetime.is_some()
        || headers
            .keys()
            .any(|name| name.as_str().to_ascii_lowercase().starts_with("x-archive-orig-"));

    let body = response.bytes().await?;
    let body_text = String::from_utf8_lossy(&body);

    if status == StatusCode::NOT_FOUND
        && !has_memento_signal
        && patterns::NO_MEMENTO.iter().any(|p| body_text.contains(p))
    {
        return Err(Error::NoMemento {
            url: requested_url.to_string(),
        });
    }

    if status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS && !has_memento_signal {
        return Err(Error::BlockedSite {
            url: requested_url.to_string(),
        });
    }

    if status == StatusCode::FORBIDDEN && !has_memento_signal {
        if patterns::BLOCKED_BY_ROBOTS.iter().any(|p| body_text.contains(p)) {
            return Err(Error::BlockedByRobots {
                url: requested_url.to_string(),
            });
        }
        if patterns::BLOCKED_SITE.iter().any(|p| body_text.contains(p)) {
            return Err(Error::BlockedSite {
                url: requested_url.to_string(),
            });
        }
    }

    if status == StatusCode::TOO_MANY_REQUESTS && !has_memento_signal {
        return Err(Error::RateLimit {
            retry_after: parse_retry_after(&headers),
        });
    }

    if status.is_success() && patterns::RATE_LIMITED.iter().any(|p| body_text.contains(p)) {
        return Err(Error::RateLimit {
            retry_after: parse_retry_after(&headers),
        });
    }

    if !status.is_success() && !status.is_redirection() && !has_memento_signal {
        // Keep diagnostics low-noise: only log details at debug, and only
        // when the response doesn't map to a specific taxonomy leaf.
        let preview_len = body_text.len().min(300);
        log::debug!(
            "Memento response did not match a known signal (status: {}, body_preview: {:?})",
            status,
            &body_text[..preview_len]
        );
        return Err(Error::MementoPlayback {
            url: requested_url.to_string(),
            requested_timestamp: timestamp::format(&requested_timestamp),
            reason: format!("unexpected response status {}", status),
        });
    }

    Ok(Hop {
        status,
        headers,
        location,
        memento_datetime,
        body,
    })
}

fn build_memento(
    hop: &Hop,
    url: &str,
    timestamp: DateTime<Utc>,
    mode: &PlaybackMode,
    memento_url: &str,
    history: Vec<Memento>,
    debug_history: Vec<String>,
) -> Result<Memento, Error> {
    let headers = Headers::from_archive_orig_headers(
        hop.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    );

    let encoding = hop
        .headers
        .get("x-archive-orig-content-type")
        .or_else(|| hop.headers.get(reqwest::header::CONTENT_TYPE))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let links = hop
        .headers
        .get(reqwest::header::LINK)
        .and_then(|v| v.to_str().ok())
        .map(parse_link_header)
        .unwrap_or_default();

    let text = String::from_utf8_lossy(&hop.body).into_owned();

    Ok(Memento {
        url: url.to_string(),
        timestamp,
        mode: mode.clone(),
        memento_url: memento_url.to_string(),
        status_code: hop.status.as_u16(),
        headers,
        encoding,
        content: hop.body.clone(),
        text,
        ok: hop.status.is_success(),
        is_redirect: hop.status.is_redirection(),
        history,
        debug_history,
        links,
        closed: false,
    })
}

lazy_static! {
    static ref LINK_ENTRY_RE: Regex =
        Regex::new(r#"<([^>]*)>((?:\s*;\s*[a-zA-Z]+="[^"]*")*)"#).unwrap();
    static ref LINK_PARAM_RE: Regex = Regex::new(r#"([a-zA-Z]+)="([^"]*)""#).unwrap();
}

/// Parse an RFC 5988 `Link` header into the relations it names,
/// keyed by relation name (e.g. `"next memento"`, `"timemap"`).
fn parse_link_header(value: &str) -> HashMap<String, Link> {
    let mut links = HashMap::new();

    for entry in LINK_ENTRY_RE.captures_iter(value) {
        let url = entry[1].to_string();
        let mut rel = None;
        let mut datetime = None;

        for param in LINK_PARAM_RE.captures_iter(&entry[2]) {
            match &param[1] {
                "rel" => rel = Some(param[2].to_string()),
                "datetime" => {
                    datetime = chrono::DateTime::parse_from_rfc2822(&param[2])
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc));
                }
                _ => {}
            }
        }

        if let Some(rel) = rel {
            links.insert(rel.clone(), Link { url, rel, datetime });
        }
    }

    links
}
