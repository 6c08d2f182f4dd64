//! Parsing and formatting for Wayback Machine playback URLs:
//! `http[s]://web.archive.org/web/<timestamp><mode>/<target-url>`.

use crate::timestamp;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum Error {
    #[error("Not a Wayback Machine URL: {0:?}")]
    NotAWaybackUrl(String),
    #[error(transparent)]
    InvalidTimestamp(#[from] timestamp::Error),
}

/// A playback mode token, injected into the archive URL immediately after
/// the timestamp.
///
/// `Other` preserves any token this crate doesn't assign special meaning
/// to, so round-tripping through [`format`] is lossless for modes like
/// `if_` (iframe) or `im_` (image) that callers only need to pass through.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PlaybackMode {
    /// Exact archived response, bytes unmodified. Internal token `id_`.
    Original,
    /// Browser-friendly rewrite with Wayback decorations. Internal token
    /// the empty string.
    View,
    /// Alias for original's URL form used in legacy links. Internal token
    /// the empty string, same as `View`'s wire form but kept distinct so
    /// callers that explicitly asked for `raw` get it back from
    /// `PlaybackMode::token`.
    Raw,
    /// Any other mode token, preserved verbatim (e.g. `if_`, `im_`).
    Other(String),
}

impl PlaybackMode {
    /// The literal token placed immediately after the timestamp in an
    /// archive URL.
    pub fn token(&self) -> &str {
        match self {
            PlaybackMode::Original => "id_",
            PlaybackMode::View => "",
            PlaybackMode::Raw => "",
            PlaybackMode::Other(token) => token,
        }
    }

    fn from_token(token: &str) -> PlaybackMode {
        match token {
            "id_" => PlaybackMode::Original,
            "" => PlaybackMode::View,
            other => PlaybackMode::Other(other.to_string()),
        }
    }
}

/// The parsed components of a Wayback playback URL.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedArchiveUrl {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub mode: PlaybackMode,
}

lazy_static! {
    static ref ARCHIVE_URL_RE: Regex = Regex::new(
        r"^https?://web\.archive\.org/web/(?P<timestamp>\d{14})(?P<mode>[A-Za-z]*_?)/(?P<url>.+)$",
    )
    .unwrap();
}

/// Parse a Wayback playback URL into `(target_url, timestamp, mode)`.
///
/// This only accepts the canonical public `web.archive.org` host; it's
/// the entry point for user-supplied archive URLs. To interpret a
/// `Location` header returned mid-redirect against whatever base a
/// session is actually configured for (which tests point at a mock
/// server), use [`parse_with_base`] instead.
pub fn parse(input: &str) -> Result<ParsedArchiveUrl, Error> {
    let captures = ARCHIVE_URL_RE
        .captures(input)
        .ok_or_else(|| Error::NotAWaybackUrl(input.to_string()))?;

    let timestamp = timestamp::parse(&captures["timestamp"])?;
    let mode = PlaybackMode::from_token(&captures["mode"]);
    let url = captures["url"].to_string();

    Ok(ParsedArchiveUrl {
        url,
        timestamp,
        mode,
    })
}

/// Parse a playback URL formed against an arbitrary `base` (the counterpart
/// to [`format_with_base`]), rather than assuming the canonical public
/// host. Used to interpret a memento redirect's `Location` header against
/// the session's own configured memento base URL.
pub fn parse_with_base(base: &str, input: &str) -> Result<ParsedArchiveUrl, Error> {
    let pattern = format!(
        r"^{}/(?P<timestamp>\d{{14}})(?P<mode>[A-Za-z]*_?)/(?P<url>.+)$",
        regex::escape(base)
    );
    let re = Regex::new(&pattern).expect("base-scoped archive URL pattern is well-formed");

    let captures = re
        .captures(input)
        .ok_or_else(|| Error::NotAWaybackUrl(input.to_string()))?;

    let timestamp = timestamp::parse(&captures["timestamp"])?;
    let mode = PlaybackMode::from_token(&captures["mode"]);
    let url = captures["url"].to_string();

    Ok(ParsedArchiveUrl {
        url,
        timestamp,
        mode,
    })
}

/// The canonical, public Wayback Machine memento endpoint.
pub const DEFAULT_BASE_URL: &str = "https://web.archive.org/web";

/// Format `(target_url, timestamp, mode)` as a Wayback playback URL.
pub fn format(url: &str, ts: &DateTime<Utc>, mode: &PlaybackMode) -> String {
    format_with_base(DEFAULT_BASE_URL, url, ts, mode)
}

/// Format `(target_url, timestamp, mode)` as a playback URL against an
/// arbitrary base (e.g. a session configured to point at a mock server
/// in tests), rather than the canonical public endpoint.
pub fn format_with_base(base: &str, url: &str, ts: &DateTime<Utc>, mode: &PlaybackMode) -> String {
    format!("{}/{}{}/{}", base, timestamp::format(ts), mode.token(), url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_mode() {
        let parsed = parse("https://web.archive.org/web/20100304123045id_/http://example.com/")
            .unwrap();
        assert_eq!(parsed.url, "http://example.com/");
        assert_eq!(parsed.mode, PlaybackMode::Original);
    }

    #[test]
    fn parses_view_mode() {
        let parsed =
            parse("https://web.archive.org/web/20100304123045/http://example.com/").unwrap();
        assert_eq!(parsed.mode, PlaybackMode::View);
    }

    #[test]
    fn preserves_unknown_mode_token() {
        let parsed = parse("https://web.archive.org/web/20100304123045if_/http://example.com/")
            .unwrap();
        assert_eq!(parsed.mode, PlaybackMode::Other("if_".to_string()));
        assert_eq!(parsed.mode.token(), "if_");
    }

    #[test]
    fn round_trips() {
        let original = "https://web.archive.org/web/20100304123045id_/http://example.com/page?q=1";
        let parsed = parse(original).unwrap();
        assert_eq!(format(&parsed.url, &parsed.timestamp, &parsed.mode), original);
    }

    #[test]
    fn rejects_non_wayback_url() {
        assert!(parse("https://example.com/").is_err());
    }

    #[test]
    fn accepts_http_scheme() {
        let parsed =
            parse("http://web.archive.org/web/20100304123045id_/http://example.com/").unwrap();
        assert_eq!(parsed.url, "http://example.com/");
    }

    #[test]
    fn parse_with_base_accepts_a_non_canonical_host() {
        let base = "http://127.0.0.1:9999/web";
        let parsed = parse_with_base(
            base,
            "http://127.0.0.1:9999/web/20100304123045id_/http://example.com/",
        )
        .unwrap();
        assert_eq!(parsed.url, "http://example.com/");
        assert_eq!(parsed.mode, PlaybackMode::Original);
    }

    #[test]
    fn parse_with_base_rejects_a_different_host() {
        let base = "http://127.0.0.1:9999/web";
        assert!(parse_with_base(
            base,
            "https://web.archive.org/web/20100304123045id_/http://example.com/"
        )
        .is_err());
    }
}
