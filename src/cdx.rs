//! The CDX record value type and plain-text CDX line parsing, covering
//! the 7-field dialect the capture index's search endpoint returns:
//! `urlkey timestamp original mimetype statuscode digest length`.

use crate::archive_url::{self, PlaybackMode};
use crate::error::Error;
use crate::timestamp;
use chrono::{DateTime, Utc};

/// The sentinel MIME type the CDX index uses for revisit records: rows
/// whose content was identical to a prior capture and so is stored only
/// by reference to that capture's digest.
pub const REVISIT_MIME_TYPE: &str = "warc/revisit";

/// One row of the Wayback Machine's capture index.
#[derive(Clone, Debug, PartialEq)]
pub struct CdxRecord {
    /// SURT-form canonical lookup key, e.g. `gov,nasa)/`.
    pub key: String,
    /// UTC instant this capture was made, at 1-second resolution.
    pub timestamp: DateTime<Utc>,
    /// The originally-captured URL (may differ from the query URL by
    /// case, scheme, or trailing slash).
    pub url: String,
    /// Possibly the sentinel [`REVISIT_MIME_TYPE`], or empty.
    pub mime_type: String,
    /// HTTP status from the original capture; absent when unknown.
    pub status_code: Option<u16>,
    /// Content digest (Base32 SHA-1 as returned by the index).
    pub digest: String,
    /// Captured byte length, when known.
    pub length: Option<u64>,
}

impl CdxRecord {
    pub fn new(
        key: String,
        timestamp: DateTime<Utc>,
        url: String,
        mime_type: String,
        status_code: Option<u16>,
        digest: String,
        length: Option<u64>,
    ) -> Self {
        Self {
            key,
            timestamp,
            url,
            mime_type,
            status_code,
            digest,
            length,
        }
    }

    /// Whether this row is a revisit record: its content was identical
    /// to a prior capture and is stored only by reference.
    pub fn is_revisit(&self) -> bool {
        self.mime_type == REVISIT_MIME_TYPE
    }

    /// The fully-formed archive URL in original-playback mode for this
    /// capture.
    pub fn raw_url(&self) -> String {
        archive_url::format(&self.url, &self.timestamp, &PlaybackMode::Original)
    }

    /// The fully-formed archive URL in browse-friendly mode for this
    /// capture.
    pub fn view_url(&self) -> String {
        archive_url::format(&self.url, &self.timestamp, &PlaybackMode::View)
    }

    /// A fingerprint used for the search iterator's deduplication: the
    /// `(timestamp, original-url, digest)` tuple.
    pub fn fingerprint(&self) -> (DateTime<Utc>, &str, &str) {
        (self.timestamp, self.url.as_str(), self.digest.as_str())
    }

    /// Parse one whitespace-separated CDX line in the fixed field order:
    /// `urlkey timestamp original mimetype statuscode digest length`.
    pub fn parse_line(line: &str) -> Result<CdxRecord, Error> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() < 6 {
            return Err(Error::UnexpectedResponseFormat(format!(
                "expected at least 6 whitespace-separated fields, found {}: {:?}",
                fields.len(),
                line
            )));
        }

        let key = fields[0].to_string();
        let ts = timestamp::parse(fields[1])
            .map_err(|e| Error::UnexpectedResponseFormat(e.to_string()))?;
        let url = fields[2].to_string();
        let mime_type = fields[3].to_string();

        let status_code = match fields[4] {
            "-" | "0" => None,
            other => Some(other.parse::<u16>().map_err(|_| {
                Error::UnexpectedResponseFormat(format!("invalid status code: {:?}", other))
            })?),
        };

        let digest = fields[5].to_string();

        let length = match fields.get(6) {
            None | Some(&"-") => None,
            Some(other) => Some(other.parse::<u64>().map_err(|_| {
                Error::UnexpectedResponseFormat(format!("invalid length: {:?}", other))
            })?),
        };

        Ok(CdxRecord::new(
            key,
            ts,
            url,
            mime_type,
            status_code,
            digest,
            length,
        ))
    }
}
