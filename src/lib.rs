//! A client for the Internet Archive's Wayback Machine: CDX capture
//! search and memento retrieval, including navigation of the redirect
//! graph the archive's playback endpoint exposes.
//!
//! The two entry points most callers need are [`Client::search`] and
//! [`Client::get_memento`].

pub mod archive_url;
pub mod cancel;
pub mod cdx;
pub mod client;
pub mod digest;
pub mod error;
pub mod headers;
pub mod memento;
pub mod rate_limit;
pub mod retry;
pub mod search;
pub mod session;
pub mod timestamp;

pub use cdx::CdxRecord;
pub use client::Client;
pub use error::Error;
pub use memento::{Memento, MementoOptions, MementoTarget};
pub use search::{MatchType, SearchParams};
pub use session::Session;
