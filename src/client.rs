//! The thin `Client` facade wiring a [`Session`] to `search()` and
//! `get_memento()`, the two entry points external callers use.

use crate::cancel::Cancellation;
use crate::cdx::CdxRecord;
use crate::error::Error;
use crate::memento::{get_memento, Memento, MementoOptions, MementoTarget};
use crate::search::{search, SearchParams};
use crate::session::{Session, SessionBuilder};
use futures::stream::Stream;

/// Owns a [`Session`] and exposes the library's two operations.
pub struct Client {
    session: Session,
}

impl Client {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            session: Session::new()?,
        })
    }

    pub fn builder() -> SessionBuilder {
        Session::builder()
    }

    pub fn with_session(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn close(&mut self) {
        self.session.close();
    }

    /// Search the CDX index. The returned stream borrows this
    /// client's session and is lazy: nothing is fetched until it is
    /// polled.
    pub fn search<'a>(
        &'a self,
        params: SearchParams,
        cancellation: Cancellation,
    ) -> impl Stream<Item = Result<CdxRecord, Error>> + 'a {
        search(&self.session, params, cancellation)
    }

    /// Resolve a memento, navigating Wayback's redirect graph.
    pub async fn get_memento(
        &self,
        target: impl Into<MementoTarget>,
        options: &MementoOptions,
        cancellation: &Cancellation,
    ) -> Result<Memento, Error> {
        get_memento(&self.session, target.into(), options, cancellation).await
    }
}
