//! Scroll cursor ownership.

use crate::error::{ReindexError, Result};
use crate::request::ReindexRequest;
use crate::store::{CursorRequest, CursorToken, ScrollBatch, StoreClient};
use crate::DEFAULT_KEEP_ALIVE;
use std::time::Duration;
use tracing::warn;

/// Exclusive owner of one server-side scroll cursor.
///
/// The token never leaves this type. `release` runs on every exit path
/// (explicitly from the driver, from `Drop` as the backstop) and is
/// idempotent; release errors are logged and swallowed, never re-raised.
pub(crate) struct ScrollCursor<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    token: Option<CursorToken>,
    keep_alive: Duration,
    timeout: Duration,
}

impl<'a, C: StoreClient + ?Sized> ScrollCursor<'a, C> {
    /// Open a cursor over the request's filtered sources and return it
    /// together with the first batch.
    pub(crate) fn open(
        client: &'a C,
        request: &ReindexRequest,
    ) -> Result<(ScrollCursor<'a, C>, ScrollBatch)> {
        let cursor_request = CursorRequest {
            collections: request.sources(),
            doc_types: request.source_types(),
            filter: request.filter(),
            batch_size: request.batch_size(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            timeout: request.timeout(),
        };
        let (token, first) = client.open_cursor(&cursor_request)?;
        let cursor = ScrollCursor {
            client,
            token: Some(token),
            keep_alive: DEFAULT_KEEP_ALIVE,
            timeout: request.timeout(),
        };
        Ok((cursor, first))
    }

    /// Fetch the next batch, or the terminal empty batch once exhausted.
    pub(crate) fn advance(&mut self) -> Result<ScrollBatch> {
        match &self.token {
            Some(token) => self.client.advance_cursor(token, self.keep_alive, self.timeout),
            None => Err(ReindexError::ScrollExpired(
                "cursor already released".to_string(),
            )),
        }
    }

    /// Release the cursor. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.client.release_cursor(&token) {
                warn!(%token, error = %e, "Release scroll cursor failed");
            }
        }
    }
}

impl<C: StoreClient + ?Sized> Drop for ScrollCursor<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}
