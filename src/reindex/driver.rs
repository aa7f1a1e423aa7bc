//! The pipeline state machine.
//!
//! One driver runs one job to completion on the calling thread:
//!
//! ```text
//! Idle -> Opening -> Reading -> Writing -> (Reading | Completing | Aborting)
//!                       |                          Completing | Aborting -> Released
//!                       +-> Completing | Aborting
//! ```
//!
//! The driver holds the only cross-batch state: the cursor, the running
//! totals and the documents-read budget. Every terminal path releases the
//! cursor before the outcome is reported.

use crate::error::ReindexError;
use crate::reindex::bulk::BulkWriter;
use crate::reindex::cursor::ScrollCursor;
use crate::reindex::response::Totals;
use crate::reindex::transform;
use crate::reindex::JobOutcome;
use crate::request::{RefreshPolicy, ReindexRequest};
use crate::store::{Hit, ScrollBatch, StoreClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info};

enum State {
    Idle,
    Opening,
    Reading(ScrollBatch),
    Writing(Vec<Hit>),
    Completing,
    Aborting(Terminal),
}

enum Terminal {
    Fatal(ReindexError),
    Cancelled,
}

pub(crate) struct PipelineDriver<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    request: &'a ReindexRequest,
    cancel: &'a AtomicBool,
    cursor: Option<ScrollCursor<'a, C>>,
    totals: Totals,
    hits_read: u64,
    started: Instant,
}

impl<'a, C: StoreClient + ?Sized> PipelineDriver<'a, C> {
    pub(crate) fn new(
        client: &'a C,
        request: &'a ReindexRequest,
        cancel: &'a AtomicBool,
    ) -> PipelineDriver<'a, C> {
        PipelineDriver {
            client,
            request,
            cancel,
            cursor: None,
            totals: Totals::default(),
            hits_read: 0,
            started: Instant::now(),
        }
    }

    /// Drive the job to a terminal outcome. Consumes the driver: the state
    /// machine is not reusable once released.
    pub(crate) fn run(mut self) -> JobOutcome {
        info!(
            sources = ?self.request.sources(),
            dest = %self.request.dest(),
            batch_size = self.request.batch_size(),
            "Reindex: job starting"
        );
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => State::Opening,
                State::Opening => self.open(),
                State::Reading(batch) => self.read(batch),
                State::Writing(hits) => self.write(hits),
                State::Completing => return self.complete(),
                State::Aborting(terminal) => return self.abort(terminal),
            };
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Budget left under the size cap; `None` means unbounded.
    fn remaining_budget(&self) -> Option<u64> {
        self.request
            .size_cap()
            .map(|cap| cap.saturating_sub(self.hits_read))
    }

    fn open(&mut self) -> State {
        match ScrollCursor::open(self.client, self.request) {
            Ok((cursor, first)) => {
                self.cursor = Some(cursor);
                State::Reading(first)
            }
            Err(e) => State::Aborting(Terminal::Fatal(e)),
        }
    }

    fn read(&mut self, batch: ScrollBatch) -> State {
        if self.cancelled() {
            return State::Aborting(Terminal::Cancelled);
        }
        if batch.is_terminal() {
            return State::Completing;
        }
        let mut hits = batch.hits;
        if let Some(remaining) = self.remaining_budget() {
            if remaining == 0 {
                return State::Completing;
            }
            if hits.len() as u64 > remaining {
                // the clamped tail is left unread; the cursor is released
                // without exhausting it
                hits.truncate(remaining as usize);
            }
        }
        State::Writing(hits)
    }

    fn write(&mut self, hits: Vec<Hit>) -> State {
        if self.cancelled() {
            return State::Aborting(Terminal::Cancelled);
        }
        let count = hits.len() as u64;
        let operations = match transform::write_ops(self.request, hits) {
            Ok(operations) => operations,
            Err(e) => return State::Aborting(Terminal::Fatal(e)),
        };
        let writer = BulkWriter::new(
            self.client,
            self.request.timeout(),
            self.request.retry_attempts(),
            self.request.retry_backoff(),
        );
        let outcomes = match writer.submit(&operations) {
            Ok(outcomes) => outcomes,
            Err(e) => return State::Aborting(Terminal::Fatal(e)),
        };
        self.hits_read += count;
        self.totals.record_batch(&operations, &outcomes);
        debug!(batch = count, total = self.hits_read, "Reindex: batch written");

        if self.remaining_budget() == Some(0) {
            return State::Completing;
        }
        let next = match self.cursor.as_mut() {
            Some(cursor) => cursor.advance(),
            None => Err(ReindexError::Internal(
                "cursor missing while the pipeline was writing".to_string(),
            )),
        };
        match next {
            Ok(batch) => State::Reading(batch),
            Err(e) => State::Aborting(Terminal::Fatal(e)),
        }
    }

    fn complete(mut self) -> JobOutcome {
        if self.request.refresh() == RefreshPolicy::Force {
            if let Err(e) = self.client.force_refresh(self.request.dest()) {
                return self.abort(Terminal::Fatal(e));
            }
        }
        self.release_cursor();
        let took = self.started.elapsed();
        info!(
            documents = self.hits_read,
            took_ms = took.as_millis() as u64,
            "Reindex: job complete"
        );
        match self.totals.finalize(took, self.hits_read, self.request) {
            Ok(response) => JobOutcome::Completed(response),
            Err(e) => JobOutcome::Failed(e),
        }
    }

    fn abort(mut self, terminal: Terminal) -> JobOutcome {
        self.release_cursor();
        let took = self.started.elapsed();
        match terminal {
            Terminal::Cancelled => {
                info!(documents = self.hits_read, "Reindex: job cancelled");
                match self.totals.finalize(took, self.hits_read, self.request) {
                    Ok(response) => JobOutcome::Cancelled(response),
                    Err(e) => JobOutcome::Failed(e),
                }
            }
            Terminal::Fatal(e) => {
                error!(error = %e, "Reindex: job failed");
                JobOutcome::Failed(e)
            }
        }
    }

    fn release_cursor(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.release();
        }
    }
}
