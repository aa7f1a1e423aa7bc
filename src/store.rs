//! The store-facing seam of the pipeline.
//!
//! Everything that actually talks to a cluster lives behind [`StoreClient`]:
//! opening and draining scroll cursors, bulk writes, forced refreshes. The
//! pipeline never interprets the filter or the document payloads; it hands
//! both through untouched.

use crate::Result;
use bson::Document;
use std::fmt;
use std::time::Duration;

pub mod memory;

/// Opaque handle for a server-side scroll cursor.
///
/// Exclusively owned by the driver's cursor for the lifetime of a job and
/// released exactly once on every exit path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorToken(String);

impl CursorToken {
    /// Wrap a server-issued token.
    pub fn new(token: impl Into<String>) -> CursorToken {
        CursorToken(token.into())
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One document pulled from a source collection.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Document id.
    pub id: String,
    /// Routing key, when the source shard routing is explicit.
    pub routing: Option<String>,
    /// Raw source payload.
    pub source: Document,
}

/// One batch of hits from a scroll cursor, in cursor order.
///
/// An empty batch is the terminal batch: the cursor is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScrollBatch {
    /// Hits in this round trip.
    pub hits: Vec<Hit>,
}

impl ScrollBatch {
    /// Whether this batch signals cursor exhaustion.
    pub fn is_terminal(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Parameters for opening a scroll cursor over the filtered source.
#[derive(Debug)]
pub struct CursorRequest<'a> {
    /// Source collections to read, at least one.
    pub collections: &'a [String],
    /// Restrict to these document types; `None` reads every type.
    pub doc_types: Option<&'a [String]>,
    /// Opaque filter; the store interprets it, the pipeline does not.
    /// An empty document matches everything.
    pub filter: &'a Document,
    /// Documents per round trip.
    pub batch_size: usize,
    /// How long the server should keep the cursor alive between round trips.
    pub keep_alive: Duration,
    /// Round-trip timeout.
    pub timeout: Duration,
}

/// One write derived from one hit. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct WriteOperation {
    /// Destination collection.
    pub collection: String,
    /// Destination document type, when the destination is typed.
    pub doc_type: Option<String>,
    /// Document id, carried over from the hit.
    pub id: String,
    /// Routing key, carried over from the hit.
    pub routing: Option<String>,
    /// Payload to write.
    pub source: Document,
}

/// Per-operation result of a bulk write.
///
/// Rejections are data, not errors: only whole-request failures surface as
/// [`ReindexError`](crate::ReindexError).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document did not exist and was created.
    Created,
    /// The document existed and was overwritten.
    Updated,
    /// The write changed nothing.
    Noop,
    /// Rejected because the target document changed concurrently. Never
    /// retried.
    VersionConflict,
    /// Momentary rejection (load shedding, queue full); eligible for retry.
    Retryable(String),
    /// Rejected for good; recorded in the response's failure list.
    Permanent(String),
}

impl WriteOutcome {
    /// Whether this outcome should be resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteOutcome::Retryable(_))
    }
}

/// Client interface to the document store.
///
/// Implementations own the wire protocol, node failover, request encoding
/// and filter interpretation. All methods are blocking; the `timeout`
/// arguments bound one round trip and expiry must surface as
/// [`ReindexError::Transport`](crate::ReindexError::Transport).
pub trait StoreClient: Send + Sync {
    /// Open a cursor over the filtered sources and return the first batch.
    fn open_cursor(&self, request: &CursorRequest<'_>) -> Result<(CursorToken, ScrollBatch)>;

    /// Fetch the next batch for an open cursor, or the terminal empty batch.
    ///
    /// Advancing a released or server-expired cursor fails with
    /// [`ReindexError::ScrollExpired`](crate::ReindexError::ScrollExpired).
    fn advance_cursor(
        &self,
        token: &CursorToken,
        keep_alive: Duration,
        timeout: Duration,
    ) -> Result<ScrollBatch>;

    /// Release a cursor. Idempotent: releasing an unknown or already
    /// released token succeeds.
    fn release_cursor(&self, token: &CursorToken) -> Result<()>;

    /// Execute every operation and report one outcome per operation, in
    /// operation order.
    fn bulk_write(
        &self,
        operations: &[WriteOperation],
        timeout: Duration,
    ) -> Result<Vec<WriteOutcome>>;

    /// Make previous writes to `collection` visible to reads.
    fn force_refresh(&self, collection: &str) -> Result<()>;
}
