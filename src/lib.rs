//! Copy documents between collections of a document store.
//!
//! The pipeline reads a filtered source through a server-side scroll cursor,
//! one batch at a time, and writes each batch into the destination with a
//! retrying bulk request, while enforcing an optional global size cap and
//! accounting every per-document outcome. One batch is resident at a time:
//! the pipeline never reads faster than it writes.
//!
//! Jobs are described by a [`ReindexRequest`], submitted to a [`Reindexer`]
//! running against any [`StoreClient`] implementation, and report a
//! [`ReindexResponse`] through a [`JobHandle`].
//!
//! # Example
//! ```
//! use doc_reindex::{JobOutcome, MemoryStore, RefreshPolicy, ReindexRequest, Reindexer};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert("source", "1", doc! {"foo": "a"});
//! store.insert("source", "2", doc! {"foo": "b"});
//!
//! let request = ReindexRequest::new(
//!     vec!["source".to_string()],
//!     None,
//!     "dest".to_string(),
//!     None,
//!     None,
//!     None,
//!     None,
//!     RefreshPolicy::Unset,
//! )
//! .unwrap();
//!
//! let reindexer = Reindexer::new(Arc::clone(&store));
//! match reindexer.run(request) {
//!     JobOutcome::Completed(response) => assert_eq!(response.created, 2),
//!     other => panic!("{:?}", other),
//! }
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod reindex;
mod request;
pub mod store;

use std::time::Duration;

/// default documents per scroll round trip.
const DEFAULT_BATCH_SIZE: usize = 10;
/// default per-round-trip timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// how long the server keeps an idle cursor alive between round trips.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(300);
/// default total submissions of one operation in a bulk write.
const DEFAULT_RETRY_ATTEMPTS: u32 = 10;
/// default initial delay before the first bulk retry.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub use config::{JobConf, ReindexConfig};
pub use error::{ReindexError, Result};
pub use reindex::{JobHandle, JobOutcome, ReindexResponse, Reindexer, WriteFailure};
pub use request::{RefreshPolicy, ReindexRequest};
pub use store::memory::MemoryStore;
pub use store::{
    CursorRequest, CursorToken, Hit, ScrollBatch, StoreClient, WriteOperation, WriteOutcome,
};
