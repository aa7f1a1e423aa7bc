//! In-process [`StoreClient`] backed by plain maps.
//!
//! Used by the test suite and the demo binary. It mimics the store behaviors
//! the pipeline cares about: point-in-time snapshot cursors, per-collection
//! auto-refresh visibility, per-document version conflicts, and it can
//! inject transient rejections, whole-request failures, cursor expiry and
//! bulk latency on demand.
//!
//! Filter interpretation is shallow: every top-level field of the filter
//! document must be equal in the candidate document; the empty document
//! matches everything.

use super::{CursorRequest, CursorToken, Hit, ScrollBatch, StoreClient, WriteOperation, WriteOutcome};
use crate::error::{ReindexError, Result};
use bson::Document;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// An in-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    cursors: HashMap<String, Cursor>,
    transient_failures: HashMap<String, u32>,
    conflicts: HashSet<String>,
    failing_bulks: u32,
    bulk_delay: Option<Duration>,
    expire_after_advances: Option<u32>,
}

struct Collection {
    auto_refresh: bool,
    docs: BTreeMap<String, StoredDoc>,
    /// Ids written but not yet visible to reads.
    pending: HashSet<String>,
}

impl Collection {
    fn new(auto_refresh: bool) -> Collection {
        Collection {
            auto_refresh,
            docs: BTreeMap::new(),
            pending: HashSet::new(),
        }
    }
}

struct StoredDoc {
    doc_type: Option<String>,
    source: Document,
    version: u64,
}

struct Cursor {
    remaining: VecDeque<Hit>,
    batch_size: usize,
    advances_left: Option<u32>,
}

fn matches(filter: &Document, doc: &Document) -> bool {
    filter.iter().all(|(key, want)| doc.get(key) == Some(want))
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Create a collection. With `auto_refresh` off, writes stay invisible
    /// to reads until [`StoreClient::force_refresh`] runs.
    pub fn create_collection(&self, name: &str, auto_refresh: bool) {
        self.lock()
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(auto_refresh));
    }

    /// Seed one document. The collection is created (auto-refreshing) if it
    /// does not exist yet.
    pub fn insert(&self, collection: &str, id: &str, source: Document) {
        self.insert_doc(collection, None, id, source);
    }

    /// Seed one typed document.
    pub fn insert_with_type(&self, collection: &str, doc_type: &str, id: &str, source: Document) {
        self.insert_doc(collection, Some(doc_type.to_string()), id, source);
    }

    fn insert_doc(&self, collection: &str, doc_type: Option<String>, id: &str, source: Document) {
        let mut inner = self.lock();
        let coll = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(true));
        let version = coll.docs.get(id).map(|d| d.version + 1).unwrap_or(1);
        coll.docs.insert(
            id.to_string(),
            StoredDoc {
                doc_type,
                source,
                version,
            },
        );
        if coll.auto_refresh {
            coll.pending.remove(id);
        } else {
            coll.pending.insert(id.to_string());
        }
    }

    /// Number of documents visible to reads in `collection`. A collection
    /// that does not exist counts as empty.
    pub fn visible_count(&self, collection: &str) -> u64 {
        let inner = self.lock();
        match inner.collections.get(collection) {
            Some(coll) => coll
                .docs
                .keys()
                .filter(|id| !coll.pending.contains(*id))
                .count() as u64,
            None => 0,
        }
    }

    /// Stored version of a visible document, if any.
    pub fn visible_version(&self, collection: &str, id: &str) -> Option<u64> {
        let inner = self.lock();
        let coll = inner.collections.get(collection)?;
        if coll.pending.contains(id) {
            return None;
        }
        coll.docs.get(id).map(|d| d.version)
    }

    /// Reject the next `times` writes of document `id` as transient.
    pub fn fail_writes(&self, id: &str, times: u32) {
        self.lock().transient_failures.insert(id.to_string(), times);
    }

    /// Make every write of document `id` fail with a version conflict.
    pub fn conflict_on(&self, id: &str) {
        self.lock().conflicts.insert(id.to_string());
    }

    /// Fail the next `times` whole bulk requests at the transport level.
    pub fn fail_bulk_requests(&self, times: u32) {
        self.lock().failing_bulks = times;
    }

    /// Sleep this long inside every bulk request.
    pub fn delay_bulks(&self, delay: Duration) {
        self.lock().bulk_delay = Some(delay);
    }

    /// Expire cursors opened from now on after `advances` advances.
    pub fn expire_cursors_after(&self, advances: u32) {
        self.lock().expire_after_advances = Some(advances);
    }

    /// How many cursors are currently open. The pipeline releases its cursor
    /// on every exit path, so this drains back to zero after each job.
    pub fn open_cursor_count(&self) -> usize {
        self.lock().cursors.len()
    }
}

impl StoreClient for MemoryStore {
    fn open_cursor(&self, request: &CursorRequest<'_>) -> Result<(CursorToken, ScrollBatch)> {
        let mut inner = self.lock();
        let mut snapshot: VecDeque<Hit> = VecDeque::new();
        for name in request.collections {
            let coll = inner.collections.get(name).ok_or_else(|| {
                ReindexError::transport("open_cursor", format!("unknown collection {:?}", name))
            })?;
            for (id, stored) in &coll.docs {
                if coll.pending.contains(id) {
                    continue;
                }
                if let Some(types) = request.doc_types {
                    let matched = stored
                        .doc_type
                        .as_ref()
                        .map(|t| types.contains(t))
                        .unwrap_or(false);
                    if !matched {
                        continue;
                    }
                }
                if !matches(request.filter, &stored.source) {
                    continue;
                }
                snapshot.push_back(Hit {
                    id: id.clone(),
                    routing: None,
                    source: stored.source.clone(),
                });
            }
        }

        let mut cursor = Cursor {
            remaining: snapshot,
            batch_size: request.batch_size,
            advances_left: inner.expire_after_advances,
        };
        let first: Vec<Hit> = {
            let take = cursor.batch_size.min(cursor.remaining.len());
            cursor.remaining.drain(..take).collect()
        };
        let token = CursorToken::new(Uuid::new_v4().to_string());
        inner.cursors.insert(token.as_str().to_string(), cursor);
        Ok((token, ScrollBatch { hits: first }))
    }

    fn advance_cursor(
        &self,
        token: &CursorToken,
        _keep_alive: Duration,
        _timeout: Duration,
    ) -> Result<ScrollBatch> {
        let mut inner = self.lock();
        let expired = match inner.cursors.get_mut(token.as_str()) {
            Some(cursor) => match cursor.advances_left.as_mut() {
                Some(left) if *left == 0 => true,
                Some(left) => {
                    *left -= 1;
                    false
                }
                None => false,
            },
            None => true,
        };
        if expired {
            inner.cursors.remove(token.as_str());
            return Err(ReindexError::ScrollExpired(token.as_str().to_string()));
        }
        let hits: Vec<Hit> = match inner.cursors.get_mut(token.as_str()) {
            Some(cursor) => {
                let take = cursor.batch_size.min(cursor.remaining.len());
                cursor.remaining.drain(..take).collect()
            }
            None => Vec::new(),
        };
        Ok(ScrollBatch { hits })
    }

    fn release_cursor(&self, token: &CursorToken) -> Result<()> {
        self.lock().cursors.remove(token.as_str());
        Ok(())
    }

    fn bulk_write(
        &self,
        operations: &[WriteOperation],
        _timeout: Duration,
    ) -> Result<Vec<WriteOutcome>> {
        let delay = {
            let mut inner = self.lock();
            if inner.failing_bulks > 0 {
                inner.failing_bulks -= 1;
                return Err(ReindexError::transport("bulk_write", "injected bulk failure"));
            }
            inner.bulk_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.lock();
        let mut outcomes = Vec::with_capacity(operations.len());
        for op in operations {
            if let Some(left) = inner.transient_failures.get_mut(&op.id) {
                if *left > 0 {
                    *left -= 1;
                    outcomes.push(WriteOutcome::Retryable("write queue full".to_string()));
                    continue;
                }
            }
            if inner.conflicts.contains(&op.id) {
                outcomes.push(WriteOutcome::VersionConflict);
                continue;
            }
            let coll = inner
                .collections
                .entry(op.collection.clone())
                .or_insert_with(|| Collection::new(true));
            let previous = coll.docs.get(&op.id).map(|d| d.version);
            coll.docs.insert(
                op.id.clone(),
                StoredDoc {
                    doc_type: op.doc_type.clone(),
                    source: op.source.clone(),
                    version: previous.unwrap_or(0) + 1,
                },
            );
            if coll.auto_refresh {
                coll.pending.remove(&op.id);
            } else {
                coll.pending.insert(op.id.clone());
            }
            outcomes.push(match previous {
                Some(_) => WriteOutcome::Updated,
                None => WriteOutcome::Created,
            });
        }
        Ok(outcomes)
    }

    fn force_refresh(&self, collection: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(coll) = inner.collections.get_mut(collection) {
            coll.pending.clear();
        }
        Ok(())
    }
}
