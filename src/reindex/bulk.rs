//! Batched writes with bounded retry.

use crate::error::{ReindexError, Result};
use crate::store::{StoreClient, WriteOperation, WriteOutcome};
use std::time::Duration;
use tracing::{debug, warn};

/// Ceiling on the doubling retry delay.
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Submits one batch at a time and classifies per-operation outcomes.
///
/// Only [`WriteOutcome::Retryable`] operations are resubmitted; conflicts
/// and permanent rejections stand, and the rest of the batch proceeds
/// independently. A whole-request failure from the client propagates as the
/// job's terminal error.
pub(crate) struct BulkWriter<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    timeout: Duration,
    attempts: u32,
    backoff: Duration,
}

impl<'a, C: StoreClient + ?Sized> BulkWriter<'a, C> {
    pub(crate) fn new(
        client: &'a C,
        timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> BulkWriter<'a, C> {
        BulkWriter {
            client,
            timeout,
            attempts,
            backoff,
        }
    }

    /// Execute `operations`, returning one outcome per operation in input
    /// order. After the attempt bound, still-transient operations are
    /// reclassified as permanent.
    pub(crate) fn submit(&self, operations: &[WriteOperation]) -> Result<Vec<WriteOutcome>> {
        let mut outcomes = self.client.bulk_write(operations, self.timeout)?;
        if outcomes.len() != operations.len() {
            return Err(ReindexError::Internal(format!(
                "bulk write returned {} outcomes for {} operations",
                outcomes.len(),
                operations.len()
            )));
        }

        let mut pending: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.is_retryable())
            .map(|(index, _)| index)
            .collect();

        let mut attempt = 1;
        let mut delay = self.backoff;
        while !pending.is_empty() && attempt < self.attempts {
            warn!(
                rejected = pending.len(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Bulk write rejected operations, backing off before retry"
            );
            std::thread::sleep(delay.min(BACKOFF_MAX));
            delay = delay.saturating_mul(2);
            attempt += 1;

            let retry_ops: Vec<WriteOperation> =
                pending.iter().map(|&index| operations[index].clone()).collect();
            let retry_outcomes = self.client.bulk_write(&retry_ops, self.timeout)?;
            if retry_outcomes.len() != retry_ops.len() {
                return Err(ReindexError::Internal(format!(
                    "bulk retry returned {} outcomes for {} operations",
                    retry_outcomes.len(),
                    retry_ops.len()
                )));
            }

            let mut still_pending = Vec::new();
            for (&index, outcome) in pending.iter().zip(retry_outcomes) {
                if outcome.is_retryable() {
                    still_pending.push(index);
                }
                outcomes[index] = outcome;
            }
            pending = still_pending;
        }

        for index in pending {
            if let WriteOutcome::Retryable(detail) = &outcomes[index] {
                outcomes[index] = WriteOutcome::Permanent(format!(
                    "still rejected after {} attempts: {}",
                    self.attempts, detail
                ));
            }
        }

        debug!(operations = operations.len(), "Bulk write complete");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use bson::doc;

    fn op(id: &str) -> WriteOperation {
        WriteOperation {
            collection: "dest".to_string(),
            doc_type: None,
            id: id.to_string(),
            routing: None,
            source: doc! {"foo": "a"},
        }
    }

    #[test]
    fn transient_rejection_retried_to_success() {
        let store = MemoryStore::new();
        store.fail_writes("1", 2);
        let writer = BulkWriter::new(&store, Duration::from_secs(1), 5, Duration::from_millis(1));
        let outcomes = writer.submit(&[op("1"), op("2")]).unwrap();
        assert_eq!(outcomes[0], WriteOutcome::Created);
        assert_eq!(outcomes[1], WriteOutcome::Created);
        assert_eq!(store.visible_count("dest"), 2);
    }

    #[test]
    fn exhausted_retries_become_permanent() {
        let store = MemoryStore::new();
        store.fail_writes("1", 100);
        let writer = BulkWriter::new(&store, Duration::from_secs(1), 3, Duration::from_millis(1));
        let outcomes = writer.submit(&[op("1"), op("2")]).unwrap();
        assert!(matches!(outcomes[0], WriteOutcome::Permanent(_)));
        assert_eq!(outcomes[1], WriteOutcome::Created);
        // the rest of the batch landed
        assert_eq!(store.visible_count("dest"), 1);
    }

    #[test]
    fn conflicts_never_retried() {
        let store = MemoryStore::new();
        store.conflict_on("1");
        let writer = BulkWriter::new(&store, Duration::from_secs(1), 5, Duration::from_millis(1));
        let outcomes = writer.submit(&[op("1")]).unwrap();
        assert_eq!(outcomes, vec![WriteOutcome::VersionConflict]);
    }

    #[test]
    fn whole_request_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_bulk_requests(1);
        let writer = BulkWriter::new(&store, Duration::from_secs(1), 5, Duration::from_millis(1));
        let err = writer.submit(&[op("1")]).unwrap_err();
        assert!(matches!(err, ReindexError::Transport { .. }));
    }
}
