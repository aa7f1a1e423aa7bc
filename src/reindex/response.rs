//! Result accounting.

use crate::error::{ReindexError, Result};
use crate::request::ReindexRequest;
use crate::store::{WriteOperation, WriteOutcome};
use std::time::Duration;

/// One document the destination refused for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Id of the rejected document.
    pub id: String,
    /// Store-reported detail.
    pub detail: String,
}

/// Final report of one reindex job.
#[derive(Debug, Clone)]
pub struct ReindexResponse {
    /// Wall-clock time the job ran.
    pub took: Duration,
    /// Documents created in the destination.
    pub created: u64,
    /// Documents overwritten in the destination.
    pub updated: u64,
    /// Documents deleted; always zero for a copy, carried for response
    /// parity with the deleting variants of the bulk pipeline.
    pub deleted: u64,
    /// Writes that changed nothing.
    pub noop: u64,
    /// Writes rejected by concurrent modification; never retried, never in
    /// `failures`.
    pub version_conflicts: u64,
    /// Bulk batches executed.
    pub batches: u64,
    /// Permanent per-document failures, in write order.
    pub failures: Vec<WriteFailure>,
    /// Carried for response parity; a round-trip timeout aborts the job
    /// instead of producing a partial response, so this stays `false`.
    pub timed_out: bool,
}

impl ReindexResponse {
    /// Documents the destination accepted (created, updated or no-op).
    pub fn total_written(&self) -> u64 {
        self.created + self.updated + self.noop
    }
}

/// Accumulates outcome counts across batches; the driver is the only user.
#[derive(Debug, Default)]
pub(crate) struct Totals {
    created: u64,
    updated: u64,
    noop: u64,
    version_conflicts: u64,
    batches: u64,
    failures: Vec<WriteFailure>,
}

impl Totals {
    /// Fold one submitted batch into the running totals. `operations` and
    /// `outcomes` correspond index by index.
    pub(crate) fn record_batch(&mut self, operations: &[WriteOperation], outcomes: &[WriteOutcome]) {
        self.batches += 1;
        for (op, outcome) in operations.iter().zip(outcomes) {
            match outcome {
                WriteOutcome::Created => self.created += 1,
                WriteOutcome::Updated => self.updated += 1,
                WriteOutcome::Noop => self.noop += 1,
                WriteOutcome::VersionConflict => self.version_conflicts += 1,
                WriteOutcome::Permanent(detail) | WriteOutcome::Retryable(detail) => {
                    // a Retryable outcome reaching accounting means the
                    // writer's bound was spent; it counts as permanent
                    self.failures.push(WriteFailure {
                        id: op.id.clone(),
                        detail: detail.clone(),
                    });
                }
            }
        }
    }

    /// Build the final response, checking the accounting against what the
    /// driver read. Called exactly once; a violation means a defect in the
    /// pipeline, not in the request.
    pub(crate) fn finalize(
        self,
        took: Duration,
        hits_read: u64,
        request: &ReindexRequest,
    ) -> Result<ReindexResponse> {
        let accounted =
            self.created + self.updated + self.noop + self.version_conflicts + self.failures.len() as u64;
        if accounted > hits_read {
            return Err(ReindexError::Internal(format!(
                "accounted for {} outcomes but read only {} documents",
                accounted, hits_read
            )));
        }
        if let Some(cap) = request.size_cap() {
            if hits_read > cap {
                return Err(ReindexError::Internal(format!(
                    "read {} documents past a cap of {}",
                    hits_read, cap
                )));
            }
        }
        if (self.batches == 0) != (hits_read == 0) {
            return Err(ReindexError::Internal(format!(
                "{} batches executed for {} documents read",
                self.batches, hits_read
            )));
        }
        if hits_read > self.batches * request.batch_size() as u64 {
            return Err(ReindexError::Internal(format!(
                "read {} documents in {} batches of at most {}",
                hits_read,
                self.batches,
                request.batch_size()
            )));
        }
        Ok(ReindexResponse {
            took,
            created: self.created,
            updated: self.updated,
            deleted: 0,
            noop: self.noop,
            version_conflicts: self.version_conflicts,
            batches: self.batches,
            failures: self.failures,
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RefreshPolicy;
    use bson::doc;

    fn request(batch_size: usize, cap: Option<u64>) -> ReindexRequest {
        ReindexRequest::new(
            vec!["src".to_string()],
            None,
            "dest".to_string(),
            None,
            None,
            cap,
            Some(batch_size),
            RefreshPolicy::Unset,
        )
        .unwrap()
    }

    fn op(id: &str) -> WriteOperation {
        WriteOperation {
            collection: "dest".to_string(),
            doc_type: None,
            id: id.to_string(),
            routing: None,
            source: doc! {},
        }
    }

    #[test]
    fn counts_fold_by_outcome() {
        let mut totals = Totals::default();
        totals.record_batch(
            &[op("1"), op("2"), op("3"), op("4")],
            &[
                WriteOutcome::Created,
                WriteOutcome::Updated,
                WriteOutcome::VersionConflict,
                WriteOutcome::Permanent("boom".to_string()),
            ],
        );
        let response = totals
            .finalize(Duration::from_millis(5), 4, &request(4, None))
            .unwrap();
        assert_eq!(response.created, 1);
        assert_eq!(response.updated, 1);
        assert_eq!(response.version_conflicts, 1);
        assert_eq!(response.batches, 1);
        assert_eq!(
            response.failures,
            vec![WriteFailure {
                id: "4".to_string(),
                detail: "boom".to_string(),
            }]
        );
        assert_eq!(response.total_written(), 2);
        assert!(!response.timed_out);
    }

    #[test]
    fn finalize_rejects_overcounting() {
        let mut totals = Totals::default();
        totals.record_batch(&[op("1"), op("2")], &[WriteOutcome::Created, WriteOutcome::Created]);
        let err = totals
            .finalize(Duration::ZERO, 1, &request(2, None))
            .unwrap_err();
        assert!(matches!(err, ReindexError::Internal(_)));
    }

    #[test]
    fn finalize_rejects_cap_overrun() {
        let mut totals = Totals::default();
        totals.record_batch(&[op("1"), op("2")], &[WriteOutcome::Created, WriteOutcome::Created]);
        let err = totals
            .finalize(Duration::ZERO, 2, &request(2, Some(1)))
            .unwrap_err();
        assert!(matches!(err, ReindexError::Internal(_)));
    }

    #[test]
    fn finalize_rejects_batch_mismatch() {
        let totals = Totals::default();
        let err = totals
            .finalize(Duration::ZERO, 3, &request(2, None))
            .unwrap_err();
        assert!(matches!(err, ReindexError::Internal(_)));
    }

    #[test]
    fn empty_job_finalizes_clean() {
        let totals = Totals::default();
        let response = totals
            .finalize(Duration::ZERO, 0, &request(2, None))
            .unwrap();
        assert_eq!(response.batches, 0);
        assert_eq!(response.total_written(), 0);
        assert!(response.failures.is_empty());
    }
}
