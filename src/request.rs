//! Reindex job description.
//!
//! A [`ReindexRequest`] is validated once, at construction, and is pure data
//! afterwards. Construction either returns a fully valid request or a
//! [`ReindexError::Validation`] naming the offending field; no partially
//! valid value ever escapes.

use crate::error::{ReindexError, Result};
use crate::{DEFAULT_BATCH_SIZE, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT};
use bson::Document;
use std::time::Duration;

/// Whether to force destination visibility when the job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Leave visibility to the destination's own refresh cycle.
    Unset,
    /// Force a refresh of the destination on completion.
    Force,
    /// Explicitly suppress any refresh.
    Suppress,
}

impl Default for RefreshPolicy {
    fn default() -> RefreshPolicy {
        RefreshPolicy::Unset
    }
}

impl From<Option<bool>> for RefreshPolicy {
    fn from(value: Option<bool>) -> RefreshPolicy {
        match value {
            None => RefreshPolicy::Unset,
            Some(true) => RefreshPolicy::Force,
            Some(false) => RefreshPolicy::Suppress,
        }
    }
}

/// One validated copy job: where to read, where to write, and how.
#[derive(Debug, Clone)]
pub struct ReindexRequest {
    sources: Vec<String>,
    source_types: Option<Vec<String>>,
    dest: String,
    dest_type: Option<String>,
    filter: Document,
    size_cap: Option<u64>,
    batch_size: usize,
    refresh: RefreshPolicy,
    timeout: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl ReindexRequest {
    /// Build a request. `filter` defaults to match-all, `batch_size` to 10;
    /// the size cap bounds documents written and is a hard ceiling
    /// independent of how many documents match.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<String>,
        source_types: Option<Vec<String>>,
        dest: String,
        dest_type: Option<String>,
        filter: Option<Document>,
        size_cap: Option<u64>,
        batch_size: Option<usize>,
        refresh: RefreshPolicy,
    ) -> Result<ReindexRequest> {
        if sources.is_empty() {
            return Err(ReindexError::validation(
                "sources",
                "at least one source collection is required",
            ));
        }
        if sources.iter().any(|name| name.is_empty()) {
            return Err(ReindexError::validation(
                "sources",
                "source collection names must be non-empty",
            ));
        }
        if dest.is_empty() {
            return Err(ReindexError::validation(
                "dest",
                "destination collection name must be non-empty",
            ));
        }
        if let Some(types) = &source_types {
            if types.is_empty() || types.iter().any(|t| t.is_empty()) {
                return Err(ReindexError::validation(
                    "source_types",
                    "type selectors must be non-empty when given",
                ));
            }
        }
        if size_cap == Some(0) {
            return Err(ReindexError::validation(
                "size_cap",
                "size cap must be strictly positive",
            ));
        }
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ReindexError::validation(
                "batch_size",
                "batch size must be strictly positive",
            ));
        }
        Ok(ReindexRequest {
            sources,
            source_types,
            dest,
            dest_type,
            filter: filter.unwrap_or_default(),
            size_cap,
            batch_size,
            refresh,
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    /// Replace the per-round-trip timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<ReindexRequest> {
        if timeout.is_zero() {
            return Err(ReindexError::validation(
                "timeout",
                "round-trip timeout must be non-zero",
            ));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Replace the bulk retry tuning: `attempts` bounds total submissions of
    /// one operation, `backoff` is the initial delay before the first retry.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Result<ReindexRequest> {
        if attempts == 0 {
            return Err(ReindexError::validation(
                "retry_attempts",
                "at least one attempt is required",
            ));
        }
        if backoff.is_zero() {
            return Err(ReindexError::validation(
                "retry_backoff",
                "retry backoff must be non-zero",
            ));
        }
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        Ok(self)
    }

    /// Source collections to read.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Source document-type selectors, when restricted.
    pub fn source_types(&self) -> Option<&[String]> {
        self.source_types.as_deref()
    }

    /// Destination collection.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Destination document type, when typed.
    pub fn dest_type(&self) -> Option<&str> {
        self.dest_type.as_deref()
    }

    /// Opaque filter handed to the store; empty means match-all.
    pub fn filter(&self) -> &Document {
        &self.filter
    }

    /// Hard ceiling on documents written, when set.
    pub fn size_cap(&self) -> Option<u64> {
        self.size_cap
    }

    /// Documents per scroll round trip (and per bulk write).
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Destination visibility policy on completion.
    pub fn refresh(&self) -> RefreshPolicy {
        self.refresh
    }

    /// Per-round-trip timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Total submission bound per operation in a bulk write.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Initial delay before the first bulk retry.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn minimal(sources: Vec<String>, dest: &str) -> Result<ReindexRequest> {
        ReindexRequest::new(
            sources,
            None,
            dest.to_string(),
            None,
            None,
            None,
            None,
            RefreshPolicy::Unset,
        )
    }

    #[test]
    fn defaults_applied() {
        let request = minimal(vec!["src".to_string()], "dest").unwrap();
        assert_eq!(request.batch_size(), DEFAULT_BATCH_SIZE);
        assert!(request.filter().is_empty());
        assert_eq!(request.size_cap(), None);
        assert_eq!(request.refresh(), RefreshPolicy::Unset);
        assert_eq!(request.retry_attempts(), DEFAULT_RETRY_ATTEMPTS);
    }

    #[test]
    fn rejects_empty_sources() {
        let err = minimal(vec![], "dest").unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "sources", .. }));
        let err = minimal(vec!["".to_string()], "dest").unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "sources", .. }));
    }

    #[test]
    fn rejects_empty_dest() {
        let err = minimal(vec!["src".to_string()], "").unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "dest", .. }));
    }

    #[test]
    fn rejects_zero_cap_and_batch() {
        let err = ReindexRequest::new(
            vec!["src".to_string()],
            None,
            "dest".to_string(),
            None,
            None,
            Some(0),
            None,
            RefreshPolicy::Unset,
        )
        .unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "size_cap", .. }));

        let err = ReindexRequest::new(
            vec!["src".to_string()],
            None,
            "dest".to_string(),
            None,
            None,
            None,
            Some(0),
            RefreshPolicy::Unset,
        )
        .unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "batch_size", .. }));
    }

    #[test]
    fn rejects_empty_type_selectors() {
        let err = ReindexRequest::new(
            vec!["src".to_string()],
            Some(vec![]),
            "dest".to_string(),
            None,
            None,
            None,
            None,
            RefreshPolicy::Unset,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReindexError::Validation { field: "source_types", .. }
        ));
    }

    #[test]
    fn retry_tuning_validated() {
        let request = minimal(vec!["src".to_string()], "dest").unwrap();
        let err = request.clone().with_retry(0, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(
            err,
            ReindexError::Validation { field: "retry_attempts", .. }
        ));
        let err = request.clone().with_retry(3, Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            ReindexError::Validation { field: "retry_backoff", .. }
        ));
        let tuned = request.with_retry(3, Duration::from_millis(1)).unwrap();
        assert_eq!(tuned.retry_attempts(), 3);
    }

    #[test]
    fn filter_kept_verbatim() {
        let request = ReindexRequest::new(
            vec!["src".to_string()],
            None,
            "dest".to_string(),
            None,
            Some(doc! {"foo": "a"}),
            None,
            None,
            RefreshPolicy::Force,
        )
        .unwrap();
        assert_eq!(request.filter(), &doc! {"foo": "a"});
        assert_eq!(request.refresh(), RefreshPolicy::Force);
    }

    #[test]
    fn refresh_policy_from_option() {
        assert_eq!(RefreshPolicy::from(None), RefreshPolicy::Unset);
        assert_eq!(RefreshPolicy::from(Some(true)), RefreshPolicy::Force);
        assert_eq!(RefreshPolicy::from(Some(false)), RefreshPolicy::Suppress);
    }
}
