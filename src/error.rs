use std::result::Result as StdResult;
use thiserror::Error;

/// Errors produced by the reindex pipeline.
///
/// Per-document write failures are not errors: they travel as
/// [`WriteOutcome`](crate::WriteOutcome) values and end up in the response's
/// failure list. This enum covers the fatal paths only.
#[derive(Error, Debug)]
pub enum ReindexError {
    /// A request (or an internally produced batch) failed validation.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The scroll cursor was released or expired server-side; the read
    /// position cannot be reconstructed, so the job aborts.
    #[error("scroll cursor expired or released: {0}")]
    ScrollExpired(String),
    /// A whole request to the store failed (connection loss, timeout, ...),
    /// as opposed to a per-document rejection inside a bulk response.
    #[error("transport failure during {op}: {detail}")]
    Transport {
        /// Which round trip failed.
        op: &'static str,
        /// Store-reported detail.
        detail: String,
    },
    /// Accounting or component-contract violation; indicates a defect, not
    /// an operational condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReindexError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        ReindexError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(op: &'static str, detail: impl Into<String>) -> Self {
        ReindexError::Transport {
            op,
            detail: detail.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = StdResult<T, ReindexError>;
