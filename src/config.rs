//! Reindex job configuration, expressed in toml.
//!
//! Basic configuration file example:
//! ```toml
//! [[job]]
//! sources = ["tweets_v1"]
//! dest = "tweets_v2"
//! batch_size = 500
//! refresh = true
//!
//! [job.filter]
//! lang = "en"
//!
//! [[job]]
//! sources = ["users_v1", "users_legacy"]
//! dest = "users_v2"
//! size_cap = 10000
//! ```
use crate::error::{ReindexError, Result};
use crate::request::{RefreshPolicy, ReindexRequest};
use serde::Deserialize;
use std::time::Duration;

/// A batch of reindex jobs to run, as read from a toml file.
#[derive(Deserialize, Debug)]
pub struct ReindexConfig {
    #[serde(rename = "job")]
    jobs: Vec<JobConf>,
}

impl ReindexConfig {
    /// The configured jobs, in file order.
    pub fn jobs(&self) -> &[JobConf] {
        &self.jobs
    }
}

/// One job entry. Converts into a validated [`ReindexRequest`].
#[derive(Deserialize, Debug)]
pub struct JobConf {
    /// source collections to copy from.
    sources: Vec<String>,
    /// restrict reading to these document types.
    source_types: Option<Vec<String>>,
    /// destination collection.
    dest: String,
    /// destination document type.
    dest_type: Option<String>,
    /// opaque filter passed to the store; omit to match everything.
    filter: Option<toml::value::Table>,
    /// hard ceiling on documents written.
    size_cap: Option<u64>,
    /// documents per round trip.
    batch_size: Option<usize>,
    /// force (true) or suppress (false) destination refresh on completion.
    refresh: Option<bool>,
    /// per-round-trip timeout in seconds.
    timeout_secs: Option<u64>,
}

impl JobConf {
    /// Source collections named by this entry.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Destination collection named by this entry.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Validate into a [`ReindexRequest`].
    pub fn to_request(&self) -> Result<ReindexRequest> {
        let filter = match &self.filter {
            Some(table) => Some(
                bson::to_document(table)
                    .map_err(|e| ReindexError::validation("filter", e.to_string()))?,
            ),
            None => None,
        };
        let request = ReindexRequest::new(
            self.sources.clone(),
            self.source_types.clone(),
            self.dest.clone(),
            self.dest_type.clone(),
            filter,
            self.size_cap,
            self.batch_size,
            RefreshPolicy::from(self.refresh),
        )?;
        match self.timeout_secs {
            Some(secs) => request.with_timeout(Duration::from_secs(secs)),
            None => Ok(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_full_job() {
        let config: ReindexConfig = toml::from_str(
            r#"
            [[job]]
            sources = ["a", "b"]
            dest = "dest"
            dest_type = "all"
            size_cap = 100
            batch_size = 5
            refresh = true
            timeout_secs = 10

            [job.filter]
            foo = "a"
            "#,
        )
        .unwrap();
        assert_eq!(config.jobs().len(), 1);
        let request = config.jobs()[0].to_request().unwrap();
        assert_eq!(request.sources(), ["a".to_string(), "b".to_string()]);
        assert_eq!(request.dest(), "dest");
        assert_eq!(request.dest_type(), Some("all"));
        assert_eq!(request.filter(), &doc! {"foo": "a"});
        assert_eq!(request.size_cap(), Some(100));
        assert_eq!(request.batch_size(), 5);
        assert_eq!(request.refresh(), RefreshPolicy::Force);
        assert_eq!(request.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn minimal_job_uses_defaults() {
        let config: ReindexConfig = toml::from_str(
            r#"
            [[job]]
            sources = ["src"]
            dest = "dest"
            "#,
        )
        .unwrap();
        let request = config.jobs()[0].to_request().unwrap();
        assert!(request.filter().is_empty());
        assert_eq!(request.refresh(), RefreshPolicy::Unset);
    }

    #[test]
    fn invalid_job_is_rejected() {
        let config: ReindexConfig = toml::from_str(
            r#"
            [[job]]
            sources = []
            dest = "dest"
            "#,
        )
        .unwrap();
        let err = config.jobs()[0].to_request().unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "sources", .. }));
    }
}
