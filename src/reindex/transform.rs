//! Hit to write-operation mapping.

use crate::error::{ReindexError, Result};
use crate::request::ReindexRequest;
use crate::store::{Hit, WriteOperation};

/// Map one batch of hits onto destination write operations, in order.
///
/// Pure: the only failure mode is a malformed hit (empty id), which should
/// not occur with a well-behaved cursor and is fatal when it does.
pub(crate) fn write_ops(request: &ReindexRequest, hits: Vec<Hit>) -> Result<Vec<WriteOperation>> {
    hits.into_iter()
        .map(|hit| {
            if hit.id.is_empty() {
                return Err(ReindexError::validation(
                    "hit.id",
                    "scroll batch contained a document without an id",
                ));
            }
            Ok(WriteOperation {
                collection: request.dest().to_string(),
                doc_type: request.dest_type().map(str::to_string),
                id: hit.id,
                routing: hit.routing,
                source: hit.source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RefreshPolicy;
    use bson::doc;

    fn request() -> ReindexRequest {
        ReindexRequest::new(
            vec!["src".to_string()],
            None,
            "dest".to_string(),
            Some("all".to_string()),
            None,
            None,
            None,
            RefreshPolicy::Unset,
        )
        .unwrap()
    }

    #[test]
    fn maps_hits_in_order() {
        let hits = vec![
            Hit {
                id: "1".to_string(),
                routing: Some("r1".to_string()),
                source: doc! {"foo": "a"},
            },
            Hit {
                id: "2".to_string(),
                routing: None,
                source: doc! {"foo": "b"},
            },
        ];
        let ops = write_ops(&request(), hits).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].collection, "dest");
        assert_eq!(ops[0].doc_type.as_deref(), Some("all"));
        assert_eq!(ops[0].id, "1");
        assert_eq!(ops[0].routing.as_deref(), Some("r1"));
        assert_eq!(ops[0].source, doc! {"foo": "a"});
        assert_eq!(ops[1].id, "2");
    }

    #[test]
    fn empty_id_is_fatal() {
        let hits = vec![Hit {
            id: String::new(),
            routing: None,
            source: doc! {},
        }];
        let err = write_ops(&request(), hits).unwrap_err();
        assert!(matches!(err, ReindexError::Validation { field: "hit.id", .. }));
    }
}
