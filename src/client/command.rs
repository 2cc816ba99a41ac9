/// Command reply interpretation
///
/// Every command travels the same path: build a document, execute it on the
/// connection, then turn the raw reply into either a result document or a
/// `ServerError`. The helpers here implement that second half.
use bson::{Bson, Document};

use crate::error::{PuenteError, PuenteResult};
use crate::wire::Reply;

/// Interpret a raw reply as a command outcome
///
/// A reply flagged as a query failure, an empty reply, or a document with
/// `ok != 1` all surface as errors; otherwise the single result document is
/// handed back.
pub(crate) fn check_reply(reply: Reply) -> PuenteResult<Document> {
    if reply.is_query_failure() {
        let (code, message) = reply
            .documents
            .first()
            .map(|document| {
                (
                    document.get_i32("code").unwrap_or(0),
                    document
                        .get_str("$err")
                        .unwrap_or("query failure")
                        .to_string(),
                )
            })
            .unwrap_or((0, "query failure".to_string()));
        return Err(PuenteError::server(code, message));
    }

    let document = reply
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| PuenteError::malformed("command reply contained no documents"))?;

    if !document_is_ok(&document) {
        let code = document.get_i32("code").unwrap_or(0);
        let message = document
            .get_str("errmsg")
            .unwrap_or("command failed")
            .to_string();
        return Err(PuenteError::server(code, message));
    }

    Ok(document)
}

/// Whether a reply document reports success
///
/// Servers have historically encoded `ok` as a double, an integer, or a
/// boolean.
pub(crate) fn document_is_ok(document: &Document) -> bool {
    match document.get("ok") {
        Some(Bson::Double(v)) => *v == 1.0,
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(Bson::Boolean(v)) => *v,
        _ => false,
    }
}

/// Extract the `n` field of a count reply as an unsigned count
///
/// Older servers report `n` as a double; newer ones may use an integer.
pub(crate) fn extract_count(document: &Document) -> PuenteResult<u64> {
    match document.get("n") {
        Some(Bson::Double(v)) if *v >= 0.0 => Ok(*v as u64),
        Some(Bson::Int32(v)) if *v >= 0 => Ok(*v as u64),
        Some(Bson::Int64(v)) if *v >= 0 => Ok(*v as u64),
        Some(other) => Err(PuenteError::malformed(format!(
            "count reply field n has unexpected value {:?}",
            other
        ))),
        None => Err(PuenteError::malformed("count reply missing field n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::REPLY_QUERY_FAILURE;
    use bson::doc;

    fn reply_with(documents: Vec<Document>, flags: i32) -> Reply {
        Reply {
            response_to: 1,
            flags,
            cursor_id: 0,
            starting_from: 0,
            documents,
        }
    }

    #[test]
    fn test_check_reply_success() {
        let reply = reply_with(vec![doc! { "n": 5.0, "ok": 1.0 }], 0);
        let document = check_reply(reply).unwrap();
        assert_eq!(extract_count(&document).unwrap(), 5);
    }

    #[test]
    fn test_check_reply_server_error() {
        let reply = reply_with(
            vec![doc! { "ok": 0.0, "code": 59, "errmsg": "no such command" }],
            0,
        );
        match check_reply(reply) {
            Err(PuenteError::ServerError { code, message }) => {
                assert_eq!(code, 59);
                assert_eq!(message, "no such command");
            }
            other => panic!("expected ServerError, got {:?}", other),
        }
    }

    #[test]
    fn test_check_reply_query_failure_flag() {
        let reply = reply_with(
            vec![doc! { "$err": "exhausted memory", "code": 2 }],
            REPLY_QUERY_FAILURE,
        );
        match check_reply(reply) {
            Err(PuenteError::ServerError { code, message }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "exhausted memory");
            }
            other => panic!("expected ServerError, got {:?}", other),
        }
    }

    #[test]
    fn test_check_reply_empty_is_malformed() {
        let reply = reply_with(vec![], 0);
        assert!(matches!(
            check_reply(reply),
            Err(PuenteError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_document_is_ok_accepts_numeric_variants() {
        assert!(document_is_ok(&doc! { "ok": 1.0 }));
        assert!(document_is_ok(&doc! { "ok": 1_i32 }));
        assert!(document_is_ok(&doc! { "ok": 1_i64 }));
        assert!(document_is_ok(&doc! { "ok": true }));
        assert!(!document_is_ok(&doc! { "ok": 0.0 }));
        assert!(!document_is_ok(&doc! {}));
    }

    #[test]
    fn test_extract_count_variants() {
        assert_eq!(extract_count(&doc! { "n": 0.0 }).unwrap(), 0);
        assert_eq!(extract_count(&doc! { "n": 12_i32 }).unwrap(), 12);
        assert_eq!(extract_count(&doc! { "n": 12_i64 }).unwrap(), 12);
        assert!(extract_count(&doc! { "n": "twelve" }).is_err());
        assert!(extract_count(&doc! {}).is_err());
        assert!(extract_count(&doc! { "n": -1 }).is_err());
    }
}
