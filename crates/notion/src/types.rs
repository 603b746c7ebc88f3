//! Notion API wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body returned by the Notion API for non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct NotionErrorResponse {
    #[serde(default)]
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
}

/// Database metadata (`GET /v1/databases/{id}`). Only the fields used here are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub id: String,
    #[serde(default)]
    pub last_edited_time: Option<String>,
}

/// Body of `POST /v1/databases/{id}/query`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_omits_absent_fields() {
        let empty = serde_json::to_value(QueryRequest::default()).unwrap();
        assert_eq!(empty, json!({}));

        let next = serde_json::to_value(QueryRequest {
            filter: None,
            start_cursor: Some("c1"),
        })
        .unwrap();
        assert_eq!(next, json!({ "start_cursor": "c1" }));
    }

    #[test]
    fn database_metadata_keeps_last_edited_time() {
        let db: Database = serde_json::from_value(json!({
            "object": "database",
            "id": "db-1",
            "last_edited_time": "2024-05-01T10:00:00.000Z",
            "title": [{ "plain_text": "Units" }]
        }))
        .unwrap();
        assert_eq!(db.id, "db-1");
        assert_eq!(db.last_edited_time.as_deref(), Some("2024-05-01T10:00:00.000Z"));

        let untouched: Database = serde_json::from_value(json!({ "id": "db-2" })).unwrap();
        assert!(untouched.last_edited_time.is_none());
    }
}
