//! Remote paginated database API seam.

use async_trait::async_trait;
use serde_json::Value;

use super::model::FreshnessToken;
use crate::errors::{Result, SyncError};

/// Asynchronous access to a remote paginated database API.
///
/// Implementations return [`SyncError::Network`] for transport failures and non-2xx
/// responses; body validation is left to the caller.
#[async_trait]
pub trait RemoteTableApi: Send + Sync {
    /// Current freshness token of a database (its last-modification marker).
    ///
    /// GET /v1/databases/{id} -> `last_edited_time`
    async fn fetch_freshness_token(&self, database_id: &str) -> Result<Option<FreshnessToken>>;

    /// Raw body of one query page, continuing from `cursor` when given.
    ///
    /// POST /v1/databases/{id}/query
    async fn query_page(
        &self,
        database_id: &str,
        filter: Option<&Value>,
        cursor: Option<&str>,
    ) -> Result<String>;

    /// Raw body of a single page object.
    ///
    /// GET /v1/pages/{id}
    async fn fetch_page(&self, page_id: &str) -> Result<String>;
}

/// Parsed query page envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub results: Vec<Value>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Outcome of parsing one query page body.
#[derive(Debug)]
pub struct ParsedPage {
    pub page: QueryPage,
    /// Structural problem found in the body. Whatever could be read is still in `page`.
    pub error: Option<SyncError>,
    /// Whether pagination can carry on past this page.
    pub can_continue: bool,
}

impl QueryPage {
    /// Parse a query response body leniently.
    ///
    /// A body that is not a JSON object yields no records and stops pagination. A
    /// missing `results` array is reported, but pagination continues when
    /// `has_more` and `next_cursor` are still readable.
    pub fn parse(body: &str) -> ParsedPage {
        let value = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Self::unreadable("response is not a JSON object"),
            Err(err) => return Self::unreadable(&format!("invalid JSON: {}", err)),
        };

        let mut error = None;
        let results = match value.get("results") {
            Some(Value::Array(results)) => results.clone(),
            _ => {
                error = Some(SyncError::malformed("missing 'results' array"));
                Vec::new()
            }
        };

        let has_more = value
            .get("has_more")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let next_cursor = value
            .get("next_cursor")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut can_continue = true;
        if has_more && next_cursor.is_none() {
            error.get_or_insert_with(|| {
                SyncError::malformed("'has_more' is set but 'next_cursor' is missing")
            });
            can_continue = false;
        }

        ParsedPage {
            page: QueryPage {
                results,
                has_more,
                next_cursor: if has_more { next_cursor } else { None },
            },
            error,
            can_continue,
        }
    }

    fn unreadable(reason: &str) -> ParsedPage {
        ParsedPage {
            page: QueryPage {
                results: Vec::new(),
                has_more: false,
                next_cursor: None,
            },
            error: Some(SyncError::malformed(reason)),
            can_continue: false,
        }
    }

    /// Cursor for the next request, if pagination continues.
    pub fn continuation(&self) -> Option<&str> {
        if self.has_more {
            self.next_cursor.as_deref()
        } else {
            None
        }
    }
}
