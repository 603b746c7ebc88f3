//! Notion API client.
//!
//! Covers the three endpoints table sync needs: database metadata, database query
//! and single page retrieval.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use tablesync_core::sync::{FreshnessToken, RemoteTableApi};
use tablesync_core::SyncError;

use crate::config::NotionConfig;
use crate::error::{NotionError, Result};
use crate::types::*;

const MAX_LOG_BODY_CHARS: usize = 512;
const NOTION_VERSION_HEADER: &str = "notion-version";

/// Client for the Notion REST API.
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: reqwest::Client,
    config: NotionConfig,
}

impl NotionClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[NotionClient] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[NotionClient] Response error ({}): {}", status, preview);
    }

    /// Create a new Notion client.
    pub fn new(config: NotionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    pub fn config(&self) -> &NotionConfig {
        &self.config
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| NotionError::auth("Invalid integration token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let version = HeaderValue::from_str(&self.config.notion_version)
            .map_err(|_| NotionError::invalid_request("Invalid Notion-Version value"))?;
        headers.insert(NOTION_VERSION_HEADER, version);

        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url, path)
    }

    /// Read the body of a response, turning non-2xx statuses into [`NotionError::Api`].
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<NotionErrorResponse>(&body) {
                return Err(NotionError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(NotionError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok(body)
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let body = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!("[NotionClient] Failed to deserialize response: {}", e);
            NotionError::Json(e)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Databases
    // ─────────────────────────────────────────────────────────────────────────

    /// Typed database metadata.
    ///
    /// GET /v1/databases/{id}
    pub async fn get_database(&self, database_id: &str) -> Result<Database> {
        let url = self.url(&format!("databases/{}", path_segment(database_id)?));
        debug!("[NotionClient] GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Raw body of one query page.
    ///
    /// POST /v1/databases/{id}/query with `{"start_cursor": ...}` when continuing.
    pub async fn query_database(
        &self,
        database_id: &str,
        filter: Option<&Value>,
        start_cursor: Option<&str>,
    ) -> Result<String> {
        let url = self.url(&format!("databases/{}/query", path_segment(database_id)?));
        debug!(
            "[NotionClient] POST {} (cursor: {})",
            url,
            start_cursor.unwrap_or("<none>")
        );

        let request = QueryRequest {
            filter,
            start_cursor,
        };
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;
        Self::read_body(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pages
    // ─────────────────────────────────────────────────────────────────────────

    /// Raw body of a single page.
    ///
    /// GET /v1/pages/{id}
    pub async fn get_page(&self, page_id: &str) -> Result<String> {
        let url = self.url(&format!("pages/{}", path_segment(page_id)?));
        debug!("[NotionClient] GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::read_body(response).await
    }
}

#[async_trait]
impl RemoteTableApi for NotionClient {
    async fn fetch_freshness_token(
        &self,
        database_id: &str,
    ) -> tablesync_core::Result<Option<FreshnessToken>> {
        let database = self.get_database(database_id).await?;
        Ok(database.last_edited_time.map(FreshnessToken::new))
    }

    async fn query_page(
        &self,
        database_id: &str,
        filter: Option<&Value>,
        cursor: Option<&str>,
    ) -> tablesync_core::Result<String> {
        self.query_database(database_id, filter, cursor)
            .await
            .map_err(SyncError::from)
    }

    async fn fetch_page(&self, page_id: &str) -> tablesync_core::Result<String> {
        self.get_page(page_id).await.map_err(SyncError::from)
    }
}

/// Validate an object id for use as a URL path segment.
fn path_segment(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(NotionError::invalid_request("Object id is empty"));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(NotionError::invalid_request(format!(
            "Object id contains invalid characters: {}",
            id
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use std::time::Duration;
    use tablesync_core::sync::{
        deserializer_fn, CancelSignal, DataSource, LoadOrigin, SyncOptions, TableSynchronizer,
    };
    use tablesync_core::{PersistentSnapshotStore, TransformError, TypedCache};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn ok(body: Value) -> MockResponse {
        MockResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn api_error_body(status: u16, code: &str, message: &str) -> String {
        format!(
            r#"{{"object":"error","status":{},"code":"{}","message":"{}"}}"#,
            status, code, message
        )
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let path = parts.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            path,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    /// Serves scripted responses in request order; an exhausted script answers 500.
    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(request);

                let response = scripted.lock().await.pop_front().unwrap_or(MockResponse {
                    status: 500,
                    body: api_error_body(500, "internal_server_error", "unexpected request"),
                });
                let _ = write_http_response(&mut stream, response.status, &response.body).await;
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn client_for(base_url: &str) -> NotionClient {
        NotionClient::new(NotionConfig::new("secret_test").with_base_url(base_url))
    }

    fn page(id: &str, name: &str) -> Value {
        json!({
            "object": "page",
            "id": id,
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": name }] }
            }
        })
    }

    #[tokio::test]
    async fn query_sends_notion_headers_and_cursor_body() {
        let (base_url, captured, handle) = start_mock_server(vec![
            ok(json!({ "object": "list", "results": [], "has_more": false, "next_cursor": null })),
        ])
        .await;
        let client = client_for(&base_url);

        client
            .query_database("db-1", None, Some("c1"))
            .await
            .expect("query");

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/v1/databases/db-1/query");
        assert_eq!(request.headers.get("notion-version").map(String::as_str), Some("2022-06-28"));
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer secret_test")
        );
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body, json!({ "start_cursor": "c1" }));
        handle.abort();
    }

    #[tokio::test]
    async fn first_query_sends_filter_without_cursor() {
        let (base_url, captured, handle) = start_mock_server(vec![
            ok(json!({ "results": [], "has_more": false })),
            ok(json!({ "results": [], "has_more": false })),
        ])
        .await;
        let client = client_for(&base_url);
        let filter = json!({ "property": "Active", "checkbox": { "equals": true } });

        client.query_database("db-1", None, None).await.unwrap();
        client
            .query_database("db-1", Some(&filter), None)
            .await
            .unwrap();

        let requests = captured.lock().await;
        let first: Value = serde_json::from_str(&requests[0].body).unwrap();
        let second: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(first, json!({}));
        assert_eq!(second, json!({ "filter": filter }));
        handle.abort();
    }

    #[tokio::test]
    async fn freshness_token_comes_from_database_metadata() {
        let (base_url, captured, handle) = start_mock_server(vec![
            ok(json!({
                "object": "database",
                "id": "db-1",
                "last_edited_time": "2024-05-01T10:00:00.000Z"
            })),
            ok(json!({ "object": "database", "id": "db-1" })),
            MockResponse {
                status: 200,
                body: "not json".to_string(),
            },
        ])
        .await;
        let client = client_for(&base_url);

        let token = client.fetch_freshness_token("db-1").await.unwrap();
        assert_eq!(token, Some(FreshnessToken::new("2024-05-01T10:00:00.000Z")));

        let missing = client.fetch_freshness_token("db-1").await.unwrap();
        assert_eq!(missing, None);

        let err = client.fetch_freshness_token("db-1").await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/v1/databases/db-1");
        handle.abort();
    }

    #[tokio::test]
    async fn api_error_body_is_mapped_to_status_and_code() {
        let (base_url, _captured, handle) = start_mock_server(vec![MockResponse {
            status: 404,
            body: api_error_body(404, "object_not_found", "Could not find page"),
        }])
        .await;
        let client = client_for(&base_url);

        let err = client.get_page("p-1").await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("object_not_found: Could not find page"));
        handle.abort();
    }

    #[tokio::test]
    async fn trait_errors_keep_the_http_status() {
        let (base_url, captured, handle) = start_mock_server(vec![MockResponse {
            status: 401,
            body: api_error_body(401, "unauthorized", "API token is invalid."),
        }])
        .await;
        let client = client_for(&base_url);

        let err = client.fetch_page("p-1").await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(captured.lock().await[0].path, "/v1/pages/p-1");
        handle.abort();
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected_before_sending() {
        let client = client_for("http://127.0.0.1:9");
        for id in ["", "a/b", "db?x=1"] {
            let err = client.get_page(id).await.unwrap_err();
            assert!(matches!(err, NotionError::InvalidRequest(_)), "id {:?}", id);
        }
    }

    #[tokio::test]
    async fn synchronizer_loads_paginated_database_over_http() {
        let (base_url, captured, handle) = start_mock_server(vec![
            ok(json!({ "object": "database", "id": "db-1", "last_edited_time": "t1" })),
            ok(json!({
                "object": "list",
                "results": [page("a", "knight"), page("b", "archer")],
                "has_more": true,
                "next_cursor": "c1"
            })),
            MockResponse {
                status: 502,
                body: "bad gateway".to_string(),
            },
            ok(json!({
                "object": "list",
                "results": [page("c", "mage")],
                "has_more": false,
                "next_cursor": null
            })),
        ])
        .await;

        let synchronizer = TableSynchronizer::new(
            Arc::new(client_for(&base_url)),
            Arc::new(TypedCache::new()),
            PersistentSnapshotStore::in_memory(),
        )
        .with_options(SyncOptions::default().with_retry(5, Duration::from_millis(10)));
        let names = deserializer_fn(|raw| {
            Ok::<_, TransformError>(tablesync_core::values::get_string(
                raw.properties(),
                "Name",
                "",
            ))
        });

        let load = synchronizer
            .sync(&DataSource::new("db-1"), &names, &CancelSignal::new())
            .await
            .expect("sync");

        let loaded: Vec<&str> = load.records.iter().map(|n| n.as_str()).collect();
        assert_eq!(loaded, vec!["knight", "archer", "mage"]);
        assert_eq!(load.origin, LoadOrigin::Remote);

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 4);
        let retried: Value = serde_json::from_str(&requests[3].body).unwrap();
        assert_eq!(retried, json!({ "start_cursor": "c1" }));
        assert_eq!(
            synchronizer
                .snapshots()
                .load_freshness_token("db-1")
                .unwrap(),
            Some(FreshnessToken::new("t1"))
        );
        handle.abort();
    }
}
