//! Per-request outcome and aggregated result set models.
//!
//! A [`RequestResult`] is created once per dispatched (or rejected) request and
//! never mutated afterwards. A [`ResultSet`] holds the results in dispatch order
//! plus summary counts computed as a final reduction.

use super::request::{HttpMethod, PreparedRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Returns `true` when a received status counts as success (`[200, 400)`).
pub fn is_success_status(status_code: u16) -> bool {
    (200..400).contains(&status_code)
}

/// Outcome of replaying a single request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestResult {
    /// Correlation id sent with the request (empty when never materialized).
    pub request_id: String,

    /// Request name from the collection.
    pub name: String,

    /// Folder path of the request.
    pub folder: String,

    /// Method that was (or would have been) sent.
    pub method: Option<HttpMethod>,

    /// Absolute URL that was sent.
    pub url: String,

    /// Request headers as sent.
    pub request_headers: Vec<(String, String)>,

    /// Request body snapshot, rendered as text.
    pub request_body: Option<String>,

    /// Received status code, `None` when no response arrived.
    pub status_code: Option<u16>,

    /// Wall time of the final attempt in milliseconds.
    pub elapsed_ms: u64,

    /// Response headers in received order.
    pub response_headers: Vec<(String, String)>,

    /// Response body decoded lossily as UTF-8 and trimmed.
    pub response_body: String,

    /// Response body size in bytes.
    pub response_size: usize,

    /// `true` iff a response was received with status in `[200, 400)`.
    pub success: bool,

    /// Last error text for non-success outcomes without a response.
    pub error: Option<String>,

    /// Number of transport attempts made.
    pub attempts: u32,

    /// Non-fatal notes (credential unavailable, unresolved variables).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl RequestResult {
    fn snapshot(request: &PreparedRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            name: request.name.clone(),
            folder: request.folder.clone(),
            method: Some(request.method),
            url: request.url.clone(),
            request_headers: request.headers.clone(),
            request_body: request.body.to_text(),
            status_code: None,
            elapsed_ms: 0,
            response_headers: Vec::new(),
            response_body: String::new(),
            response_size: 0,
            success: false,
            error: None,
            attempts: 0,
            annotations: request.annotations.clone(),
        }
    }

    /// Builds a result for a request that received an HTTP response.
    pub fn received(
        request: &PreparedRequest,
        status_code: u16,
        headers: Vec<(String, String)>,
        body: &[u8],
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        let mut result = Self::snapshot(request);
        result.status_code = Some(status_code);
        result.elapsed_ms = elapsed.as_millis() as u64;
        result.response_headers = headers;
        result.response_body = String::from_utf8_lossy(body).trim().to_string();
        result.response_size = body.len();
        result.success = is_success_status(status_code);
        result.attempts = attempts;
        result
    }

    /// Builds a result for a request whose transport attempts all failed.
    pub fn transport_failed(
        request: &PreparedRequest,
        error: impl Into<String>,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        let mut result = Self::snapshot(request);
        result.error = Some(error.into());
        result.elapsed_ms = elapsed.as_millis() as u64;
        result.attempts = attempts;
        result
    }

    /// Builds a result for a request that could not be materialized.
    ///
    /// Nothing was sent; only the identifying fields are known.
    pub fn rejected(name: &str, folder: &str, error: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            name: name.to_string(),
            folder: folder.to_string(),
            method: None,
            url: String::new(),
            request_headers: Vec::new(),
            request_body: None,
            status_code: None,
            elapsed_ms: 0,
            response_headers: Vec::new(),
            response_body: String::new(),
            response_size: 0,
            success: false,
            error: Some(error.into()),
            attempts: 0,
            annotations: Vec::new(),
        }
    }

    /// Gets a response header value (case-insensitive).
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered results of one replay run plus derived counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResultSet {
    /// Results in dispatch order, mirroring collection traversal order.
    pub requests: Vec<RequestResult>,

    /// Number of results.
    pub total: usize,

    /// Number of successful results.
    pub succeeded: usize,

    /// Number of failed results.
    pub failed: usize,

    /// `true` when the run was aborted before every request was attempted.
    #[serde(default)]
    pub aborted: bool,
}

/// Run-level metadata written next to the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// Collection name.
    pub collection: String,

    /// Selected proxy as `host:port`.
    pub proxy: String,

    /// RFC 3339 timestamp of the run start.
    pub timestamp: String,

    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
}

impl RunMetadata {
    /// Builds metadata whose counts mirror the given result set.
    pub fn for_results(
        collection: impl Into<String>,
        proxy: impl Into<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
        results: &ResultSet,
    ) -> Self {
        Self {
            collection: collection.into(),
            proxy: proxy.into(),
            timestamp: timestamp.to_rfc3339(),
            total_requests: results.total,
            successful_requests: results.succeeded,
            failed_requests: results.failed,
        }
    }
}

/// Serialized result set document: `{requests, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultDocument {
    pub requests: Vec<RequestResult>,
    pub metadata: RunMetadata,
}
