//! Prepared request data models.
//!
//! This module defines the concrete, dispatchable form of a request: every
//! variable resolved, the body serialized according to its mode, and the active
//! credential applied.

use serde::{Deserialize, Serialize};

/// HTTP request method.
///
/// Represents all standard HTTP methods as defined in RFC 7231 and RFC 5789.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// HTTP GET method - retrieve a resource
    GET,
    /// HTTP POST method - submit data to create a resource
    POST,
    /// HTTP PUT method - replace a resource
    PUT,
    /// HTTP DELETE method - remove a resource
    DELETE,
    /// HTTP PATCH method - partially modify a resource
    PATCH,
    /// HTTP OPTIONS method - describe communication options
    OPTIONS,
    /// HTTP HEAD method - retrieve headers only
    HEAD,
    /// HTTP TRACE method - perform a message loop-back test
    TRACE,
    /// HTTP CONNECT method - establish a tunnel to the server
    CONNECT,
}

impl HttpMethod {
    /// Returns the string representation of the HTTP method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::CONNECT => "CONNECT",
        }
    }

    /// Parses a string into an HttpMethod.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    ///
    /// # Returns
    ///
    /// `Some(HttpMethod)` if the string is a valid HTTP method, `None` otherwise.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "HEAD" => Some(HttpMethod::HEAD),
            "TRACE" => Some(HttpMethod::TRACE),
            "CONNECT" => Some(HttpMethod::CONNECT),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Materialized request body.
///
/// Form variants keep their ordered key/value pairs so the transport can encode
/// them and OAuth1 signing can include url-encoded parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "content", rename_all = "lowercase")]
pub enum PreparedBody {
    /// No body.
    #[default]
    None,
    /// Raw text body passed through verbatim.
    Raw(String),
    /// `application/x-www-form-urlencoded` pairs.
    UrlEncoded(Vec<(String, String)>),
    /// `multipart/form-data` text fields.
    Multipart(Vec<(String, String)>),
}

impl PreparedBody {
    /// Returns `true` when there is nothing to send.
    pub fn is_none(&self) -> bool {
        matches!(self, PreparedBody::None)
    }

    /// Renders the body as text for result snapshots.
    pub fn to_text(&self) -> Option<String> {
        match self {
            PreparedBody::None => None,
            PreparedBody::Raw(raw) => Some(raw.clone()),
            PreparedBody::UrlEncoded(pairs) | PreparedBody::Multipart(pairs) => Some(
                pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&"),
            ),
        }
    }
}

/// A fully materialized request, ready for dispatch.
///
/// Contains no unresolved template syntax (other than passthrough variables
/// left for the proxy's own tooling) and already carries the credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedRequest {
    /// Correlation id stamped into the correlation header.
    pub request_id: String,

    /// Name of the originating Request node.
    pub name: String,

    /// `/`-joined folder path of the originating Request node.
    pub folder: String,

    /// HTTP method.
    pub method: HttpMethod,

    /// Absolute target URL.
    pub url: String,

    /// Ordered request headers.
    ///
    /// Header names are compared case-insensitively by the helpers below;
    /// the original spelling is preserved on the wire.
    pub headers: Vec<(String, String)>,

    /// Request body.
    pub body: PreparedBody,

    /// Non-fatal notes gathered while materializing (unresolved variables,
    /// unavailable credentials). Copied onto the result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl PreparedRequest {
    /// Creates a bodyless request with no headers.
    pub fn new(name: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            name: name.into(),
            folder: String::new(),
            method,
            url: url.into(),
            headers: Vec::new(),
            body: PreparedBody::None,
            annotations: Vec::new(),
        }
    }

    /// Returns the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing every existing header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Gets the Content-Type header value if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_as_str() {
        assert_eq!(HttpMethod::GET.as_str(), "GET");
        assert_eq!(HttpMethod::POST.as_str(), "POST");
        assert_eq!(HttpMethod::DELETE.as_str(), "DELETE");
    }

    #[test]
    fn test_http_method_from_str() {
        assert_eq!(HttpMethod::from_str("GET"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str("get"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str(" Post "), Some(HttpMethod::POST));
        assert_eq!(HttpMethod::from_str("INVALID"), None);
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut request = PreparedRequest::new("r", HttpMethod::GET, "https://example.com");
        request.set_header("authorization", "Bearer template");
        request.set_header("X-Trace", "1");
        request.set_header("Authorization", "Bearer credential");

        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.header("AUTHORIZATION"), Some("Bearer credential"));
        assert_eq!(request.headers[1].0, "Authorization");
    }

    #[test]
    fn test_body_to_text() {
        assert_eq!(PreparedBody::None.to_text(), None);
        assert_eq!(
            PreparedBody::Raw("{\"a\":1}".to_string()).to_text(),
            Some("{\"a\":1}".to_string())
        );
        let form = PreparedBody::UrlEncoded(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(form.to_text(), Some("a=1&b=2".to_string()));
    }

    #[test]
    fn test_content_type_lookup() {
        let mut request = PreparedRequest::new("r", HttpMethod::POST, "https://example.com");
        assert_eq!(request.content_type(), None);
        request.set_header("content-type", "text/plain");
        assert_eq!(request.content_type(), Some("text/plain"));
    }
}
