//! Dispatch error types.
//!
//! Transport faults (connection refused, timeout, proxy failure) are retried;
//! problems with the request itself are not. A received HTTP status is never
//! an error here.

use std::fmt;

/// Errors that can occur while sending a prepared request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The connection to the proxy or target could not be established.
    Connect(String),

    /// The attempt exceeded the configured timeout.
    Timeout,

    /// The proxy refused or failed the request.
    Proxy(String),

    /// TLS handshake or certificate failure.
    Tls(String),

    /// Other network-level failure while sending or reading the response.
    Network(String),

    /// The request could not be built (bad header, bad method).
    Build(String),

    /// The URL could not be parsed.
    InvalidUrl(String),

    /// The run was aborted while the request was pending.
    Aborted,
}

impl DispatchError {
    /// `true` for transport faults worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Connect(_)
                | DispatchError::Timeout
                | DispatchError::Proxy(_)
                | DispatchError::Tls(_)
                | DispatchError::Network(_)
        )
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            DispatchError::Timeout => write!(f, "Request timed out"),
            DispatchError::Proxy(msg) => write!(f, "Proxy error: {}", msg),
            DispatchError::Tls(msg) => write!(f, "TLS/SSL error: {}", msg),
            DispatchError::Network(msg) => write!(f, "Network error: {}", msg),
            DispatchError::Build(msg) => write!(f, "Request build error: {}", msg),
            DispatchError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            DispatchError::Aborted => write!(f, "Run aborted"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        let text = err.to_string();
        let lower = text.to_ascii_lowercase();

        if err.is_timeout() {
            DispatchError::Timeout
        } else if err.is_builder() {
            DispatchError::Build(text)
        } else if lower.contains("proxy") || lower.contains("tunnel") {
            DispatchError::Proxy(text)
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl")
        {
            DispatchError::Tls(text)
        } else if err.is_connect() {
            DispatchError::Connect(text)
        } else {
            DispatchError::Network(text)
        }
    }
}

impl From<url::ParseError> for DispatchError {
    fn from(err: url::ParseError) -> Self {
        DispatchError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            DispatchError::Connect("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(DispatchError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            DispatchError::InvalidUrl("nope".to_string()).to_string(),
            "Invalid URL: nope"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(DispatchError::Connect(String::new()).is_retryable());
        assert!(DispatchError::Timeout.is_retryable());
        assert!(DispatchError::Proxy(String::new()).is_retryable());
        assert!(!DispatchError::Build(String::new()).is_retryable());
        assert!(!DispatchError::InvalidUrl(String::new()).is_retryable());
        assert!(!DispatchError::Aborted.is_retryable());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: DispatchError = url::Url::parse("::").unwrap_err().into();
        assert!(matches!(err, DispatchError::InvalidUrl(_)));
    }
}
