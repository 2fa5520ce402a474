//! Interception proxy discovery.
//!
//! Discovery is a one-shot scan: the explicit candidate (if any) first, then
//! the well-known proxy ports in fixed order. Each candidate gets a TCP
//! connect probe and, when reachable, one GET through it against a stable
//! endpoint. The first candidate that passes both is selected.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Well-known local proxy ports: Burp, ZAP, mitmproxy, Charles/Fiddler.
pub const COMMON_PROXY_PORTS: &[u16] = &[8080, 8090, 8081, 8888];

/// Hosts the well-known ports are tried on.
pub const COMMON_PROXY_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// The default fallback list: every common port on every common host.
pub fn common_proxies() -> Vec<(String, u16)> {
    let mut list = Vec::new();
    for host in COMMON_PROXY_HOSTS {
        for port in COMMON_PROXY_PORTS {
            let candidate = (host.to_string(), *port);
            if !list.contains(&candidate) {
                list.push(candidate);
            }
        }
    }
    list
}

/// Errors raised while locating a proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// No candidate was both reachable and verified.
    NotFound { tried: Vec<ProxyCandidate> },

    /// A `host:port` specification could not be parsed.
    InvalidSpec(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::NotFound { tried } => {
                let names: Vec<String> = tried.iter().map(|c| c.address()).collect();
                write!(f, "No working proxy found (tried {})", names.join(", "))
            }
            ProxyError::InvalidSpec(spec) => write!(f, "Invalid proxy specification: {}", spec),
        }
    }
}

impl std::error::Error for ProxyError {}

/// A host/port pair considered for interception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    /// TCP connect succeeded.
    pub reachable: bool,
    /// A request through the proxy returned the expected status.
    pub verified: bool,
}

impl ProxyCandidate {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reachable: false,
            verified: false,
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The proxy every request of the run is sent through.
///
/// Read-only once discovery completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedProxy {
    pub host: String,
    pub port: u16,
    /// `false` when selected without probing.
    pub verified: bool,
}

impl SelectedProxy {
    /// Proxy URL for the HTTP client, `http://host:port`.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for SelectedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host:port`, `host` or `http://host:port/`.
///
/// A bare host takes `default_port`.
pub fn parse_proxy_spec(spec: &str, default_port: u16) -> Result<(String, u16), ProxyError> {
    let trimmed = spec.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if without_scheme.is_empty() {
        return Err(ProxyError::InvalidSpec(spec.to_string()));
    }

    match without_scheme.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ProxyError::InvalidSpec(spec.to_string()))?;
            if host.is_empty() || port == 0 {
                return Err(ProxyError::InvalidSpec(spec.to_string()));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((without_scheme.to_string(), default_port)),
    }
}

/// Probes and verifies proxy candidates.
#[derive(Debug, Clone)]
pub struct ProxyLocator {
    probe_timeout: Duration,
    verify_url: String,
    verify_timeout: Duration,
    fallback: Vec<(String, u16)>,
}

impl Default for ProxyLocator {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            "https://httpbin.org/get",
            Duration::from_secs(5),
            common_proxies(),
        )
    }
}

impl ProxyLocator {
    /// Creates a locator.
    ///
    /// # Arguments
    ///
    /// * `probe_timeout` - TCP connect timeout per candidate
    /// * `verify_url` - Endpoint fetched through each reachable candidate
    /// * `verify_timeout` - Timeout of the verification request
    /// * `fallback` - Candidates scanned after the explicit one, in order
    pub fn new(
        probe_timeout: Duration,
        verify_url: impl Into<String>,
        verify_timeout: Duration,
        fallback: Vec<(String, u16)>,
    ) -> Self {
        Self {
            probe_timeout,
            verify_url: verify_url.into(),
            verify_timeout,
            fallback,
        }
    }

    /// Selects a proxy without probing it.
    pub fn assume(host: impl Into<String>, port: u16) -> SelectedProxy {
        let selected = SelectedProxy {
            host: host.into(),
            port,
            verified: false,
        };
        warn!("Using proxy {} without checking it", selected);
        selected
    }

    /// Scans the explicit candidate, then the fallback list.
    ///
    /// # Returns
    ///
    /// The first reachable and verified candidate, or
    /// `Err(ProxyError::NotFound)` listing everything tried.
    pub async fn discover(
        &self,
        explicit: Option<(String, u16)>,
    ) -> Result<SelectedProxy, ProxyError> {
        let mut order: Vec<(String, u16)> = Vec::new();
        for candidate in explicit.into_iter().chain(self.fallback.iter().cloned()) {
            if !order.contains(&candidate) {
                order.push(candidate);
            }
        }

        let mut tried = Vec::with_capacity(order.len());
        for (host, port) in order {
            let mut candidate = ProxyCandidate::new(host, port);
            self.check(&mut candidate).await;

            if candidate.verified {
                info!("Using proxy {}", candidate.address());
                return Ok(SelectedProxy {
                    host: candidate.host,
                    port: candidate.port,
                    verified: true,
                });
            }
            tried.push(candidate);
        }

        warn!("No working proxy found after {} candidate(s)", tried.len());
        Err(ProxyError::NotFound { tried })
    }

    /// Probes a candidate and, if reachable, verifies it.
    pub async fn check(&self, candidate: &mut ProxyCandidate) {
        candidate.reachable = self.probe(&candidate.host, candidate.port).await;
        if !candidate.reachable {
            debug!("Proxy {} is not reachable", candidate.address());
            return;
        }

        candidate.verified = self.verify(&candidate.host, candidate.port).await;
        if candidate.verified {
            debug!("Proxy {} verified", candidate.address());
        } else {
            warn!(
                "Proxy {} accepts connections but failed verification",
                candidate.address()
            );
        }
    }

    /// TCP connect with the probe timeout.
    pub async fn probe(&self, host: &str, port: u16) -> bool {
        matches!(
            timeout(self.probe_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    /// Fetches the verification endpoint through the proxy; `true` on HTTP 200.
    pub async fn verify(&self, host: &str, port: u16) -> bool {
        let proxy_url = format!("http://{}:{}", host, port);
        let proxy = match reqwest::Proxy::all(&proxy_url) {
            Ok(proxy) => proxy,
            Err(err) => {
                debug!("Invalid proxy URL {}: {}", proxy_url, err);
                return false;
            }
        };

        let client = match reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.verify_timeout)
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                debug!("Failed to build verification client: {}", err);
                return false;
            }
        };

        match client.get(&self.verify_url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(err) => {
                debug!("Verification through {} failed: {}", proxy_url, err);
                false
            }
        }
    }
}
