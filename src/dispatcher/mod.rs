//! Request dispatch with retry.
//!
//! Sends prepared requests through the selected proxy. Transport faults are
//! retried with exponential backoff; any received HTTP status, 5xx included,
//! is final since it reflects the target's behavior, not a transport fault.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod transport;

pub use cancellation::AbortHandle;
pub use config::{RetryPolicy, TransportConfig};
pub use error::DispatchError;
pub use transport::{ReqwestTransport, Transport, TransportResponse};

use crate::models::{PreparedRequest, RequestResult};
use crate::proxy::SelectedProxy;
use log::{debug, error, info, warn};
use tokio::time::Instant;

/// Response headers that indicate the request passed through a proxy.
const PROXY_EVIDENCE_HEADERS: &[&str] = &["Via", "X-Forwarded-For"];

/// Sends requests through a transport under a retry policy.
#[derive(Debug)]
pub struct Dispatcher<T: Transport> {
    transport: T,
    retry: RetryPolicy,
    abort: AbortHandle,
}

impl Dispatcher<ReqwestTransport> {
    /// Dispatcher over the reqwest transport.
    pub fn reqwest(config: TransportConfig, retry: RetryPolicy) -> Self {
        Self::new(ReqwestTransport::new(config), retry)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            abort: AbortHandle::new(),
        }
    }

    /// Wakes retry backoffs when the run is aborted.
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a request and classifies the outcome.
    ///
    /// Never fails: every outcome, including exhausted retries, becomes a
    /// [`RequestResult`]. A non-success status received after a failed attempt
    /// keeps that attempt's error text.
    pub async fn send(&self, request: &PreparedRequest, proxy: &SelectedProxy) -> RequestResult {
        info!("Sending {} {}", request.method, request.url);

        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;
        let mut last_error: Option<DispatchError> = None;
        loop {
            attempt += 1;
            let started = Instant::now();

            let err = match self.transport.send(request, proxy).await {
                Ok(response) => {
                    let elapsed = started.elapsed();
                    info!("Response: {} ({}ms)", response.status, elapsed.as_millis());
                    log_proxy_evidence(&response, proxy);
                    let mut result = RequestResult::received(
                        request,
                        response.status,
                        response.headers,
                        &response.body,
                        elapsed,
                        attempt,
                    );
                    if !result.success {
                        result.error = last_error.map(|err| err.to_string());
                    }
                    return result;
                }
                Err(err) => err,
            };
            let elapsed = started.elapsed();

            if !err.is_retryable() || attempt >= max_attempts {
                error!(
                    "Request '{}' failed after {} attempt(s): {}",
                    request.name, attempt, err
                );
                return RequestResult::transport_failed(request, err.to_string(), elapsed, attempt);
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                "Attempt {}/{} for '{}' failed: {}. Retrying in {}s",
                attempt,
                max_attempts,
                request.name,
                err,
                delay.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.abort.aborted() => {
                    warn!("Run aborted during retry backoff for '{}'", request.name);
                    return RequestResult::transport_failed(
                        request,
                        format!("{} ({})", DispatchError::Aborted, err),
                        elapsed,
                        attempt,
                    );
                }
            }
            last_error = Some(err);
        }
    }
}

/// Logs whether the response carries signs of having crossed the proxy.
fn log_proxy_evidence(response: &TransportResponse, proxy: &SelectedProxy) {
    let evidence: Vec<String> = PROXY_EVIDENCE_HEADERS
        .iter()
        .filter_map(|name| response.header(name).map(|v| format!("{}: {}", name, v)))
        .collect();

    if evidence.is_empty() {
        debug!("No proxy headers in response (proxy {})", proxy);
    } else {
        debug!("Proxy evidence via {}: {}", proxy, evidence.join(", "));
    }
}
