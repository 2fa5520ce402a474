//! The replay pipeline.
//!
//! Walks a collection in declared order and, one request at a time, refreshes
//! the active credential, materializes the request, dispatches it through the
//! selected proxy and aggregates the outcome. Loading errors and a missing
//! proxy abort the run before anything is sent; every other failure is
//! confined to the request it concerns.

pub mod aggregator;
pub mod sink;

pub use aggregator::{collect, ResultAggregator};
pub use sink::{JsonFileSink, MemorySink, ResultSink, SinkError};

use crate::collection::{flatten, Collection, CollectionError};
use crate::config::{ConfigError, ReplayConfig};
use crate::credentials::{CredentialError, CredentialProvider};
use crate::dispatcher::{AbortHandle, Dispatcher, RetryPolicy, Transport, TransportConfig};
use crate::materializer::{MaterializeOptions, Materializer};
use crate::models::{RequestResult, ResultDocument, ResultSet, RunMetadata};
use crate::proxy::{ProxyError, ProxyLocator, SelectedProxy};
use crate::variables::{ScopeError, VariableScopes};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;

/// Errors that stop a run before any request is dispatched.
#[derive(Debug)]
pub enum ReplayError {
    /// A collection, scope, credential or configuration document is unusable
    Config(String),

    /// No proxy candidate was reachable and verified
    ProxyNotFound(ProxyError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ReplayError::ProxyNotFound(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<CollectionError> for ReplayError {
    fn from(err: CollectionError) -> Self {
        ReplayError::Config(err.to_string())
    }
}

impl From<ScopeError> for ReplayError {
    fn from(err: ScopeError) -> Self {
        ReplayError::Config(err.to_string())
    }
}

impl From<CredentialError> for ReplayError {
    fn from(err: CredentialError) -> Self {
        ReplayError::Config(err.to_string())
    }
}

impl From<ConfigError> for ReplayError {
    fn from(err: ConfigError) -> Self {
        ReplayError::Config(err.to_string())
    }
}

impl From<ProxyError> for ReplayError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::InvalidSpec(_) => ReplayError::Config(err.to_string()),
            not_found => ReplayError::ProxyNotFound(not_found),
        }
    }
}

/// Everything a run needs besides the collection itself.
///
/// Built by the caller and passed in; nothing here is global.
#[derive(Debug, Default)]
pub struct ReplayContext {
    pub config: ReplayConfig,

    /// Values of the active scope document.
    pub scope: HashMap<String, String>,

    /// Loaded credential profiles. The active one is applied to every request.
    pub credentials: Option<CredentialProvider>,

    pub abort: AbortHandle,
}

impl ReplayContext {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: HashMap<String, String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialProvider) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Layers the active scope over the collection's variables.
    pub fn variable_scopes(&self, collection: &Collection) -> VariableScopes {
        VariableScopes::layered(
            self.scope.clone(),
            collection.variables(),
            self.config.passthrough_variables.iter().cloned(),
        )
        .with_policy(self.config.unresolved_policy)
    }

    /// Builds the materializer for a collection.
    pub fn materializer(&self, collection: &Collection) -> Materializer {
        let options = MaterializeOptions {
            anchor_variable: self.config.anchor_variable.clone(),
            correlation_header: self.config.correlation_header.clone(),
            default_headers: self
                .config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Materializer::new(self.variable_scopes(collection), options)
    }

    /// Selects the proxy for the run.
    ///
    /// # Arguments
    ///
    /// * `explicit` - Candidate tried first; the configured host and port when `None`
    ///
    /// # Returns
    ///
    /// The selected proxy, or `Err(ProxyError::NotFound)` when no candidate
    /// passed both the probe and the verification request.
    pub async fn select_proxy(
        &self,
        explicit: Option<(String, u16)>,
    ) -> Result<SelectedProxy, ProxyError> {
        let (host, port) = explicit
            .unwrap_or_else(|| (self.config.proxy_host.clone(), self.config.proxy_port));

        if self.config.skip_proxy_check {
            return Ok(ProxyLocator::assume(host, port));
        }

        let locator = ProxyLocator::new(
            self.config.probe_timeout(),
            self.config.verify_url.clone(),
            self.config.verify_timeout(),
            self.config.fallback_list(),
        );
        locator.discover(Some((host, port))).await
    }

    /// Dispatcher over reqwest, configured from the run settings.
    pub fn dispatcher(&self) -> Dispatcher<crate::dispatcher::ReqwestTransport> {
        Dispatcher::reqwest(
            TransportConfig::from_config(&self.config),
            RetryPolicy::from_config(&self.config),
        )
        .with_abort(self.abort.clone())
    }
}

/// Results of a run plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub results: ResultSet,
    pub metadata: RunMetadata,
}

impl ReplayOutcome {
    /// The serialized form `{requests, metadata}`.
    pub fn document(&self) -> ResultDocument {
        ResultDocument {
            requests: self.results.requests.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Hands the outcome to a sink.
    pub fn write_to(&self, sink: &mut dyn ResultSink) -> Result<(), SinkError> {
        sink.write(&self.results, &self.metadata)
    }
}

/// Runs a collection end to end: proxy selection, then every request.
///
/// # Arguments
///
/// * `ctx` - Configuration, scope values, credentials and abort flag
/// * `collection` - The loaded collection
/// * `explicit_proxy` - Proxy candidate tried before the fallback list
///
/// # Returns
///
/// The outcome of every attempted request, or `Err` when no proxy was found.
/// Per-request failures never surface here.
pub async fn run(
    ctx: &ReplayContext,
    collection: &Collection,
    explicit_proxy: Option<(String, u16)>,
) -> Result<ReplayOutcome, ReplayError> {
    let proxy = ctx.select_proxy(explicit_proxy).await?;
    info!("Using proxy {}", proxy);

    let dispatcher = ctx.dispatcher();
    Ok(replay(ctx, collection, &proxy, &dispatcher).await)
}

/// Replays every request of a collection through an already selected proxy.
pub async fn replay<T: Transport>(
    ctx: &ReplayContext,
    collection: &Collection,
    proxy: &SelectedProxy,
    dispatcher: &Dispatcher<T>,
) -> ReplayOutcome {
    let started_at = Utc::now();
    let flattened = flatten(collection);
    let materializer = ctx.materializer(collection);
    let active = ctx
        .credentials
        .as_ref()
        .and_then(|provider| provider.active_label().map(|label| (provider, label)));

    info!(
        "Replaying {} request(s) from '{}'",
        flattened.len(),
        collection.info.name
    );

    let mut aggregator = ResultAggregator::new();
    let mut aborted = false;

    for entry in flattened.iter() {
        if ctx.abort.is_aborted() {
            warn!(
                "Run aborted, {} of {} request(s) attempted",
                aggregator.len(),
                flattened.len()
            );
            aborted = true;
            break;
        }

        let now = Utc::now();
        let mut notes = Vec::new();
        let credential = match active {
            Some((provider, label)) => {
                if let Err(err) = provider.ensure_fresh(label).await {
                    warn!("Credential '{}' unavailable: {}", label, err);
                    notes.push(format!("credential refresh failed: {}", err));
                }
                provider.snapshot(label).await
            }
            None => None,
        };

        let result = match materializer.materialize(entry, credential.as_ref(), now) {
            Ok(mut request) => {
                notes.append(&mut request.annotations);
                request.annotations = notes;
                dispatcher.send(&request, proxy).await
            }
            Err(err) => {
                error!("Skipping '{}': {}", entry.item.name, err);
                let mut result =
                    RequestResult::rejected(&entry.item.name, entry.folder, err.to_string());
                result.annotations = notes;
                result
            }
        };

        debug!(
            "'{}' finished: success={} status={:?}",
            result.name, result.success, result.status_code
        );
        aggregator.push(result);
    }

    let results = aggregator.finish(aborted);
    info!(
        "Run complete: {} total, {} succeeded, {} failed",
        results.total, results.succeeded, results.failed
    );

    let metadata = run_metadata(collection, proxy, started_at, &results);
    ReplayOutcome { results, metadata }
}

fn run_metadata(
    collection: &Collection,
    proxy: &SelectedProxy,
    started_at: DateTime<Utc>,
    results: &ResultSet,
) -> RunMetadata {
    RunMetadata::for_results(
        collection.info.name.clone(),
        proxy.to_string(),
        started_at,
        results,
    )
}
