//! Collection replay through an intercepting proxy.
//!
//! Replays a hierarchical collection of HTTP request templates against a live
//! target. Variables are substituted from layered scopes, credentials are
//! attached (refreshing dynamic ones as needed) and every request is forwarded
//! through a discovered intercepting proxy so the traffic can be inspected.
//!
//! # Architecture
//!
//! The pipeline runs leaf-first through these modules:
//!
//! - **collection**: Loads collection documents and flattens the node tree
//! - **variables**: Scope documents, encodings and `{{name}}` resolution
//! - **materializer**: Turns templates into concrete requests
//! - **credentials**: Credential profiles, refresh and application
//! - **proxy**: Probes and verifies candidate proxies
//! - **dispatcher**: Sends requests through the proxy with retry and backoff
//! - **pipeline**: Orchestrates a run and aggregates results
//! - **config**: Run settings
//! - **models**: Prepared requests and results
//!
//! # Usage
//!
//! ```no_run
//! use collection_replay::collection::Collection;
//! use collection_replay::config::ReplayConfig;
//! use collection_replay::pipeline::{run, JsonFileSink, ReplayContext};
//! use collection_replay::variables::load_scope;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReplayConfig::default();
//! let collection = Collection::load(Path::new("collection.json"))?;
//! let scope = load_scope(Path::new("scope.json"), &config.anchor_variable)?;
//!
//! let ctx = ReplayContext::new(config).with_scope(scope);
//! let outcome = run(&ctx, &collection, None).await?;
//! outcome.write_to(&mut JsonFileSink::new("results.json"))?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod materializer;
pub mod models;
pub mod pipeline;
pub mod proxy;
pub mod variables;

pub use pipeline::{run, ReplayContext, ReplayError, ReplayOutcome};
