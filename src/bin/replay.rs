//! Replay command-line entry point.
//!
//! A thin adapter over [`collection_replay::run`]: loads the documents named on
//! the command line, runs the collection and writes the result document.
//!
//! # Usage
//!
//! ```text
//! replay --collection <path> [--scope <path>] [--credentials <dir>]
//!        [--profile <label>] [--proxy host:port] [--config <path>]
//!        [--output <path>] [--verbose]
//! ```
//!
//! Exits 0 once the run completes, whatever the individual request outcomes,
//! and 1 when the run could not start.

use collection_replay::collection::Collection;
use collection_replay::config::{load_config_file, ReplayConfig};
use collection_replay::credentials::{load_profiles, CredentialError, CredentialProvider};
use collection_replay::dispatcher::AbortHandle;
use collection_replay::pipeline::{JsonFileSink, ReplayContext, ReplayError};
use collection_replay::proxy::parse_proxy_spec;
use collection_replay::variables::load_scope;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "Usage: replay --collection <path> [--scope <path>] [--credentials <dir>] \
[--profile <label>] [--proxy host:port] [--config <path>] [--output <path>] [--verbose]";

#[derive(Debug, Default)]
struct Args {
    collection: Option<PathBuf>,
    scope: Option<PathBuf>,
    credentials: Option<PathBuf>,
    profile: Option<String>,
    proxy: Option<String>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    verbose: bool,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();

    while let Some(flag) = raw.next() {
        if flag == "--verbose" || flag == "-v" {
            args.verbose = true;
            continue;
        }

        let mut value = || raw.next().ok_or_else(|| format!("{} needs a value", flag));
        match flag.as_str() {
            "--collection" | "-c" => args.collection = Some(PathBuf::from(value()?)),
            "--scope" | "-s" => args.scope = Some(PathBuf::from(value()?)),
            "--credentials" => args.credentials = Some(PathBuf::from(value()?)),
            "--profile" => args.profile = Some(value()?),
            "--proxy" | "-p" => args.proxy = Some(value()?),
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--output" | "-o" => args.output = Some(PathBuf::from(value()?)),
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    if args.collection.is_none() {
        return Err("--collection is required".to_string());
    }
    Ok(args)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.verbose);

    match replay(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn replay(args: Args) -> Result<(), ReplayError> {
    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => ReplayConfig::default(),
    };

    let collection_path = args
        .collection
        .as_deref()
        .ok_or_else(|| ReplayError::Config("--collection is required".to_string()))?;
    let collection = Collection::load(collection_path)?;

    let scope = match &args.scope {
        Some(path) => load_scope(path, &config.anchor_variable)?,
        None => Default::default(),
    };

    let explicit_proxy = args
        .proxy
        .as_deref()
        .map(|spec| parse_proxy_spec(spec, config.proxy_port))
        .transpose()?;

    let abort = AbortHandle::new();
    let mut ctx = ReplayContext::new(config)
        .with_scope(scope)
        .with_abort(abort.clone());

    if let Some(dir) = &args.credentials {
        let mut provider = CredentialProvider::new(load_profiles(dir)?)?;
        select_profile(&mut provider, args.profile.as_deref())?;
        ctx = ctx.with_credentials(provider);
    } else if args.profile.is_some() {
        warn!("--profile given without --credentials, ignoring it");
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current request");
            abort.abort();
        }
    });

    let outcome = collection_replay::run(&ctx, &collection, explicit_proxy).await?;

    if let Some(path) = &args.output {
        if let Err(err) = outcome.write_to(&mut JsonFileSink::new(path)) {
            error!("Failed to write results: {}", err);
        }
    }

    info!(
        "{} request(s): {} succeeded, {} failed{}",
        outcome.results.total,
        outcome.results.succeeded,
        outcome.results.failed,
        if outcome.results.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}

/// Activates the requested profile, or the only one loaded when none is named.
fn select_profile(
    provider: &mut CredentialProvider,
    requested: Option<&str>,
) -> Result<(), CredentialError> {
    if let Some(label) = requested {
        return provider.set_active(label);
    }

    match provider.labels() {
        [only] => {
            let label = only.clone();
            info!("Using credential profile '{}'", label);
            provider.set_active(&label)
        }
        [] => {
            warn!("No credential profiles loaded, requests go out without credentials");
            Ok(())
        }
        labels => {
            warn!(
                "{} credential profiles loaded and no --profile given, requests go out without credentials",
                labels.len()
            );
            Ok(())
        }
    }
}
