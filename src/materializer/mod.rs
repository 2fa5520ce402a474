//! Request materialization.
//!
//! Turns a request template plus resolved variables and the active credential
//! into a concrete [`PreparedRequest`]. The steps run in a fixed order:
//!
//! 1. resolve placeholders in the URL, headers and body fields
//! 2. synthesize structured URLs
//! 3. prefix the anchor variable onto relative URLs
//! 4. serialize the body by mode
//! 5. apply the credential, after everything else so it always wins and so
//!    OAuth1 signs the final request
//! 6. stamp the correlation header

pub mod body;
pub mod url;

use crate::collection::FlatRequest;
use crate::credentials::CredentialProfile;
use crate::models::{HttpMethod, PreparedRequest};
use crate::variables::VariableScopes;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Errors that make a single request impossible to materialize.
///
/// They fail that request only; the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    /// The request has no URL at all.
    MissingUrl,

    /// A structured URL has neither host nor raw form.
    MissingHost,

    /// The method is not a known HTTP method.
    UnknownMethod(String),

    /// The final URL is not absolute.
    InvalidUrl(String),
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeError::MissingUrl => write!(f, "Request has no URL"),
            MaterializeError::MissingHost => write!(f, "Structured URL has no host"),
            MaterializeError::UnknownMethod(method) => {
                write!(f, "Unknown HTTP method: {}", method)
            }
            MaterializeError::InvalidUrl(url) => write!(f, "URL is not absolute: {}", url),
        }
    }
}

impl std::error::Error for MaterializeError {}

/// Settings that shape every materialized request.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeOptions {
    /// Variable holding the target base URL; prefixed onto relative URLs.
    pub anchor_variable: String,

    /// Header carrying the generated request id.
    pub correlation_header: String,

    /// Headers added when the template does not declare them.
    pub default_headers: Vec<(String, String)>,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            anchor_variable: "base_url".to_string(),
            correlation_header: "X-Replay-Request-Id".to_string(),
            default_headers: Vec::new(),
        }
    }
}

/// Materializes request templates against a fixed set of scopes.
#[derive(Debug, Clone)]
pub struct Materializer {
    scopes: VariableScopes,
    options: MaterializeOptions,
}

impl Materializer {
    pub fn new(scopes: VariableScopes, options: MaterializeOptions) -> Self {
        Self { scopes, options }
    }

    pub fn scopes(&self) -> &VariableScopes {
        &self.scopes
    }

    /// Produces the concrete request for one flattened template.
    ///
    /// # Arguments
    ///
    /// * `entry` - The request template and its folder path
    /// * `credential` - Snapshot of the active profile, if any
    /// * `now` - Run clock, used for the correlation id
    ///
    /// # Returns
    ///
    /// The prepared request. Unresolved variables and a credential that could
    /// not be applied are recorded as annotations, not errors.
    pub fn materialize(
        &self,
        entry: FlatRequest<'_>,
        credential: Option<&CredentialProfile>,
        now: DateTime<Utc>,
    ) -> Result<PreparedRequest, MaterializeError> {
        let template = &entry.item.request;
        let mut unresolved = BTreeSet::new();

        let method = match template.method.as_deref().map(str::trim) {
            None | Some("") => HttpMethod::GET,
            Some(raw) => {
                let resolved = self.scopes.resolve_into(raw, &mut unresolved);
                HttpMethod::from_str(&resolved)
                    .ok_or(MaterializeError::UnknownMethod(resolved))?
            }
        };

        let url = template.url.as_ref().ok_or(MaterializeError::MissingUrl)?;
        let url = url::build_url(url, &self.scopes, &mut unresolved)?;
        let url = self.anchor(url)?;

        let mut request = PreparedRequest::new(entry.item.name.clone(), method, url);
        request.folder = entry.folder.to_string();

        for header in template.header.iter().filter(|h| !h.disabled) {
            let key = self.scopes.resolve_into(header.key.trim(), &mut unresolved);
            if key.is_empty() {
                continue;
            }
            let value = self.scopes.resolve_into(&header.value, &mut unresolved);
            request.headers.push((key, value));
        }
        for (name, value) in &self.options.default_headers {
            if request.header(name).is_none() {
                request.headers.push((name.clone(), value.clone()));
            }
        }

        request.body = body::build_body(template.body.as_ref(), &self.scopes, &mut unresolved);

        for name in &unresolved {
            warn!(
                "Unresolved variable '{{{{{}}}}}' in request '{}'",
                name, request.name
            );
            request
                .annotations
                .push(format!("unresolved variable: {{{{{}}}}}", name));
        }

        if let Some(profile) = credential {
            if let Err(err) = profile.apply(&mut request) {
                warn!(
                    "Credential '{}' not applied to '{}': {}",
                    profile.label, request.name, err
                );
                request
                    .annotations
                    .push(format!("credential not applied: {}", err));
            }
        }

        request.request_id = correlation_id(entry.folder, &request.name, now);
        request.set_header(
            self.options.correlation_header.clone(),
            request.request_id.clone(),
        );

        debug!(
            "Materialized '{}' as {} {}",
            request.name, request.method, request.url
        );
        Ok(request)
    }

    fn anchor(&self, url: String) -> Result<String, MaterializeError> {
        if url::is_absolute(&url) {
            return Ok(url);
        }
        match self
            .scopes
            .lookup(&self.options.anchor_variable)
            .filter(|base| !base.trim().is_empty())
        {
            Some(base) => Ok(url::join_base(base, &url)),
            None => Err(MaterializeError::InvalidUrl(url)),
        }
    }
}

/// Deterministic request id derived from the request identity and time.
pub fn correlation_id(folder: &str, name: &str, now: DateTime<Utc>) -> String {
    let seed = format!("{}/{}:{}", folder, name, now.timestamp_millis());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}
