//! Credential profiles.
//!
//! A profile is a named authentication configuration, stored one JSON document
//! per profile and tagged by its `type` field:
//!
//! ```json
//! {"type": "bearer", "label": "staging", "is_dynamic": true,
//!  "auth_url": "https://auth.test/token", "auth_method": "POST",
//!  "auth_body": "{\"user\":\"svc\"}", "token_refresh_interval": 3600,
//!  "token_location": "data.access_token"}
//! ```
//!
//! Static profiles (Basic, fixed Bearer, fixed API key, OAuth1) never change.
//! Dynamic profiles (refreshed Bearer, refreshed API key, OAuth2) carry their
//! current value and fetch time, and move through
//! `Unfetched -> Valid -> Expired -> Valid` as they are refreshed. A failed
//! refresh clears the value and returns the profile to `Unfetched`.

pub mod api_key;
pub mod basic;
pub mod bearer;
pub mod extract;
pub mod oauth1;
pub mod oauth2;
pub mod provider;
pub mod refresh;
pub mod store;

pub use provider::CredentialProvider;
pub use store::{load_profile, load_profiles, save_profile};

use crate::models::PreparedRequest;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Seconds before nominal expiry at which a value is already treated as expired.
pub const SAFETY_MARGIN_SECS: i64 = 10;

/// Default lifetime of a dynamically fetched value.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;

/// Upper bound on a configured lifetime (ten years).
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// Errors that can occur while loading, refreshing or applying credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// IO error occurred while reading or writing a profile document
    IoError(String),

    /// Failed to parse a profile document
    ParseError(String),

    /// The profile is missing a field it needs
    MissingField(String),

    /// No profile with the given label exists
    UnknownProfile(String),

    /// The refresh request could not be sent or completed
    RefreshFailed(String),

    /// The refresh endpoint answered with a non-success status
    RefreshStatus(u16),

    /// The credential value could not be located in the refresh response
    ExtractionFailed(String),

    /// The profile currently has no value to apply
    Unavailable(String),

    /// The request could not be modified (unparseable URL, bad header)
    InvalidRequest(String),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::IoError(msg) => write!(f, "IO error: {}", msg),
            CredentialError::ParseError(msg) => write!(f, "Invalid credential profile: {}", msg),
            CredentialError::MissingField(msg) => write!(f, "Missing credential field: {}", msg),
            CredentialError::UnknownProfile(label) => {
                write!(f, "Unknown credential profile: {}", label)
            }
            CredentialError::RefreshFailed(msg) => write!(f, "Credential refresh failed: {}", msg),
            CredentialError::RefreshStatus(status) => {
                write!(f, "Credential refresh failed: HTTP {}", status)
            }
            CredentialError::ExtractionFailed(msg) => {
                write!(f, "Credential not found in response: {}", msg)
            }
            CredentialError::Unavailable(label) => {
                write!(f, "Credential '{}' has no current value", label)
            }
            CredentialError::InvalidRequest(msg) => {
                write!(f, "Cannot apply credential: {}", msg)
            }
        }
    }
}

impl std::error::Error for CredentialError {}

impl From<std::io::Error> for CredentialError {
    fn from(err: std::io::Error) -> Self {
        CredentialError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(err: serde_json::Error) -> Self {
        CredentialError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for CredentialError {
    fn from(err: reqwest::Error) -> Self {
        CredentialError::RefreshFailed(err.to_string())
    }
}

/// Freshness of a profile's credential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// The profile never changes.
    Static,
    /// No value yet (never fetched, or the last refresh failed).
    Unfetched,
    /// A value is present and within its lifetime.
    Valid,
    /// A value is present but its lifetime has elapsed.
    Expired,
}

/// A named credential profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialProfile {
    /// Unique label used to select the profile.
    #[serde(default)]
    pub label: String,

    #[serde(flatten)]
    pub credential: Credential,
}

/// Credential variants, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credential {
    #[serde(rename = "basic")]
    Basic(BasicCredential),

    #[serde(rename = "bearer")]
    Bearer(BearerCredential),

    #[serde(rename = "apikey", alias = "api_key")]
    ApiKey(ApiKeyCredential),

    #[serde(rename = "oauth1")]
    OAuth1(OAuth1Credential),

    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Credential),
}

/// Username and password sent as HTTP Basic authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredential {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Bearer token, fixed or fetched from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerCredential {
    /// Current token.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub is_dynamic: bool,

    #[serde(flatten)]
    pub source: DynamicSource,
}

/// Where an API key is placed on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyPlacement {
    #[default]
    Header,
    Query,
    Cookie,
}

/// API key, fixed or fetched from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    /// Current key.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub location: KeyPlacement,

    /// Header, query parameter or cookie name.
    #[serde(default = "default_param_name")]
    pub param_name: String,

    #[serde(default)]
    pub is_dynamic: bool,

    #[serde(flatten)]
    pub source: DynamicSource,
}

fn default_param_name() -> String {
    "X-API-Key".to_string()
}

/// Refresh endpoint and freshness bookkeeping of a dynamic value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSource {
    #[serde(default)]
    pub auth_url: Option<String>,

    #[serde(default = "default_auth_method")]
    pub auth_method: String,

    #[serde(default)]
    pub auth_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub auth_body: Option<String>,

    /// Lifetime of a fetched value in seconds.
    #[serde(
        default = "default_refresh_interval",
        alias = "token_refresh_interval",
        alias = "key_refresh_interval"
    )]
    pub refresh_interval: u64,

    /// Dotted path of the value inside the response; whole body when absent.
    #[serde(default, alias = "token_location", alias = "key_location")]
    pub value_location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for DynamicSource {
    fn default() -> Self {
        Self {
            auth_url: None,
            auth_method: default_auth_method(),
            auth_headers: BTreeMap::new(),
            auth_body: None,
            refresh_interval: default_refresh_interval(),
            value_location: None,
            fetched_at: None,
            last_error: None,
        }
    }
}

fn default_auth_method() -> String {
    "POST".to_string()
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl DynamicSource {
    /// Freshness of `value` fetched at `fetched_at`.
    fn state(&self, value: Option<&str>, now: DateTime<Utc>) -> CredentialState {
        match (value, self.fetched_at) {
            (Some(_), Some(fetched_at)) => {
                let ttl = Duration::seconds(self.refresh_interval.min(MAX_LIFETIME_SECS) as i64);
                if now < fetched_at + ttl - Duration::seconds(SAFETY_MARGIN_SECS) {
                    CredentialState::Valid
                } else {
                    CredentialState::Expired
                }
            }
            _ => CredentialState::Unfetched,
        }
    }
}

/// OAuth 1.0a consumer and token credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth1Credential {
    #[serde(default)]
    pub client_key: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub resource_owner_key: Option<String>,
    #[serde(default)]
    pub resource_owner_secret: Option<String>,
    #[serde(default)]
    pub signature_method: SignatureMethod,
}

/// OAuth1 signature method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SignatureMethod {
    #[default]
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
            SignatureMethod::Plaintext => "PLAINTEXT",
        }
    }
}

/// OAuth2 grant used to obtain tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    ClientCredentials,
    Password,
    RefreshToken,
    /// Grants that need user interaction; never refreshed automatically.
    #[serde(other)]
    Unsupported,
}

/// Token state of an OAuth2 profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OAuth2Token {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Expiry as seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
}

/// OAuth2 client configuration and current token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Credential {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub token: OAuth2Token,

    #[serde(default)]
    pub token_url: Option<String>,

    #[serde(default)]
    pub refresh_url: Option<String>,

    #[serde(default)]
    pub scope: Vec<String>,

    #[serde(default)]
    pub grant_type: GrantType,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CredentialProfile {
    /// Creates a profile.
    pub fn new(label: impl Into<String>, credential: Credential) -> Self {
        Self {
            label: label.into(),
            credential,
        }
    }

    /// The `type` tag of the profile, also its storage subdirectory.
    pub fn type_name(&self) -> &'static str {
        match &self.credential {
            Credential::Basic(_) => "basic",
            Credential::Bearer(_) => "bearer",
            Credential::ApiKey(_) => "apikey",
            Credential::OAuth1(_) => "oauth1",
            Credential::OAuth2(_) => "oauth2",
        }
    }

    /// `true` for profiles whose value is fetched at runtime.
    pub fn is_dynamic(&self) -> bool {
        match &self.credential {
            Credential::Bearer(bearer) => bearer.is_dynamic,
            Credential::ApiKey(key) => key.is_dynamic,
            Credential::OAuth2(_) => true,
            Credential::Basic(_) | Credential::OAuth1(_) => false,
        }
    }

    /// Current freshness of the profile at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        match &self.credential {
            Credential::Bearer(bearer) if bearer.is_dynamic => {
                bearer.source.state(bearer.token.as_deref(), now)
            }
            Credential::ApiKey(key) if key.is_dynamic => {
                key.source.state(key.key.as_deref(), now)
            }
            Credential::OAuth2(oauth) => oauth2::token_state(&oauth.token, now),
            _ => CredentialState::Static,
        }
    }

    /// `true` when the profile is dynamic and not currently valid.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.state(now),
            CredentialState::Unfetched | CredentialState::Expired
        )
    }

    /// Error recorded by the last failed refresh, if any.
    pub fn last_error(&self) -> Option<&str> {
        match &self.credential {
            Credential::Bearer(bearer) => bearer.source.last_error.as_deref(),
            Credential::ApiKey(key) => key.source.last_error.as_deref(),
            Credential::OAuth2(oauth) => oauth.last_error.as_deref(),
            Credential::Basic(_) | Credential::OAuth1(_) => None,
        }
    }

    /// Injects the credential into a fully materialized request.
    ///
    /// Basic, Bearer and OAuth2 set `Authorization`; API keys go to a header,
    /// query parameter or cookie; OAuth1 signs the request as it stands, so
    /// this must run after every other change to method, URL and body.
    ///
    /// # Returns
    ///
    /// `Err(CredentialError::Unavailable)` when a dynamic profile has no value.
    pub fn apply(&self, request: &mut PreparedRequest) -> Result<(), CredentialError> {
        match &self.credential {
            Credential::Basic(basic) => {
                request.set_header(
                    "Authorization",
                    basic::basic_auth(&basic.username, &basic.password),
                );
                Ok(())
            }
            Credential::Bearer(bearer) => {
                let token = self.require(bearer.token.as_deref())?;
                request.set_header("Authorization", bearer::bearer_token(token));
                Ok(())
            }
            Credential::ApiKey(key) => {
                let value = self.require(key.key.as_deref())?;
                api_key::apply_api_key(request, key.location, &key.param_name, value)
            }
            Credential::OAuth1(oauth) => {
                let header = oauth1::authorization_header(
                    oauth,
                    request,
                    &oauth1::generate_nonce(),
                    Utc::now().timestamp(),
                )?;
                request.set_header("Authorization", header);
                Ok(())
            }
            Credential::OAuth2(oauth) => {
                let token = self.require(oauth.token.access_token.as_deref())?;
                request.set_header(
                    "Authorization",
                    bearer::scheme_token(oauth.token.token_type.as_deref(), token),
                );
                Ok(())
            }
        }
    }

    fn require<'a>(&self, value: Option<&'a str>) -> Result<&'a str, CredentialError> {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialError::Unavailable(self.label.clone()))
    }
}
