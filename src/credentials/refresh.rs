//! Refresh of dynamic credential values.
//!
//! One call performs exactly one fetch. On success the value and its fetch
//! time are stored on the profile; on failure the value is cleared and the
//! error recorded, leaving the profile `Unfetched`.

use super::{
    extract::extract_value, oauth2, Credential, CredentialError, CredentialProfile, DynamicSource,
};
use crate::models::HttpMethod;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;

/// Fetches a fresh value for a dynamic profile and stores it.
///
/// Static profiles are left untouched.
///
/// # Arguments
///
/// * `client` - HTTP client used for the refresh request (not proxied)
/// * `profile` - Profile to refresh in place
pub async fn refresh_profile(
    client: &reqwest::Client,
    profile: &mut CredentialProfile,
) -> Result<(), CredentialError> {
    let label = profile.label.clone();

    let outcome = match &mut profile.credential {
        Credential::Bearer(bearer) if bearer.is_dynamic => {
            let result = fetch_dynamic_value(client, &bearer.source).await;
            store_dynamic(&mut bearer.token, &mut bearer.source, result)
        }
        Credential::ApiKey(key) if key.is_dynamic => {
            let result = fetch_dynamic_value(client, &key.source).await;
            store_dynamic(&mut key.key, &mut key.source, result)
        }
        Credential::OAuth2(oauth) => match oauth2::fetch_token(client, oauth).await {
            Ok(token) => {
                oauth.token = token;
                oauth.last_error = None;
                Ok(())
            }
            Err(err) => {
                oauth.token.access_token = None;
                oauth.token.expires_at = None;
                oauth.last_error = Some(err.to_string());
                Err(err)
            }
        },
        _ => return Ok(()),
    };

    match &outcome {
        Ok(()) => info!("Refreshed credential for profile '{}'", label),
        Err(err) => warn!("Failed to refresh credential for profile '{}': {}", label, err),
    }
    outcome
}

fn store_dynamic(
    value: &mut Option<String>,
    source: &mut DynamicSource,
    result: Result<String, CredentialError>,
) -> Result<(), CredentialError> {
    match result {
        Ok(fetched) => {
            *value = Some(fetched);
            source.fetched_at = Some(Utc::now());
            source.last_error = None;
            Ok(())
        }
        Err(err) => {
            *value = None;
            source.fetched_at = None;
            source.last_error = Some(err.to_string());
            Err(err)
        }
    }
}

/// Sends the configured refresh request and extracts the value.
pub async fn fetch_dynamic_value(
    client: &reqwest::Client,
    source: &DynamicSource,
) -> Result<String, CredentialError> {
    let url = source
        .auth_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingField("auth_url".to_string()))?;

    let method = HttpMethod::from_str(&source.auth_method).ok_or_else(|| {
        CredentialError::RefreshFailed(format!("unsupported method '{}'", source.auth_method))
    })?;
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

    debug!("Refreshing credential via {} {}", method, url);

    let mut request = client.request(method, url);
    for (name, value) in &source.auth_headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &source.auth_body {
        request = request.body(body.clone());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CredentialError::RefreshStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await?;

    extract_value(&body, content_type.as_deref(), source.value_location.as_deref())
}
