//! OAuth2 token acquisition.
//!
//! Supports the non-interactive grants: `client_credentials`, `password` and
//! `refresh_token`. Tokens are requested with a form-encoded POST and the JSON
//! answer's `expires_in` (default one hour) becomes an absolute `expires_at`.

use super::{
    CredentialError, CredentialState, GrantType, OAuth2Credential, OAuth2Token,
    DEFAULT_REFRESH_INTERVAL_SECS, SAFETY_MARGIN_SECS,
};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;

/// Token endpoint answer.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Freshness of an OAuth2 token at `now`.
///
/// A token without `expires_at` is treated as valid; one with an expiry is
/// expired [`SAFETY_MARGIN_SECS`] before it.
pub fn token_state(token: &OAuth2Token, now: DateTime<Utc>) -> CredentialState {
    match (&token.access_token, token.expires_at) {
        (None, _) => CredentialState::Unfetched,
        (Some(_), None) => CredentialState::Valid,
        (Some(_), Some(expires_at)) => {
            let now = now.timestamp() as f64;
            if now < expires_at - SAFETY_MARGIN_SECS as f64 {
                CredentialState::Valid
            } else {
                CredentialState::Expired
            }
        }
    }
}

/// Builds the form parameters and endpoint for the configured grant.
///
/// # Returns
///
/// `(endpoint, form)`, or `Err(CredentialError::MissingField)` when the grant
/// lacks what it needs.
pub fn token_request(
    credential: &OAuth2Credential,
) -> Result<(String, Vec<(String, String)>), CredentialError> {
    let token_url = credential
        .token_url
        .clone()
        .ok_or_else(|| CredentialError::MissingField("token_url".to_string()))?;

    let mut form: Vec<(String, String)> = Vec::new();
    let endpoint = match credential.grant_type {
        GrantType::ClientCredentials => {
            form.push(("grant_type".to_string(), "client_credentials".to_string()));
            token_url
        }
        GrantType::Password => {
            let (Some(username), Some(password)) = (&credential.username, &credential.password)
            else {
                return Err(CredentialError::MissingField(
                    "username and password for password grant".to_string(),
                ));
            };
            form.push(("grant_type".to_string(), "password".to_string()));
            form.push(("username".to_string(), username.clone()));
            form.push(("password".to_string(), password.clone()));
            token_url
        }
        GrantType::RefreshToken => {
            let refresh_token = credential
                .token
                .refresh_token
                .clone()
                .ok_or_else(|| CredentialError::MissingField("refresh_token".to_string()))?;
            form.push(("grant_type".to_string(), "refresh_token".to_string()));
            form.push(("refresh_token".to_string(), refresh_token));
            credential.refresh_url.clone().unwrap_or(token_url)
        }
        GrantType::Unsupported => {
            return Err(CredentialError::RefreshFailed(
                "grant type requires user interaction".to_string(),
            ));
        }
    };

    form.push(("client_id".to_string(), credential.client_id.clone()));
    form.push(("client_secret".to_string(), credential.client_secret.clone()));
    if !credential.scope.is_empty() {
        form.push(("scope".to_string(), credential.scope.join(" ")));
    }

    Ok((endpoint, form))
}

/// Parses a token endpoint answer into the stored token.
///
/// A refresh token missing from the answer keeps the previously stored one.
pub fn parse_token_response(
    body: &str,
    previous: &OAuth2Token,
    now: DateTime<Utc>,
) -> Result<OAuth2Token, CredentialError> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| CredentialError::ExtractionFailed(format!("access_token: {}", e)))?;

    let expires_in = response
        .expires_in
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS as f64);

    Ok(OAuth2Token {
        access_token: Some(response.access_token),
        refresh_token: response.refresh_token.or_else(|| previous.refresh_token.clone()),
        token_type: response.token_type,
        expires_at: Some(now.timestamp() as f64 + expires_in),
    })
}

/// Requests a new token from the endpoint.
pub async fn fetch_token(
    client: &reqwest::Client,
    credential: &OAuth2Credential,
) -> Result<OAuth2Token, CredentialError> {
    let (endpoint, form) = token_request(credential)?;
    debug!("Requesting OAuth2 token from {}", endpoint);

    let response = client
        .post(&endpoint)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(CredentialError::RefreshStatus(status.as_u16()));
    }

    let body = response.text().await?;
    parse_token_response(&body, &credential.token, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(grant_type: GrantType) -> OAuth2Credential {
        OAuth2Credential {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token: OAuth2Token::default(),
            token_url: Some("https://auth.test/token".to_string()),
            refresh_url: None,
            scope: vec!["read".to_string(), "write".to_string()],
            grant_type,
            username: None,
            password: None,
            last_error: None,
        }
    }

    fn form_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_client_credentials_request() {
        let (endpoint, form) = token_request(&credential(GrantType::ClientCredentials)).unwrap();
        assert_eq!(endpoint, "https://auth.test/token");
        assert_eq!(form_value(&form, "grant_type"), Some("client_credentials"));
        assert_eq!(form_value(&form, "client_id"), Some("id"));
        assert_eq!(form_value(&form, "scope"), Some("read write"));
    }

    #[test]
    fn test_password_grant_requires_credentials() {
        let mut cred = credential(GrantType::Password);
        assert!(matches!(
            token_request(&cred),
            Err(CredentialError::MissingField(_))
        ));

        cred.username = Some("u".to_string());
        cred.password = Some("p".to_string());
        let (_, form) = token_request(&cred).unwrap();
        assert_eq!(form_value(&form, "username"), Some("u"));
    }

    #[test]
    fn test_refresh_grant_uses_refresh_url() {
        let mut cred = credential(GrantType::RefreshToken);
        assert!(token_request(&cred).is_err());

        cred.token.refresh_token = Some("r1".to_string());
        cred.refresh_url = Some("https://auth.test/refresh".to_string());
        let (endpoint, form) = token_request(&cred).unwrap();
        assert_eq!(endpoint, "https://auth.test/refresh");
        assert_eq!(form_value(&form, "refresh_token"), Some("r1"));
    }

    #[test]
    fn test_missing_token_url() {
        let mut cred = credential(GrantType::ClientCredentials);
        cred.token_url = None;
        assert_eq!(
            token_request(&cred),
            Err(CredentialError::MissingField("token_url".to_string()))
        );
    }

    #[test]
    fn test_parse_token_response_defaults() {
        let now = Utc::now();
        let previous = OAuth2Token {
            refresh_token: Some("keep".to_string()),
            ..OAuth2Token::default()
        };
        let token = parse_token_response(r#"{"access_token": "a1"}"#, &previous, now).unwrap();

        assert_eq!(token.access_token.as_deref(), Some("a1"));
        assert_eq!(token.refresh_token.as_deref(), Some("keep"));
        assert_eq!(token.expires_at, Some(now.timestamp() as f64 + 3600.0));
    }

    #[test]
    fn test_parse_token_response_without_access_token() {
        let result = parse_token_response(r#"{"error": "invalid_client"}"#, &OAuth2Token::default(), Utc::now());
        assert!(matches!(result, Err(CredentialError::ExtractionFailed(_))));
    }

    #[test]
    fn test_token_state() {
        let now = Utc::now();
        let mut token = OAuth2Token::default();
        assert_eq!(token_state(&token, now), CredentialState::Unfetched);

        token.access_token = Some("a".to_string());
        assert_eq!(token_state(&token, now), CredentialState::Valid);

        token.expires_at = Some((now + Duration::seconds(5)).timestamp() as f64);
        assert_eq!(token_state(&token, now), CredentialState::Expired);

        token.expires_at = Some((now + Duration::seconds(600)).timestamp() as f64);
        assert_eq!(token_state(&token, now), CredentialState::Valid);
    }
}
