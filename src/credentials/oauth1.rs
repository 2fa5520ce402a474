//! OAuth 1.0a request signing (RFC 5849).
//!
//! The signature covers the method, the base URL, every query parameter, the
//! parameters of a url-encoded body and the protocol parameters, so signing
//! must happen on the fully materialized request.

use super::{CredentialError, OAuth1Credential, SignatureMethod};
use crate::models::{PreparedBody, PreparedRequest};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters are the only ones left unencoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const NONCE_LENGTH: usize = 32;

/// Percent-encodes a value the way OAuth1 requires.
pub fn oauth_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Generates a random alphanumeric nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Builds the `Authorization: OAuth ...` value for a request.
///
/// # Arguments
///
/// * `credential` - Consumer and token credentials
/// * `request` - The materialized request to sign
/// * `nonce` - Unique nonce for this request
/// * `timestamp` - Seconds since the Unix epoch
///
/// # Returns
///
/// The header value, or `Err(CredentialError::InvalidRequest)` if the request
/// URL cannot be parsed.
pub fn authorization_header(
    credential: &OAuth1Credential,
    request: &PreparedRequest,
    nonce: &str,
    timestamp: i64,
) -> Result<String, CredentialError> {
    let url = Url::parse(&request.url)
        .map_err(|e| CredentialError::InvalidRequest(format!("{}: {}", request.url, e)))?;

    let mut oauth_params: Vec<(String, String)> = vec![
        ("oauth_consumer_key".to_string(), credential.client_key.clone()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        (
            "oauth_signature_method".to_string(),
            credential.signature_method.as_str().to_string(),
        ),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
    ];
    if let Some(token) = &credential.resource_owner_key {
        oauth_params.push(("oauth_token".to_string(), token.clone()));
    }
    oauth_params.push(("oauth_version".to_string(), "1.0".to_string()));

    let mut all_params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let PreparedBody::UrlEncoded(pairs) = &request.body {
        all_params.extend(pairs.iter().cloned());
    }
    all_params.extend(oauth_params.iter().cloned());

    let key = signing_key(
        &credential.client_secret,
        credential.resource_owner_secret.as_deref(),
    );
    let signature = match credential.signature_method {
        SignatureMethod::HmacSha1 => {
            let base = signature_base_string(request.method.as_str(), &url, &all_params);
            hmac_sha1(&key, &base)?
        }
        SignatureMethod::Plaintext => key,
    };
    oauth_params.push(("oauth_signature".to_string(), signature));
    oauth_params.sort();

    let fields: Vec<String> = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", oauth_encode(k), oauth_encode(v)))
        .collect();
    Ok(format!("OAuth {}", fields.join(", ")))
}

/// Builds the signature base string: `METHOD&base_url&params`.
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (oauth_encode(k), oauth_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        oauth_encode(&base_url(url)),
        oauth_encode(&normalized)
    )
}

/// `scheme://host[:port]/path`, with default ports omitted.
fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        oauth_encode(consumer_secret),
        oauth_encode(token_secret.unwrap_or_default())
    )
}

fn hmac_sha1(key: &str, data: &str) -> Result<String, CredentialError> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| CredentialError::InvalidRequest(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
