//! API key placement.
//!
//! A key goes into a header, a query parameter or a cookie. Existing entries
//! with the same name are replaced so the profile always wins over whatever
//! the request template declared.

use super::{CredentialError, KeyPlacement};
use crate::models::PreparedRequest;
use url::form_urlencoded::{self, byte_serialize};
use url::Url;

/// Applies an API key to the request.
///
/// # Arguments
///
/// * `request` - Fully materialized request
/// * `placement` - Header, query or cookie
/// * `name` - Header, parameter or cookie name
/// * `value` - The key
///
/// # Returns
///
/// `Err(CredentialError::InvalidRequest)` when a query placement meets a URL
/// that cannot be parsed.
pub fn apply_api_key(
    request: &mut PreparedRequest,
    placement: KeyPlacement,
    name: &str,
    value: &str,
) -> Result<(), CredentialError> {
    match placement {
        KeyPlacement::Header => {
            request.set_header(name, value);
            Ok(())
        }
        KeyPlacement::Query => {
            request.url = set_query_param(&request.url, name, value)?;
            Ok(())
        }
        KeyPlacement::Cookie => {
            let cookie = merge_cookie(request.header("Cookie"), name, value);
            request.set_header("Cookie", cookie);
            Ok(())
        }
    }
}

/// Sets `name=value` in the URL query, replacing existing occurrences.
///
/// Other query segments keep their original bytes, including their
/// percent-encoding, order and valueless flags.
fn set_query_param(url: &str, name: &str, value: &str) -> Result<String, CredentialError> {
    let mut parsed = Url::parse(url)
        .map_err(|e| CredentialError::InvalidRequest(format!("{}: {}", url, e)))?;

    let mut segments: Vec<String> = parsed
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !has_key(segment, name))
        .map(str::to_string)
        .collect();
    segments.push(format!(
        "{}={}",
        byte_serialize(name.as_bytes()).collect::<String>(),
        byte_serialize(value.as_bytes()).collect::<String>()
    ));

    let query = segments.join("&");
    parsed.set_query(Some(&query));
    Ok(parsed.to_string())
}

/// Whether a raw `key=value` segment carries `name` once decoded.
fn has_key(segment: &str, name: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map_or(false, |(key, _)| key == name)
}

/// Adds or replaces a cookie in a `Cookie` header value.
fn merge_cookie(existing: Option<&str>, name: &str, value: &str) -> String {
    let mut cookies: Vec<String> = existing
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .filter(|c| c.split('=').next().map(str::trim) != Some(name))
        .map(str::to_string)
        .collect();
    cookies.push(format!("{}={}", name, value));
    cookies.join("; ")
}
