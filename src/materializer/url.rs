//! URL synthesis and anchoring.

use super::MaterializeError;
use crate::collection::{StructuredUrl, UrlTemplate};
use crate::variables::VariableScopes;
use std::collections::BTreeSet;

const DEFAULT_PROTOCOL: &str = "https";

/// Resolves a URL template into a single string.
///
/// Structured URLs are synthesized as `protocol://host[:port]/path?query`.
/// A structured URL without a host falls back to its `raw` form.
pub fn build_url(
    template: &UrlTemplate,
    scopes: &VariableScopes,
    unresolved: &mut BTreeSet<String>,
) -> Result<String, MaterializeError> {
    match template {
        UrlTemplate::Raw(raw) => Ok(scopes.resolve_into(raw.trim(), unresolved)),
        UrlTemplate::Structured(url) => build_structured(url, scopes, unresolved),
    }
}

fn build_structured(
    url: &StructuredUrl,
    scopes: &VariableScopes,
    unresolved: &mut BTreeSet<String>,
) -> Result<String, MaterializeError> {
    let host = match &url.host {
        Some(host) if !host.is_blank() => host,
        _ => {
            return match url.raw.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                Some(raw) => Ok(scopes.resolve_into(raw, unresolved)),
                None => Err(MaterializeError::MissingHost),
            };
        }
    };

    let host = scopes.resolve_into(&host.join("."), unresolved);
    let mut out = if host.contains("://") {
        host.trim_end_matches('/').to_string()
    } else {
        let protocol = url
            .protocol
            .as_deref()
            .map(|p| scopes.resolve_into(p, unresolved))
            .map(|p| p.trim_end_matches("://").to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        format!("{}://{}", protocol, host.trim_end_matches('/'))
    };

    if let Some(port) = url.port.as_deref().filter(|p| !p.trim().is_empty()) {
        out.push(':');
        out.push_str(&scopes.resolve_into(port.trim(), unresolved));
    }

    if let Some(path) = &url.path {
        for segment in path.parts() {
            let segment = scopes.resolve_into(segment, unresolved);
            let segment = segment.trim_matches('/');
            if segment.is_empty() {
                continue;
            }
            out.push('/');
            out.push_str(segment);
        }
    }

    let query: Vec<String> = url
        .query
        .iter()
        .filter(|param| !param.disabled)
        .filter_map(|param| {
            let key = param.key.as_deref().filter(|k| !k.is_empty())?;
            let key = scopes.resolve_into(key, unresolved);
            Some(match param.value.as_deref() {
                Some(value) => format!("{}={}", key, scopes.resolve_into(value, unresolved)),
                None => key,
            })
        })
        .collect();
    if !query.is_empty() {
        out.push('?');
        out.push_str(&query.join("&"));
    }

    Ok(out)
}

/// `true` when the URL starts with a `scheme://`.
pub fn is_absolute(url: &str) -> bool {
    match url.find("://") {
        Some(idx) if idx > 0 => url[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        _ => false,
    }
}

/// Normalizes a base URL: adds `https://` when no protocol is given and
/// collapses a doubled protocol prefix.
pub fn normalize_base(base: &str) -> String {
    let base = base.trim();
    let base = collapse_doubled_protocol(base);
    if is_absolute(&base) {
        base
    } else {
        format!("{}://{}", DEFAULT_PROTOCOL, base.trim_start_matches('/'))
    }
}

fn collapse_doubled_protocol(url: &str) -> String {
    let mut current = url;
    loop {
        let Some(idx) = current.find("://") else {
            return current.to_string();
        };
        let rest = &current[idx + 3..];
        if is_absolute(rest) {
            current = rest;
        } else {
            return current.to_string();
        }
    }
}

/// Joins a base URL and a relative path with exactly one `/` between them.
pub fn join_base(base: &str, path: &str) -> String {
    let base = normalize_base(base);
    let path = path.trim();
    if path.is_empty() {
        return base;
    }
    if path.starts_with('?') {
        return format!("{}{}", base.trim_end_matches('/'), path);
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{QueryParam, Segments};
    use std::collections::HashMap;

    fn scopes(pairs: &[(&str, &str)]) -> VariableScopes {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VariableScopes::layered(values, HashMap::new(), ["base_url"])
    }

    fn structured(host: &[&str], path: &[&str]) -> StructuredUrl {
        StructuredUrl {
            host: Some(Segments::Parts(host.iter().map(|s| s.to_string()).collect())),
            path: Some(Segments::Parts(path.iter().map(|s| s.to_string()).collect())),
            ..StructuredUrl::default()
        }
    }

    #[test]
    fn test_structured_url() {
        let mut url = structured(&["api", "{{domain}}"], &["v1", "users", "{{id}}"]);
        url.protocol = Some("http".to_string());
        url.port = Some("8443".to_string());
        url.query = vec![
            QueryParam {
                key: Some("page".to_string()),
                value: Some("{{page}}".to_string()),
                disabled: false,
            },
            QueryParam {
                key: Some("debug".to_string()),
                value: Some("1".to_string()),
                disabled: true,
            },
            QueryParam {
                key: Some("flag".to_string()),
                value: None,
                disabled: false,
            },
        ];

        let mut unresolved = BTreeSet::new();
        let built = build_url(
            &UrlTemplate::Structured(url),
            &scopes(&[("domain", "test"), ("id", "42"), ("page", "2")]),
            &mut unresolved,
        )
        .unwrap();

        assert_eq!(built, "http://api.test:8443/v1/users/42?page=2&flag");
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_host_with_protocol_and_default_protocol() {
        let mut unresolved = BTreeSet::new();
        let url = structured(&["{{api}}"], &["users"]);
        let built = build_url(
            &UrlTemplate::Structured(url.clone()),
            &scopes(&[("api", "http://localhost:3000/")]),
            &mut unresolved,
        )
        .unwrap();
        assert_eq!(built, "http://localhost:3000/users");

        let built = build_url(
            &UrlTemplate::Structured(url),
            &scopes(&[("api", "example.com")]),
            &mut unresolved,
        )
        .unwrap();
        assert_eq!(built, "https://example.com/users");
    }

    #[test]
    fn test_missing_host_uses_raw_or_fails() {
        let mut unresolved = BTreeSet::new();
        let with_raw = StructuredUrl {
            raw: Some("{{base_url}}/ping".to_string()),
            ..StructuredUrl::default()
        };
        let built = build_url(
            &UrlTemplate::Structured(with_raw),
            &scopes(&[("base_url", "https://api.test")]),
            &mut unresolved,
        )
        .unwrap();
        assert_eq!(built, "https://api.test/ping");

        let result = build_url(
            &UrlTemplate::Structured(StructuredUrl::default()),
            &scopes(&[]),
            &mut unresolved,
        );
        assert_eq!(result, Err(MaterializeError::MissingHost));
    }

    #[test]
    fn test_unresolved_names_collected() {
        let mut unresolved = BTreeSet::new();
        build_url(
            &UrlTemplate::Raw("https://{{host}}/{{missing}}".to_string()),
            &scopes(&[]),
            &mut unresolved,
        )
        .unwrap();
        assert_eq!(unresolved.into_iter().collect::<Vec<_>>(), vec!["host", "missing"]);
    }

    #[test]
    fn test_join_base() {
        assert_eq!(join_base("https://api.test/", "/users"), "https://api.test/users");
        assert_eq!(join_base("https://api.test", "users"), "https://api.test/users");
        assert_eq!(join_base("api.test", "users"), "https://api.test/users");
        assert_eq!(join_base("https://api.test", "?q=1"), "https://api.test?q=1");
        assert_eq!(join_base("https://api.test", ""), "https://api.test");
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("https://https://api.test"), "https://api.test");
        assert_eq!(normalize_base("http://api.test"), "http://api.test");
        assert_eq!(normalize_base(" api.test "), "https://api.test");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("https://a"));
        assert!(is_absolute("svn+ssh://a"));
        assert!(!is_absolute("/users"));
        assert!(!is_absolute("{{base_url}}/users"));
        assert!(!is_absolute("://x"));
    }
}
