//! Body materialization by mode.

use crate::collection::{BodyMode, BodyTemplate, FormParam};
use crate::models::PreparedBody;
use crate::variables::VariableScopes;
use log::debug;
use std::collections::BTreeSet;

/// Materializes a body template.
///
/// Raw text is substituted and passed through verbatim; a blank raw body
/// sends nothing. Form modes keep enabled text fields in declared order.
/// Unsupported modes (file uploads, GraphQL) send no body.
pub fn build_body(
    template: Option<&BodyTemplate>,
    scopes: &VariableScopes,
    unresolved: &mut BTreeSet<String>,
) -> PreparedBody {
    let Some(template) = template else {
        return PreparedBody::None;
    };

    match template.mode {
        BodyMode::Raw => match template.raw.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                PreparedBody::Raw(scopes.resolve_into(raw, unresolved))
            }
            _ => PreparedBody::None,
        },
        BodyMode::Urlencoded => {
            PreparedBody::UrlEncoded(form_pairs(&template.urlencoded, scopes, unresolved))
        }
        BodyMode::Formdata => {
            PreparedBody::Multipart(form_pairs(&template.formdata, scopes, unresolved))
        }
        BodyMode::Unsupported => {
            debug!("Body mode not replayed; sending without body");
            PreparedBody::None
        }
    }
}

fn form_pairs(
    params: &[FormParam],
    scopes: &VariableScopes,
    unresolved: &mut BTreeSet<String>,
) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|p| p.is_replayable() && !p.key.is_empty())
        .map(|p| {
            (
                scopes.resolve_into(&p.key, unresolved),
                scopes.resolve_into(p.value.as_deref().unwrap_or_default(), unresolved),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scopes() -> VariableScopes {
        let values: HashMap<String, String> = [("user".to_string(), "ann".to_string())]
            .into_iter()
            .collect();
        VariableScopes::layered(values, HashMap::new(), Vec::<String>::new())
    }

    fn param(key: &str, value: &str, disabled: bool, kind: Option<&str>) -> FormParam {
        FormParam {
            key: key.to_string(),
            value: Some(value.to_string()),
            disabled,
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_raw_body_verbatim() {
        let template = BodyTemplate {
            raw: Some("  {\"user\": \"{{user}}\", \"v\": \"{{other}}\"}\n".to_string()),
            ..BodyTemplate::default()
        };
        let mut unresolved = BTreeSet::new();
        let body = build_body(Some(&template), &scopes(), &mut unresolved);

        assert_eq!(
            body,
            PreparedBody::Raw("  {\"user\": \"ann\", \"v\": \"{{other}}\"}\n".to_string())
        );
        assert!(unresolved.contains("other"));
    }

    #[test]
    fn test_blank_raw_body() {
        let template = BodyTemplate {
            raw: Some("   ".to_string()),
            ..BodyTemplate::default()
        };
        let body = build_body(Some(&template), &scopes(), &mut BTreeSet::new());
        assert!(body.is_none());
        assert!(build_body(None, &scopes(), &mut BTreeSet::new()).is_none());
    }

    #[test]
    fn test_urlencoded_skips_disabled() {
        let template = BodyTemplate {
            mode: BodyMode::Urlencoded,
            urlencoded: vec![
                param("name", "{{user}}", false, None),
                param("debug", "1", true, None),
                param("", "orphan", false, None),
            ],
            ..BodyTemplate::default()
        };
        let body = build_body(Some(&template), &scopes(), &mut BTreeSet::new());
        assert_eq!(
            body,
            PreparedBody::UrlEncoded(vec![("name".to_string(), "ann".to_string())])
        );
    }

    #[test]
    fn test_formdata_keeps_text_fields() {
        let template = BodyTemplate {
            mode: BodyMode::Formdata,
            formdata: vec![
                param("avatar", "/tmp/a.png", false, Some("file")),
                param("bio", "hi {{user}}", false, Some("text")),
            ],
            ..BodyTemplate::default()
        };
        let body = build_body(Some(&template), &scopes(), &mut BTreeSet::new());
        assert_eq!(
            body,
            PreparedBody::Multipart(vec![("bio".to_string(), "hi ann".to_string())])
        );
    }

    #[test]
    fn test_unsupported_mode() {
        let template = BodyTemplate {
            mode: BodyMode::Unsupported,
            raw: Some("ignored".to_string()),
            ..BodyTemplate::default()
        };
        assert!(build_body(Some(&template), &scopes(), &mut BTreeSet::new()).is_none());
    }
}
