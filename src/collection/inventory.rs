//! Variable inventory of a collection.
//!
//! Lists the placeholders a collection references so a caller can build (or
//! check) a scope document before a run.

use super::{BodyTemplate, Collection, Node, RequestTemplate, UrlTemplate};
use crate::variables::resolver::placeholder_names;
use crate::variables::scope::json_to_string;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Returns every variable name referenced anywhere in the collection.
///
/// Covers URLs (raw and structured parts), header keys and values, bodies and
/// collection variable values. Built-in `$` names are excluded.
pub fn variables_used(collection: &Collection) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for variable in &collection.variable {
        collect(&json_to_string(&variable.value), &mut names);
    }

    let mut stack: Vec<&Node> = collection.item.iter().collect();
    while let Some(node) = stack.pop() {
        match node {
            Node::Folder(folder) => stack.extend(folder.item.iter()),
            Node::Request(item) => collect_request(&item.request, &mut names),
            Node::Unknown(_) => {}
        }
    }

    names
}

/// Builds an empty scope document listing every referenced variable.
///
/// The document uses the `values` shape with each entry enabled and an empty
/// value, ready to be filled in.
pub fn scope_template(collection: &Collection) -> Value {
    let values: Vec<Value> = variables_used(collection)
        .into_iter()
        .map(|key| json!({"key": key, "value": "", "enabled": true}))
        .collect();

    json!({
        "name": format!("{} variables", collection.info.name),
        "values": values,
    })
}

fn collect(text: &str, names: &mut BTreeSet<String>) {
    for name in placeholder_names(text) {
        if !name.starts_with('$') {
            names.insert(name.to_string());
        }
    }
}

fn collect_request(request: &RequestTemplate, names: &mut BTreeSet<String>) {
    if let Some(method) = &request.method {
        collect(method, names);
    }

    match &request.url {
        Some(UrlTemplate::Raw(raw)) => collect(raw, names),
        Some(UrlTemplate::Structured(url)) => {
            let parts = [&url.raw, &url.protocol, &url.port];
            for part in parts.into_iter().flatten() {
                collect(part, names);
            }
            for segments in [&url.host, &url.path].into_iter().flatten() {
                for part in segments.parts() {
                    collect(part, names);
                }
            }
            for param in &url.query {
                for part in [&param.key, &param.value].into_iter().flatten() {
                    collect(part, names);
                }
            }
        }
        None => {}
    }

    for header in &request.header {
        collect(&header.key, names);
        collect(&header.value, names);
    }

    if let Some(body) = &request.body {
        collect_body(body, names);
    }
}

fn collect_body(body: &BodyTemplate, names: &mut BTreeSet<String>) {
    if let Some(raw) = &body.raw {
        collect(raw, names);
    }
    for param in body.urlencoded.iter().chain(body.formdata.iter()) {
        collect(&param.key, names);
        if let Some(value) = &param.value {
            collect(value, names);
        }
    }
}
