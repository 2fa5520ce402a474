//! Collection document model.
//!
//! A collection is a tree of folders and request templates plus a flat list of
//! collection-scoped variables. It is parsed once from its JSON document and is
//! read-only for the rest of the run:
//!
//! ```json
//! {
//!   "info": {"id": "...", "name": "Demo"},
//!   "item": [
//!     {"name": "Users", "item": [
//!       {"name": "List", "request": {"method": "GET", "url": "{{base_url}}/users"}}
//!     ]}
//!   ],
//!   "variable": [{"key": "base_url", "value": "https://api.test"}]
//! }
//! ```
//!
//! Nodes that are neither folders nor requests are kept as [`Node::Unknown`] so
//! that one malformed entry never fails the whole document; the walker skips them.

pub mod inventory;
pub mod walker;

pub use inventory::{scope_template, variables_used};
pub use walker::{flatten, FlatRequest, FlattenedCollection};

use crate::variables::scope::json_to_string;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Errors that can occur while loading a collection document.
#[derive(Debug)]
pub enum CollectionError {
    /// The document could not be read.
    Io(io::Error),

    /// The document is not valid JSON or does not have the collection shape.
    Parse(String),
}

impl std::fmt::Display for CollectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionError::Io(err) => write!(f, "Failed to read collection: {}", err),
            CollectionError::Parse(msg) => write!(f, "Malformed collection: {}", msg),
        }
    }
}

impl std::error::Error for CollectionError {}

impl From<io::Error> for CollectionError {
    fn from(err: io::Error) -> Self {
        CollectionError::Io(err)
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(err: serde_json::Error) -> Self {
        CollectionError::Parse(err.to_string())
    }
}

/// A loaded collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Identity of the collection.
    #[serde(default)]
    pub info: CollectionInfo,

    /// Top-level nodes in declared order.
    pub item: Vec<Node>,

    /// Collection-scoped variables.
    #[serde(default)]
    pub variable: Vec<CollectionVariable>,
}

impl Collection {
    /// Parses a collection from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CollectionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a collection document from disk.
    pub fn load(path: &Path) -> Result<Self, CollectionError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Returns the enabled collection variables as a map.
    pub fn variables(&self) -> HashMap<String, String> {
        self.variable
            .iter()
            .filter(|v| !v.disabled)
            .map(|v| (v.key.clone(), json_to_string(&v.value)))
            .collect()
    }
}

/// Collection identity block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default, alias = "_postman_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,
}

/// A collection-scoped variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionVariable {
    pub key: String,

    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(default)]
    pub disabled: bool,
}

/// A node of the collection tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// A folder with ordered children.
    Folder(Folder),

    /// A request template.
    Request(RequestItem),

    /// Anything else; skipped during traversal.
    Unknown(serde_json::Value),
}

/// Folder node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default)]
    pub name: String,

    pub item: Vec<Node>,
}

/// Request node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestItem {
    #[serde(default)]
    pub name: String,

    pub request: RequestTemplate,
}

/// Templated request definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// Method; `None` means GET.
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub url: Option<UrlTemplate>,

    #[serde(default)]
    pub header: Vec<HeaderTemplate>,

    #[serde(default)]
    pub body: Option<BodyTemplate>,
}

/// URL template: a raw string or the structured form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlTemplate {
    Raw(String),
    Structured(StructuredUrl),
}

/// Structured URL: `{protocol, host, port, path, query}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredUrl {
    #[serde(default)]
    pub raw: Option<String>,

    #[serde(default)]
    pub protocol: Option<String>,

    #[serde(default)]
    pub host: Option<Segments>,

    #[serde(default)]
    pub port: Option<String>,

    #[serde(default)]
    pub path: Option<Segments>,

    #[serde(default)]
    pub query: Vec<QueryParam>,
}

/// Host or path given either pre-joined or as separate segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segments {
    Joined(String),
    Parts(Vec<String>),
}

impl Segments {
    /// Joins the segments with `separator`.
    pub fn join(&self, separator: &str) -> String {
        match self {
            Segments::Joined(s) => s.clone(),
            Segments::Parts(parts) => parts.join(separator),
        }
    }

    /// Returns the individual segments.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Segments::Joined(s) => vec![s.as_str()],
            Segments::Parts(parts) => parts.iter().map(String::as_str).collect(),
        }
    }

    /// `true` when there is no non-empty segment.
    pub fn is_blank(&self) -> bool {
        self.parts().iter().all(|p| p.trim().is_empty())
    }
}

/// Query parameter of a structured URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub disabled: bool,
}

/// Header template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderTemplate {
    pub key: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub disabled: bool,
}

/// Body discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    #[default]
    Raw,
    Urlencoded,
    Formdata,
    /// Modes this tool does not replay (file, graphql, ...).
    #[serde(other)]
    Unsupported,
}

/// Body template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyTemplate {
    #[serde(default)]
    pub mode: BodyMode,

    #[serde(default)]
    pub raw: Option<String>,

    #[serde(default)]
    pub urlencoded: Vec<FormParam>,

    #[serde(default)]
    pub formdata: Vec<FormParam>,
}

/// Form field of a url-encoded or multipart body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormParam {
    pub key: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub disabled: bool,

    /// `text` or `file`; file fields are not replayed.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl FormParam {
    /// `true` for enabled text fields.
    pub fn is_replayable(&self) -> bool {
        !self.disabled && self.kind.as_deref().map_or(true, |k| k == "text")
    }
}
