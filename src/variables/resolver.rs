//! Placeholder substitution over layered variable scopes.
//!
//! Replaces `{{name}}` occurrences with values looked up across an ordered list
//! of scopes, highest precedence first. Substitution is a single pass over the
//! input: substituted values are never re-scanned, so a value that itself
//! contains `{{...}}` is inserted verbatim and cannot cause a loop.
//!
//! Built-in placeholders (`{{$guid}}`, `{{$timestamp}}`, ...) are passed through
//! unchanged for the receiving tooling to expand.

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Matches `{{name}}` where `name` contains no braces.
static VARIABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("Failed to compile variable regex"));

/// Substrings marking a variable name as sensitive in log output.
const SENSITIVE_MARKERS: &[&str] = &["token", "key", "secret", "password"];

/// What to substitute for a placeholder no scope defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedPolicy {
    /// Keep the `{{name}}` text as-is.
    #[default]
    KeepLiteral,
    /// Substitute an empty string.
    Empty,
}

/// A named source of variable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub name: String,
    pub values: HashMap<String, String>,
}

impl Scope {
    pub fn new(name: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Ordered variable scopes plus the passthrough whitelist.
///
/// Precedence is the order scopes were added: the first scope that defines a
/// name wins. Names in the passthrough whitelist that no scope defines are
/// kept literally without a warning.
#[derive(Debug, Clone, Default)]
pub struct VariableScopes {
    scopes: Vec<Scope>,
    passthrough: HashSet<String>,
    policy: UnresolvedPolicy,
}

impl VariableScopes {
    /// Creates an empty scope list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard layering: active profile values over collection variables.
    ///
    /// # Arguments
    ///
    /// * `profile` - Values of the active scope document
    /// * `collection` - Collection-level variables
    /// * `passthrough` - Names preserved literally when unresolved
    pub fn layered<I, S>(
        profile: HashMap<String, String>,
        collection: HashMap<String, String>,
        passthrough: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new()
            .with_scope(Scope::new("profile", profile))
            .with_scope(Scope::new("collection", collection))
            .with_passthrough(passthrough)
    }

    /// Appends a scope with lower precedence than every scope already present.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Adds names to the passthrough whitelist.
    pub fn with_passthrough<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the policy for unresolved, non-whitelisted placeholders.
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scopes in precedence order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Looks a name up across the scopes in precedence order.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .find_map(|scope| scope.values.get(name))
            .map(String::as_str)
    }

    /// `true` when `name` is on the passthrough whitelist.
    pub fn is_passthrough(&self, name: &str) -> bool {
        self.passthrough.contains(name)
    }

    /// Substitutes every placeholder in `text`, logging one warning per
    /// unresolved, non-whitelisted name.
    pub fn resolve(&self, text: &str) -> String {
        let mut unresolved = BTreeSet::new();
        let resolved = self.resolve_into(text, &mut unresolved);
        for name in &unresolved {
            warn!("Unresolved variable '{{{{{}}}}}' left in request", name);
        }
        resolved
    }

    /// Substitutes every placeholder in `text` without logging.
    ///
    /// Names that no scope defines and that are not whitelisted are added to
    /// `unresolved` so the caller can report them once per request.
    ///
    /// # Returns
    ///
    /// The substituted text. Placeholders are replaced exactly once; the
    /// replacement text is never scanned again.
    pub fn resolve_into(&self, text: &str, unresolved: &mut BTreeSet<String>) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }

        VARIABLE_REGEX
            .replace_all(text, |caps: &Captures<'_>| -> String {
                let full = &caps[0];
                let name = caps[1].trim();

                if name.starts_with('$') {
                    return full.to_string();
                }
                if let Some(value) = self.lookup(name) {
                    return value.to_string();
                }
                if self.is_passthrough(name) {
                    return full.to_string();
                }

                unresolved.insert(name.to_string());
                match self.policy {
                    UnresolvedPolicy::KeepLiteral => full.to_string(),
                    UnresolvedPolicy::Empty => String::new(),
                }
            })
            .into_owned()
    }
}

/// Iterates the trimmed placeholder names in `text`, built-ins included.
pub fn placeholder_names(text: &str) -> impl Iterator<Item = &str> {
    VARIABLE_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns `true` if the variable name looks like it holds a secret.
pub fn is_sensitive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Masks a variable value for logging when its name looks sensitive.
pub fn mask_sensitive<'a>(name: &str, value: &'a str) -> &'a str {
    if is_sensitive(name) {
        "********"
    } else {
        value
    }
}
