//! Variable scopes and placeholder substitution.
//!
//! This module loads scope documents, applies per-variable encodings and
//! resolves `{{name}}` placeholders across the layered scopes.

pub mod encoding;
pub mod resolver;
pub mod scope;

pub use encoding::Encoding;
pub use resolver::{
    is_sensitive, mask_sensitive, placeholder_names, Scope, UnresolvedPolicy, VariableScopes,
};
pub use scope::{json_to_string, load_scope, parse_scope, ScopeError};
