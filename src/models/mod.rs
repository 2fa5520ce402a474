//! Data models for prepared requests and replay results.
//!
//! This module contains the concrete request form handed to the dispatcher and
//! the result structures accumulated over a run.

pub mod request;
pub mod result;

pub use request::{HttpMethod, PreparedBody, PreparedRequest};
pub use result::{is_success_status, RequestResult, ResultDocument, ResultSet, RunMetadata};
