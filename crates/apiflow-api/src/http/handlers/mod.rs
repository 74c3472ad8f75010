//! HTTP request handlers for the REST API.
//!
//! Every mutating handler resolves the owning workspace and checks the
//! caller's membership before it touches storage.

pub mod auth;
pub mod collection;
pub mod example;
pub mod field;
pub mod flow;
pub mod overlay;
pub mod response;
pub mod run;
pub mod snapshot;
pub mod workspace;

use crate::http::error::AppError;

/// Turn a missing row into a 404 naming `what`.
pub(crate) fn found<T>(row: Option<T>, what: impl std::fmt::Display) -> Result<T, AppError> {
    row.ok_or_else(|| AppError::NotFound(what.to_string()))
}

/// Trimmed, non-empty name or a validation error.
pub(crate) fn required_name(name: &str, what: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{what} name cannot be empty")));
    }
    Ok(name.to_string())
}
