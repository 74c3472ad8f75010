//! HTTP/REST API layer for apiflow.
//!
//! Axum-based REST API at `/api/v1/` with bearer token authentication,
//! envelope response format, SSE streams for flow runs, workspace logs and
//! sync events, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
