//! Request assembly, cURL export and error presentation.

pub mod build;
pub mod classify;
pub mod curl;
pub mod friendly;

pub use build::{ResolvedBody, ResolvedExample, Substitutions, build_request, normalize_method, validate_url};
pub use classify::{TransportPhase, classify_error, classify_request_error, classify_transport_error};
pub use curl::to_curl;
pub use friendly::friendly_message;
