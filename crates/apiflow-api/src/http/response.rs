//! Envelope response format for all API responses.
//!
//! Every response is wrapped in a consistent envelope:
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "..." }
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use axum::Json;
use serde::Serialize;

use crate::http::error::AppError;

/// Envelope response wrapping all API data.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    /// Error list (empty on success). Failures are rendered by `AppError`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<serde_json::Value>,

    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, request_id: String, response_time_ms: u64) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta {
                request_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                response_time_ms,
            },
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_string(), href.to_string());
        self
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Wrap `data` in a success envelope timed from `start`.
pub fn ok<T: Serialize>(data: T, start: Instant) -> Json<ApiResponse<T>> {
    let request_id = uuid::Uuid::now_v7().to_string();
    Json(ApiResponse::success(data, request_id, start.elapsed().as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_empty_sections() {
        let resp = ApiResponse::success(serde_json::json!({"id": 1}), "r1".into(), 3);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["data"]["id"], 1);
        assert_eq!(json["meta"]["request_id"], "r1");
        assert!(json.get("errors").is_none());
        assert!(json.get("_links").is_none());

        let json = serde_json::to_value(resp.with_link("self", "/api/v1/x")).unwrap();
        assert_eq!(json["_links"]["self"], "/api/v1/x");
    }
}
