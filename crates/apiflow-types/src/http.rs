//! Transport-neutral HTTP request and response values exchanged between the
//! request builder and the HTTP executor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    #[default]
    Empty,
    Raw { data: Vec<u8> },
    UrlEncoded { fields: Vec<(String, String)> },
    Multipart { fields: Vec<(String, String)> },
}

/// A fully assembled request, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// What came back on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub duration_ms: u64,
}

impl HttpResponse {
    /// Body decoded as JSON, falling back to a string when it is not JSON.
    pub fn body_value(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&self.body).into_owned())
        })
    }

    /// The value tree assertions and later nodes see:
    /// `{ status, headers: {name: value}, body, duration_ms }`.
    pub fn to_value(&self) -> serde_json::Value {
        let mut headers = serde_json::Map::new();
        for (k, v) in &self.headers {
            headers.insert(k.to_ascii_lowercase(), serde_json::Value::String(v.clone()));
        }
        serde_json::json!({
            "status": self.status,
            "headers": headers,
            "body": self.body_value(),
            "duration_ms": self.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_value_exposes_json_body_and_lowercase_headers() {
        let resp = HttpResponse {
            status: 201,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: br#"{"id": 7}"#.to_vec(),
            duration_ms: 12,
        };
        let v = resp.to_value();
        assert_eq!(v["status"], 201);
        assert_eq!(v["headers"]["content-type"], "application/json");
        assert_eq!(v["body"]["id"], 7);
    }

    #[test]
    fn non_json_body_becomes_string() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![],
            body: b"plain text".to_vec(),
            duration_ms: 0,
        };
        assert_eq!(resp.body_value(), serde_json::json!("plain text"));
    }
}
