//! Captured responses of executed examples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertResult;
use crate::id::{ExampleId, ResponseHeaderId, ResponseId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResponse {
    pub id: ResponseId,
    pub example_id: ExampleId,
    pub status: u16,
    pub body: Vec<u8>,
    pub duration_ms: u64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub id: ResponseHeaderId,
    pub response_id: ResponseId,
    pub key: String,
    pub value: String,
}

/// A response with its headers and assertion outcomes, persisted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub response: ExampleResponse,
    pub headers: Vec<ResponseHeader>,
    pub assert_results: Vec<AssertResult>,
}
