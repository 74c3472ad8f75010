//! Captured responses and assertion outcomes.

use apiflow_types::error::RepositoryError;
use apiflow_types::id::{ExampleId, ResponseId};
use apiflow_types::response::{CapturedResponse, ExampleResponse};

pub trait ResponseRepository: Send + Sync {
    /// Store the response with its headers and assertion results atomically.
    fn save_response(
        &self,
        captured: &CapturedResponse,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_response(
        &self,
        id: &ResponseId,
    ) -> impl std::future::Future<Output = Result<Option<CapturedResponse>, RepositoryError>> + Send;

    /// Responses of an example, newest first.
    fn list_responses(
        &self,
        example_id: &ExampleId,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<ExampleResponse>, RepositoryError>> + Send;
}
