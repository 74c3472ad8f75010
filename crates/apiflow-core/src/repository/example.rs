//! Examples and their ordered child rows.

use apiflow_types::collection::{Assertion, Example, FieldKind, KeyValue, RawBody};
use apiflow_types::error::RepositoryError;
use apiflow_types::id::{AssertId, EndpointId, ExampleId, FieldId};
use apiflow_types::overlay::MovePosition;

pub trait ExampleRepository: Send + Sync {
    /// Insert and append to the endpoint's example list. The first example
    /// of an endpoint becomes its default.
    fn create_example(
        &self,
        example: &Example,
    ) -> impl std::future::Future<Output = Result<Example, RepositoryError>> + Send;

    fn get_example(
        &self,
        id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<Option<Example>, RepositoryError>> + Send;

    fn list_examples(
        &self,
        endpoint_id: &EndpointId,
    ) -> impl std::future::Future<Output = Result<Vec<Example>, RepositoryError>> + Send;

    fn update_example(
        &self,
        example: &Example,
    ) -> impl std::future::Future<Output = Result<Example, RepositoryError>> + Send;

    /// Delete and unlink. Deleting the default promotes the list head.
    fn delete_example(
        &self,
        id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Clear the flag on every sibling and set it on `id`.
    fn set_default_example(
        &self,
        id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_fields(
        &self,
        kind: FieldKind,
        example_id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<Vec<KeyValue>, RepositoryError>> + Send;

    fn get_field(
        &self,
        kind: FieldKind,
        id: &FieldId,
    ) -> impl std::future::Future<Output = Result<Option<KeyValue>, RepositoryError>> + Send;

    /// Insert at the tail of the example's list.
    fn append_field(
        &self,
        kind: FieldKind,
        field: &KeyValue,
    ) -> impl std::future::Future<Output = Result<KeyValue, RepositoryError>> + Send;

    /// Insert `fields` after the current tail, linked in the order given.
    fn bulk_append_fields(
        &self,
        kind: FieldKind,
        example_id: &ExampleId,
        fields: &[KeyValue],
    ) -> impl std::future::Future<Output = Result<Vec<KeyValue>, RepositoryError>> + Send;

    /// Update content columns; links are left alone.
    fn update_field(
        &self,
        kind: FieldKind,
        field: &KeyValue,
    ) -> impl std::future::Future<Output = Result<KeyValue, RepositoryError>> + Send;

    fn delete_field(
        &self,
        kind: FieldKind,
        id: &FieldId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn move_field(
        &self,
        kind: FieldKind,
        id: &FieldId,
        target: &FieldId,
        position: MovePosition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_asserts(
        &self,
        example_id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<Vec<Assertion>, RepositoryError>> + Send;

    fn append_assert(
        &self,
        assertion: &Assertion,
    ) -> impl std::future::Future<Output = Result<Assertion, RepositoryError>> + Send;

    fn update_assert(
        &self,
        assertion: &Assertion,
    ) -> impl std::future::Future<Output = Result<Assertion, RepositoryError>> + Send;

    fn delete_assert(
        &self,
        id: &AssertId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn move_assert(
        &self,
        id: &AssertId,
        target: &AssertId,
        position: MovePosition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_raw_body(
        &self,
        example_id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<Option<RawBody>, RepositoryError>> + Send;

    fn put_raw_body(
        &self,
        body: &RawBody,
    ) -> impl std::future::Future<Output = Result<RawBody, RepositoryError>> + Send;
}
