//! Per-kind delta overlay operations.
//!
//! Implemented once for each overlayed field family (headers, queries,
//! url-encoded fields, assertions). Every operation takes the delta
//! example and its origin so the order table can be seeded on demand.

use apiflow_types::id::ExampleId;
use apiflow_types::overlay::{MovePosition, OverlayItem, OverlayKind};
use uuid::Uuid;

use crate::overlay::{OverlayError, OverlayFields};

pub trait DeltaOverlay: Send + Sync {
    type Fields: OverlayFields;

    fn kind(&self) -> OverlayKind;

    /// Create order rows for every origin row not yet referenced. Running
    /// it on an already seeded example only appends late parent rows.
    fn seed(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<(), OverlayError>> + Send;

    /// The effective list, seeding first when needed.
    fn list(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
    ) -> impl std::future::Future<Output = Result<Vec<OverlayItem<Self::Fields>>, OverlayError>> + Send;

    /// Append a delta-only row.
    fn create(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        fields: Self::Fields,
    ) -> impl std::future::Future<Output = Result<OverlayItem<Self::Fields>, OverlayError>> + Send;

    /// Override fields of an origin row, or edit a delta-only row in place.
    fn update(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
        patch: <Self::Fields as OverlayFields>::Patch,
    ) -> impl std::future::Future<Output = Result<OverlayItem<Self::Fields>, OverlayError>> + Send;

    /// Drop every override of an origin row, or blank a delta-only row.
    fn reset(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), OverlayError>> + Send;

    /// Suppress an origin row, or remove a delta-only row.
    fn delete(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), OverlayError>> + Send;

    /// Lift a suppression, returning the row to its previous position.
    fn restore(
        &self,
        example_id: &ExampleId,
        item_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), OverlayError>> + Send;

    fn move_item(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
        target_id: Uuid,
        position: MovePosition,
    ) -> impl std::future::Future<Output = Result<(), OverlayError>> + Send;
}
