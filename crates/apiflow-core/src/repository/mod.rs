//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that apiflow-infra
//! implements. The core crate never depends on a storage technology.
//! Ordered children (collection items, example fields, assertions) are
//! returned in list order; implementations own the prev/next rewiring.

pub mod collection;
pub mod example;
pub mod flow;
pub mod overlay;
pub mod response;
pub mod workspace;

pub use collection::CollectionRepository;
pub use example::ExampleRepository;
pub use flow::FlowRepository;
pub use overlay::DeltaOverlay;
pub use response::ResponseRepository;
pub use workspace::WorkspaceRepository;
