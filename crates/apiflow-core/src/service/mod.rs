//! Business logic services (use cases).
//!
//! Services orchestrate repository calls and business rules. They depend on
//! traits (ports), never on concrete infrastructure implementations.

pub mod example;
pub mod flow;
pub mod workspace;

use apiflow_types::error::RepositoryError;

use crate::flow::FlowError;

pub use example::ExampleService;
pub use flow::{FlowService, seed_variables, summarize};
pub use workspace::WorkspaceService;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Flow(FlowError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound("entity".into()),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            RepositoryError::Invalid(msg) => ServiceError::Invalid(msg),
            other => ServiceError::Repository(other),
        }
    }
}

impl From<FlowError> for ServiceError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::FlowNotFound(id) => ServiceError::NotFound(format!("flow {id}")),
            FlowError::NodeNotFound(id) => ServiceError::NotFound(format!("node {id}")),
            FlowError::Repository(e) => e.into(),
            other => ServiceError::Flow(other),
        }
    }
}
