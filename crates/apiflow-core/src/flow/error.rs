use apiflow_types::error::{CodedError, ErrorCode, RepositoryError};
use apiflow_types::id::{FlowId, NodeId};

/// Errors raised before or around a run, as opposed to node failures,
/// which are carried as [`CodedError`] on the node result.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("flow has no start node")]
    NoStartNode,

    #[error("flow has more than one start node")]
    MultipleStartNodes,

    #[error("invalid flow graph: {0}")]
    InvalidGraph(String),

    #[error("cycle detected involving node '{0}'")]
    CycleDetected(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failures of the script sandbox.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("script syntax error: {0}")]
    Syntax(String),

    #[error("script error: {0}")]
    Runtime(String),

    #[error("script exceeded its time limit")]
    Timeout,

    #[error("script canceled")]
    Canceled,
}

impl From<ScriptError> for CodedError {
    fn from(err: ScriptError) -> Self {
        let code = match &err {
            ScriptError::Syntax(_) => ErrorCode::ExpressionSyntax,
            ScriptError::Runtime(_) => ErrorCode::ExpressionRuntime,
            ScriptError::Timeout => ErrorCode::Timeout,
            ScriptError::Canceled => ErrorCode::Canceled,
        };
        CodedError::new(code, err.to_string())
    }
}
