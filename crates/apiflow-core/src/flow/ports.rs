//! Collaborators the runtime calls out to.
//!
//! These are object-safe (boxed futures) so a run can hold them behind
//! `Arc<dyn ..>` without being generic over storage or transport.

use std::sync::Arc;
use std::time::Duration;

use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::{CodedError, RepositoryError};
use apiflow_types::event::LogEvent;
use apiflow_types::flow::NodeExecution;
use apiflow_types::http::{HttpRequest, HttpResponse};
use apiflow_types::id::{AssertId, EndpointId, ExampleId};
use apiflow_types::response::CapturedResponse;
use serde_json::Value;

use crate::assertion::AssertionEvaluator;
use crate::event::EventBus;
use crate::request::ResolvedExample;

use super::error::ScriptError;
use super::varmap::VarMap;

pub use futures_util::future::BoxFuture;

/// What a request node points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTarget {
    pub endpoint_id: Option<EndpointId>,
    pub example_id: Option<ExampleId>,
    /// Endpoint whose method and URL override the base endpoint's.
    pub delta_endpoint_id: Option<EndpointId>,
    /// Delta example whose overlay is used instead of the base example.
    pub delta_example_id: Option<ExampleId>,
}

/// A request ready to build, with the assertions to run on its response.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// The example the captured response is stored against.
    pub example_id: ExampleId,
    pub example: ResolvedExample,
    pub asserts: Vec<(AssertId, AssertCondition)>,
}

/// Loads an endpoint/example pair and materialises its effective rows.
pub trait ExampleResolver: Send + Sync {
    fn resolve<'a>(&'a self, target: &'a RequestTarget) -> BoxFuture<'a, Result<PreparedRequest, CodedError>>;
}

pub trait HttpExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a HttpRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, CodedError>>;
}

/// Sandboxed script interpreter with `getVal`/`setVal` bound to `vars`.
pub trait ScriptEngine: Send + Sync {
    fn run<'a>(&'a self, code: &'a str, vars: VarMap, timeout: Duration) -> BoxFuture<'a, Result<Value, ScriptError>>;
}

/// Persists what a run produces.
pub trait ExecutionRecorder: Send + Sync {
    fn record_execution<'a>(&'a self, execution: &'a NodeExecution) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn record_response<'a>(&'a self, captured: &'a CapturedResponse) -> BoxFuture<'a, Result<(), RepositoryError>>;
}

/// Everything a node may call, shared by all runs of a runner.
pub struct RuntimeServices {
    pub resolver: Arc<dyn ExampleResolver>,
    pub http: Arc<dyn HttpExecutor>,
    pub scripts: Arc<dyn ScriptEngine>,
    pub recorder: Arc<dyn ExecutionRecorder>,
    pub assertions: AssertionEvaluator,
    pub logs: Option<EventBus<LogEvent>>,
}

impl std::fmt::Debug for RuntimeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeServices")
            .field("logs", &self.logs)
            .finish_non_exhaustive()
    }
}
