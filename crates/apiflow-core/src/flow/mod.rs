//! Flow runtime.
//!
//! A flow is a DAG of nodes. The runner starts at the start node and
//! follows labelled edges; loop nodes drive their `loop` chains once per
//! iteration before moving on.

pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod ports;
pub mod runner;
pub mod varmap;

pub use context::{EventSink, FlowNodeRequest};
pub use error::{FlowError, ScriptError};
pub use graph::FlowGraph;
pub use node::{FlowNodeResult, SCRIPT_TIMEOUT, execute_node, run_chain};
pub use ports::{
    BoxFuture, ExampleResolver, ExecutionRecorder, HttpExecutor, PreparedRequest, RequestTarget,
    RuntimeServices, ScriptEngine,
};
pub use runner::{DEFAULT_REQUEST_TIMEOUT, FlowRunner, RunHandle, RunSummary, StartRun};
pub use varmap::{VAR_ALIAS, VarMap};
