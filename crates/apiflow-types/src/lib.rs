//! Shared domain types for apiflow.
//!
//! Workspaces, collections, endpoints and examples, flows and their nodes,
//! captured responses, delta-overlay rows, flow events, the workspace
//! snapshot aggregate and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod assertion;
pub mod collection;
pub mod config;
pub mod error;
pub mod event;
pub mod flow;
pub mod http;
pub mod id;
pub mod overlay;
pub mod response;
pub mod snapshot;
pub mod workspace;
