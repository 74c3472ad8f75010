//! Business logic and ports for apiflow.
//!
//! - `flow`: the node interpreter (scheduler, per-kind executors, variable
//!   scoping, cancellation, status events).
//! - `overlay`: rank arithmetic and classification for delta examples.
//! - `ordering`: doubly-linked list walking and relinking plans.
//! - `assertion`: path predicates and boolean expressions.
//! - `request`: URL assembly, variable substitution, cURL export and the
//!   user-facing error renderer.
//! - `snapshot`: export filtering, validation and id remapping.
//! - `repository`: storage traits implemented by apiflow-infra.

pub mod assertion;
pub mod event;
pub mod flow;
pub mod ordering;
pub mod overlay;
pub mod repository;
pub mod request;
pub mod service;
pub mod snapshot;
