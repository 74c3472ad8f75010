//! Observability setup shared by the apiflow binaries.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingOptions, init_tracing, init_tracing_with, shutdown_tracing};
