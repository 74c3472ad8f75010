//! Infrastructure layer for apiflow.
//!
//! Contains implementations of the ports defined in `apiflow-core`: SQLite
//! storage for every repository and the delta-overlay trios, the reqwest
//! HTTP executor, the embedded JavaScript sandbox for script nodes, and
//! server configuration loading.

pub mod config;
pub mod http;
pub mod resolver;
pub mod script;
pub mod sqlite;
