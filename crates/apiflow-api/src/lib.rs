//! apiflow application layer: the REST API, the `apiflow` CLI and the
//! state that wires core services to the SQLite infrastructure.

pub mod cli;
pub mod http;
pub mod state;
