//! Outbound HTTP for request nodes.

pub mod client;

pub use client::ReqwestExecutor;
