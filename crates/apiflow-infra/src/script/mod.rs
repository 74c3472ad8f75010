//! Script node sandbox.

pub mod js;

pub use js::BoaScriptEngine;
