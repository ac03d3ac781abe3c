//! Shared plumbing between the host and isolated execution contexts
//!
//! - [`output`]: per-run stdout/stderr aggregation
//! - [`input`]: input request brokering between running code and the host
//! - [`rewrite`]: call-site rewriting of blocking input primitives

pub mod input;
pub mod output;
pub mod rewrite;

pub use input::{InputBroker, InputCallback, InputHook};
pub use output::OutputAggregator;
pub use rewrite::{Rewrite, Syntax};
