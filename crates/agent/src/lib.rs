//! The tool-calling loop and its prompts.
//!
//! One loop invocation drives a model to fixpoint over a tool registry and
//! surfaces every intermediate message on a channel, so callers can persist
//! a faithful transcript or abandon the stream at any point.

pub mod prompts;
mod tool_loop;

pub use tool_loop::{LoopConfig, LoopRequest, ToolLoop, MAX_ITERATIONS, PROVIDER_API_TIMEOUT};
