//! # Hearth Core
//!
//! Domain types, traits, and error definitions for the hearth automation
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod automation;
pub mod clock;
pub mod error;
pub mod hub;
pub mod message;
pub mod provider;
pub mod signal;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use automation::{Automation, ModelSpec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, Error, HubError, ProviderError, Result, StoreError, ToolError};
pub use hub::{EntityState, HubClient, ServiceCall, ServiceTarget, StateChange};
pub use message::{ContentBlock, MessageParam, Role};
pub use provider::{LlmFactory, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use signal::{Signal, SignalData};
pub use tool::{Tool, ToolOutput, ToolRegistry};
