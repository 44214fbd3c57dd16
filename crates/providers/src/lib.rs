//! LLM provider drivers.
//!
//! Every backend implements [`hearth_core::Provider`]: Anthropic's native
//! Messages API, any OpenAI-compatible endpoint (which covers Ollama, vLLM,
//! OpenRouter, Together, ...), and a scripted driver for tests and evals.
//! Vendor message formats are translated to the canonical block shape inside
//! each driver; tool-use ids are fabricated positionally where the wire
//! protocol loses them.

pub mod anthropic;
pub mod factory;
pub mod openai_compat;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use factory::ProviderFactory;
pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};
