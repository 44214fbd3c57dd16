//! Provider trait — the abstraction over LLM backends.
//!
//! A provider runs one completion over a message list with a tool set. The
//! tool-loop drives it to fixpoint; drivers translate between the canonical
//! [`MessageParam`](crate::message::MessageParam) shape and their vendor wire
//! formats, fabricating stable tool-use ids where the native shape lacks them.
//!
//! Implementations: Anthropic native, OpenAI-compatible (covers Ollama and
//! any `/v1/chat/completions` endpoint), scripted (tests/evals).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::MessageParam;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input.
    pub input_schema: serde_json::Value,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// The model to use (e.g. "claude-sonnet-4-20250514", "qwen3:8b").
    pub model: String,

    /// System prompt, sent as a top-level field.
    pub system: Option<String>,

    /// The conversation so far.
    pub messages: Vec<MessageParam>,

    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The assistant message, with any `tool_use` blocks in emission order.
    pub message: MessageParam,

    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested).
    pub model: String,
}

/// The core Provider trait.
///
/// The tool-loop calls `complete()` without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable driver name ("anthropic", "ollama", ...).
    fn name(&self) -> &str;

    /// Run one completion.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Builds providers on demand.
///
/// The runtime holds a factory value rather than a provider instance so a
/// per-automation model directive can construct a fresh provider with the
/// requested driver and model for one job.
pub trait LlmFactory: Send + Sync {
    /// The driver/model pair used when an automation has no directive.
    fn default_spec(&self) -> crate::automation::ModelSpec;

    /// Build a provider for the spec, resolving a missing model name to the
    /// configured default. Returns the provider and the resolved model.
    fn build(
        &self,
        spec: &crate::automation::ModelSpec,
    ) -> std::result::Result<(std::sync::Arc<dyn Provider>, String), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "create-cron-trigger".into(),
            description: "Schedule a recurring trigger".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "expr": { "type": "string", "description": "5-field cron expression" }
                },
                "required": ["expr"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("create-cron-trigger"));
        assert!(json.contains("expr"));
    }
}
