//! Tool trait — the abstraction over model-callable capabilities.
//!
//! Tools are what let the model act on the hub: list entities, call services,
//! create triggers. Related tools are grouped into suites that share scoped
//! context (the automation being scheduled, the log row being written to).
//! The registry mediates every call: timeouts, unknown names, and handler
//! failures all come back as structured results the model can react to,
//! never as errors that escape the loop.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Default bound on a single tool call.
pub const TOOL_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "call-service").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    async fn execute(
        &self,
        input: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Outcome of one mediated tool call, ready to become a `tool_result` block.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

/// A registry of available tools.
///
/// The tool-loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Dispatch calls when the LLM requests them
pub struct ToolRegistry {
    // BTreeMap keeps definition order stable across runs
    tools: BTreeMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: TOOL_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register a whole suite.
    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// One-line summary of the registered suite, used by eval reports.
    pub fn describe(&self) -> String {
        self.names().join(", ")
    }

    /// Dispatch a call.
    ///
    /// Never fails: unknown names, timeouts, and handler errors become
    /// structured error payloads for the model.
    pub async fn dispatch(&self, name: &str, input: serde_json::Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput {
                content: serde_json::json!({
                    "kind": "tool-not-found",
                    "tool": name,
                })
                .to_string(),
                is_error: true,
            };
        };

        match tokio::time::timeout(self.timeout, tool.execute(input)).await {
            Err(_) => ToolOutput {
                content: serde_json::json!({
                    "kind": "tool-timeout",
                    "tool": name,
                    "timeoutMs": self.timeout.as_millis() as u64,
                })
                .to_string(),
                is_error: true,
            },
            Ok(Err(e)) => ToolOutput {
                content: serde_json::json!({
                    "kind": "tool-error",
                    "tool": name,
                    "detail": e.to_string(),
                })
                .to_string(),
                is_error: true,
            },
            Ok(Ok(value)) => ToolOutput {
                // Plain strings go through raw so the model is not handed
                // a double-quoted JSON literal.
                content: match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                is_error: false,
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
