//! The tool-calling loop.
//!
//! Runs one conversation to fixpoint: request a completion, execute any tool
//! calls in emission order, feed the results back, repeat. The loop ends when
//! the model answers without tool calls, the iteration budget runs out, or
//! the provider times out twice in a row.
//!
//! Every message — the opening user prompt, each assistant turn, each
//! tool-result turn, and any synthetic error turn — is emitted on the
//! returned channel in order, so the receiver sees a faithful transcript.
//! Dropping the receiver cancels the loop at its next suspension point.

use hearth_core::error::ProviderError;
use hearth_core::message::{ContentBlock, MessageParam};
use hearth_core::provider::{Provider, ProviderRequest};
use hearth_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default iteration budget per invocation.
pub const MAX_ITERATIONS: u32 = 10;

/// Default bound on each model call.
pub const PROVIDER_API_TIMEOUT: Duration = Duration::from_secs(300);

/// Loop tuning knobs.
#[derive(Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub provider_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            provider_timeout: PROVIDER_API_TIMEOUT,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// One loop invocation.
#[derive(Clone, Default)]
pub struct LoopRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub previous: Vec<MessageParam>,
}

/// Drives one model over one tool registry.
pub struct ToolLoop {
    provider: Arc<dyn Provider>,
    model: String,
    registry: Arc<ToolRegistry>,
    config: LoopConfig,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            registry,
            config: LoopConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the loop. Messages arrive on the returned channel in transcript
    /// order; the channel closes when the loop reaches fixpoint.
    pub fn run(self, request: LoopRequest) -> mpsc::Receiver<MessageParam> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.drive(request, tx).await;
        });
        rx
    }

    /// Run the loop to completion and collect the transcript.
    pub async fn run_to_end(self, request: LoopRequest) -> Vec<MessageParam> {
        let mut rx = self.run(request);
        let mut transcript = Vec::new();
        while let Some(msg) = rx.recv().await {
            transcript.push(msg);
        }
        transcript
    }

    async fn drive(self, request: LoopRequest, tx: mpsc::Sender<MessageParam>) {
        let mut messages = request.previous;
        let user = MessageParam::user(request.prompt);
        messages.push(user.clone());
        if tx.send(user).await.is_err() {
            return;
        }

        let tools = self.registry.definitions();
        let mut iteration = 0u32;
        let mut consecutive_timeouts = 0u32;

        loop {
            iteration += 1;
            if iteration > self.config.max_iterations {
                warn!(model = %self.model, "iteration budget exhausted");
                return;
            }

            let provider_request = ProviderRequest {
                model: self.model.clone(),
                system: request.system.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let outcome = tokio::time::timeout(
                self.config.provider_timeout,
                self.provider.complete(provider_request),
            )
            .await;

            let assistant = match outcome {
                Err(_) | Ok(Err(ProviderError::Timeout(_))) => {
                    consecutive_timeouts += 1;
                    let note = MessageParam::assistant("model request timed out");
                    messages.push(note.clone());
                    if tx.send(note).await.is_err() {
                        return;
                    }
                    if consecutive_timeouts >= 2 {
                        warn!(model = %self.model, "provider timed out twice in a row, giving up");
                        return;
                    }
                    // retry once
                    iteration -= 1;
                    continue;
                }
                Ok(Err(e)) => {
                    // Transient errors end the job; the model sees nothing,
                    // the transcript records what happened.
                    warn!(model = %self.model, error = %e, "provider call failed");
                    let note = MessageParam::assistant(format!("model call failed: {e}"));
                    messages.push(note.clone());
                    let _ = tx.send(note).await;
                    return;
                }
                Ok(Ok(response)) => {
                    consecutive_timeouts = 0;
                    response.message
                }
            };

            messages.push(assistant.clone());
            let tool_uses: Vec<(String, String, serde_json::Value)> = assistant
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            if tx.send(assistant).await.is_err() {
                return;
            }

            if tool_uses.is_empty() {
                debug!(model = %self.model, iterations = iteration, "loop reached fixpoint");
                return;
            }

            // Execute in emission order; all results travel in one user turn.
            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                debug!(tool = %name, "dispatching tool call");
                let output = self.registry.dispatch(&name, input).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.content,
                    is_error: output.is_error,
                });
            }
            let result_msg = MessageParam::tool_results(results);
            messages.push(result_msg.clone());
            if tx.send(result_msg).await.is_err() {
                return;
            }
        }
    }
}
