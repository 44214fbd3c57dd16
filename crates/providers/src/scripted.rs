//! Scripted provider for deterministic testing.
//!
//! Returns pre-queued assistant turns without any HTTP. Used by the unit
//! tests and the eval harness's deterministic scenarios.

use async_trait::async_trait;
use hearth_core::error::ProviderError;
use hearth_core::message::{ContentBlock, MessageParam, Role};
use hearth_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::{Arc, Mutex};

/// One queued assistant turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<(String, serde_json::Value)>,
    /// When set, the provider returns this error instead of a message.
    pub error: Option<ProviderError>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![(name.into(), input)],
            ..Default::default()
        }
    }

    pub fn error(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn and_tool_call(mut self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.tool_calls.push((name.into(), input));
        self
    }
}

/// A provider that replays a script.
///
/// Turns are popped front-to-back; when the script runs dry the provider
/// answers with a plain "done" so loops always terminate. All requests are
/// recorded for assertions.
pub struct ScriptedProvider {
    turns: Mutex<Vec<ScriptedTurn>>,
    pub requests: Arc<Mutex<Vec<ProviderRequest>>>,
    next_id: Mutex<u64>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            requests: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn fresh_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        let id = format!("tu_{}", *next);
        *next += 1;
        id
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        let turn = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                ScriptedTurn::text("done")
            } else {
                turns.remove(0)
            }
        };

        if let Some(error) = turn.error {
            return Err(error);
        }

        let mut content = Vec::new();
        if let Some(text) = turn.text {
            content.push(ContentBlock::Text { text });
        }
        for (name, input) in turn.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: self.fresh_id(),
                name,
                input,
            });
        }

        Ok(ProviderResponse {
            message: MessageParam {
                role: Role::Assistant,
                content,
            },
            usage: Some(Usage {
                input_tokens: 100,
                output_tokens: 50,
            }),
            model: request.model,
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(vec!["scripted".into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "scripted".into(),
            system: None,
            messages: vec![MessageParam::user("hello")],
            tools: vec![],
            max_tokens: 512,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn replays_turns_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::tool_call("read-memory", json!({})),
            ScriptedTurn::text("all done"),
        ]);

        let first = provider.complete(request()).await.unwrap();
        assert_eq!(first.message.tool_uses().len(), 1);
        assert_eq!(first.message.tool_uses()[0].0, "tu_0");

        let second = provider.complete(request()).await.unwrap();
        assert_eq!(second.message.text(), "all done");

        // script exhausted → terminal text
        let third = provider.complete(request()).await.unwrap();
        assert_eq!(third.message.text(), "done");
        assert!(!third.message.has_tool_use());

        assert_eq!(provider.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn scripted_error_surfaces() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::error(ProviderError::Timeout(
            "scripted timeout".into(),
        ))]);
        let result = provider.complete(request()).await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn ids_are_unique_across_turns() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::tool_call("a", json!({})).and_tool_call("b", json!({})),
            ScriptedTurn::tool_call("c", json!({})),
        ]);
        let first = provider.complete(request()).await.unwrap();
        let second = provider.complete(request()).await.unwrap();
        let mut ids: Vec<String> = first
            .message
            .tool_uses()
            .iter()
            .chain(second.message.tool_uses().iter())
            .map(|(id, _, _)| id.to_string())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
