//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing `/v1/chat/completions` with function calling.
//!
//! Translation notes: the canonical block shape packs tool results into user
//! messages; this API wants them as separate `role:"tool"` messages, and some
//! servers drop or blank the tool-call id entirely. Ids are therefore
//! fabricated positionally (`tu_0`, `tu_1`, ...) against the last emitted
//! tool-call list so the pairing survives the round trip.

use async_trait::async_trait;
use hearth_core::error::ProviderError;
use hearth_core::message::{ContentBlock, MessageParam, Role};
use hearth_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            // Ollama doesn't need a real key
            "ollama",
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Flatten block messages into the chat-completions shape.
    fn to_api_messages(system: Option<&str>, messages: &[MessageParam]) -> Vec<ApiMessage> {
        let mut out = Vec::new();
        if let Some(system) = system {
            out.push(ApiMessage {
                role: "system".into(),
                content: Some(system.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in messages {
            match msg.role {
                Role::Assistant => {
                    let text = msg.text();
                    let tool_calls: Vec<ApiToolCall> = msg
                        .tool_uses()
                        .into_iter()
                        .map(|(id, name, input)| ApiToolCall {
                            id: id.to_string(),
                            kind: "function".into(),
                            function: ApiFunctionCall {
                                name: name.to_string(),
                                arguments: input.to_string(),
                            },
                        })
                        .collect();
                    out.push(ApiMessage {
                        role: "assistant".into(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                Role::User => {
                    // Tool results unpack into individual tool messages; plain
                    // text stays a user message.
                    let mut text = String::new();
                    for block in &msg.content {
                        match block {
                            ContentBlock::Text { text: t } => {
                                if !text.is_empty() {
                                    text.push('\n');
                                }
                                text.push_str(t);
                            }
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } => {
                                out.push(ApiMessage {
                                    role: "tool".into(),
                                    content: Some(content.clone()),
                                    tool_calls: None,
                                    tool_call_id: Some(tool_use_id.clone()),
                                });
                            }
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                    if !text.is_empty() {
                        out.push(ApiMessage {
                            role: "user".into(),
                            content: Some(text),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
            }
        }

        out
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                kind: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    /// Translate a response message, fabricating positional ids where the
    /// server sent none.
    fn response_to_message(resp: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "response contained no choices".into(),
            })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        for (position, call) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let id = if call.id.is_empty() {
                format!("tu_{position}")
            } else {
                call.id
            };
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Null);
            content.push(ContentBlock::ToolUse {
                id,
                name: call.function.name,
                input,
            });
        }

        Ok(ProviderResponse {
            message: MessageParam {
                role: Role::Assistant,
                content,
            },
            usage: resp.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(format!(
                "Invalid API key for {}",
                self.name
            )));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::response_to_message(api_resp)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: "model listing failed".into(),
            });
        }

        #[derive(Deserialize)]
        struct ModelList {
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let list: ModelList = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse model list: {e}"),
        })?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    #[serde(rename = "type")]
    kind: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_results_unpack_into_tool_messages() {
        let messages = vec![
            MessageParam::user("list the lights"),
            MessageParam::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "tu_0".into(),
                name: "get-all-entities".into(),
                input: json!({}),
            }]),
            MessageParam::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "tu_0".into(),
                content: "light.kitchen: on".into(),
                is_error: false,
            }]),
        ];

        let api = OpenAiCompatProvider::to_api_messages(Some("be helpful"), &messages);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("tu_0"));
        assert_eq!(
            api[2].tool_calls.as_ref().unwrap()[0].function.name,
            "get-all-entities"
        );
    }

    #[test]
    fn missing_tool_call_ids_are_fabricated_positionally() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "model": "qwen3:8b",
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [
                            {"type": "function",
                             "function": {"name": "read-memory", "arguments": "{}"}},
                            {"type": "function",
                             "function": {"name": "get-all-entities", "arguments": "{}"}}
                        ]
                    }
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 3}
            }"#,
        )
        .unwrap();

        let pr = OpenAiCompatProvider::response_to_message(resp).unwrap();
        let uses = pr.message.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].0, "tu_0");
        assert_eq!(uses[1].0, "tu_1");
    }

    #[test]
    fn native_ids_are_preserved() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "choices": [{
                    "message": {
                        "content": "On it",
                        "tool_calls": [
                            {"id": "call_xyz", "type": "function",
                             "function": {"name": "call-service",
                                          "arguments": "{\"domain\":\"light\"}"}}
                        ]
                    }
                }]
            }"#,
        )
        .unwrap();

        let pr = OpenAiCompatProvider::response_to_message(resp).unwrap();
        let uses = pr.message.tool_uses();
        assert_eq!(uses[0].0, "call_xyz");
        assert_eq!(uses[0].2["domain"], "light");
        assert_eq!(pr.message.text(), "On it");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let resp: ApiResponse =
            serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::response_to_message(resp).is_err());
    }

    #[test]
    fn ollama_default_base_url() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.name(), "ollama");
    }
}
