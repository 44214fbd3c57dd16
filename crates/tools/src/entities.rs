//! Entity snapshot tools.

use async_trait::async_trait;
use hearth_core::error::ToolError;
use hearth_core::hub::EntityState;
use hearth_core::tool::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::ExecutionContext;

fn render(states: &[EntityState]) -> String {
    if states.is_empty() {
        return "no matching entities".into();
    }
    states
        .iter()
        .map(|s| match s.friendly_name() {
            Some(name) => format!("{} — {} ({})", s.entity_id, s.state, name),
            None => format!("{} — {}", s.entity_id, s.state),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn fetch(ctx: &ExecutionContext, tool: &str) -> Result<Vec<EntityState>, ToolError> {
    ctx.hub
        .fetch_states()
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: e.to_string(),
        })
}

pub struct GetAllEntities {
    pub ctx: Arc<ExecutionContext>,
}

#[async_trait]
impl Tool for GetAllEntities {
    fn name(&self) -> &str {
        "get-all-entities"
    }
    fn description(&self) -> &str {
        "List every entity the hub knows, with its current state and friendly name."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let states = fetch(&self.ctx, self.name()).await?;
        Ok(json!(render(&states)))
    }
}

pub struct GetEntitiesByPrefix {
    pub ctx: Arc<ExecutionContext>,
}

#[async_trait]
impl Tool for GetEntitiesByPrefix {
    fn name(&self) -> &str {
        "get-entities-by-prefix"
    }
    fn description(&self) -> &str {
        "List entities whose id starts with the given prefix \
         (e.g. \"light.\" or \"climate.bedroom\")."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prefix": {"type": "string"}
            },
            "required": ["prefix"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(prefix) = input["prefix"].as_str() else {
            return Err(ToolError::InvalidArguments("prefix is required".into()));
        };
        let states = fetch(&self.ctx, self.name()).await?;
        let matching: Vec<EntityState> = states
            .into_iter()
            .filter(|s| s.entity_id.starts_with(prefix))
            .collect();
        Ok(json!(render(&matching)))
    }
}
