//! Service catalog tools. The catalog is fetched once per run and cached in
//! the execution context.

use async_trait::async_trait;
use hearth_core::error::ToolError;
use hearth_core::tool::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::ExecutionContext;

pub struct ListServiceDomains {
    pub ctx: Arc<ExecutionContext>,
}

#[async_trait]
impl Tool for ListServiceDomains {
    fn name(&self) -> &str {
        "list-service-domains"
    }
    fn description(&self) -> &str {
        "List every service domain the hub exposes (light, climate, switch, ...)."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let catalog = self
            .ctx
            .services()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        let mut domains: Vec<&str> = catalog.keys().map(|d| d.as_str()).collect();
        domains.sort_unstable();
        Ok(json!(domains.join("\n")))
    }
}

pub struct GetServicesForDomain {
    pub ctx: Arc<ExecutionContext>,
}

#[async_trait]
impl Tool for GetServicesForDomain {
    fn name(&self) -> &str {
        "get-services-for-domain"
    }
    fn description(&self) -> &str {
        "List the services of one domain with their descriptions and fields."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "domain": {"type": "string"}
            },
            "required": ["domain"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(domain) = input["domain"].as_str() else {
            return Err(ToolError::InvalidArguments("domain is required".into()));
        };
        let catalog = self
            .ctx
            .services()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let Some(services) = catalog.get(domain) else {
            return Ok(json!({
                "error": "unknown domain",
                "detail": format!("no services under domain `{domain}`"),
            }));
        };

        let mut names: Vec<&String> = services.keys().collect();
        names.sort_unstable();
        let lines: Vec<String> = names
            .into_iter()
            .map(|name| {
                let meta = &services[name];
                if meta.description.is_empty() {
                    format!("{domain}.{name}")
                } else {
                    format!("{domain}.{name} — {}", meta.description)
                }
            })
            .collect();
        Ok(json!(lines.join("\n")))
    }
}
