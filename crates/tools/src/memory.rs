//! The shared scratchpad and its read/write tools.
//!
//! One free-form text file (`memory.md` in the notebook) the model may read
//! and overwrite between runs. A single-writer lock serializes writes; reads
//! see the last committed contents.

use async_trait::async_trait;
use hearth_core::error::ToolError;
use hearth_core::tool::Tool;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The scratchpad file behind a single-writer lock.
pub struct Scratchpad {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Scratchpad {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Last committed contents; a missing file reads as empty.
    pub async fn read(&self) -> Result<String, std::io::Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace the contents wholesale.
    pub async fn write(&self, text: &str) -> Result<(), std::io::Error> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, text).await?;
        debug!(path = %self.path.display(), bytes = text.len(), "scratchpad written");
        Ok(())
    }
}

pub struct ReadMemory {
    pub scratchpad: Arc<Scratchpad>,
}

#[async_trait]
impl Tool for ReadMemory {
    fn name(&self) -> &str {
        "read-memory"
    }
    fn description(&self) -> &str {
        "Read the shared scratchpad: notes kept across automation runs."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let contents = self
            .scratchpad
            .read()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(json!(if contents.is_empty() {
            "(scratchpad is empty)".to_string()
        } else {
            contents
        }))
    }
}

pub struct WriteMemory {
    pub scratchpad: Arc<Scratchpad>,
}

#[async_trait]
impl Tool for WriteMemory {
    fn name(&self) -> &str {
        "write-memory"
    }
    fn description(&self) -> &str {
        "Overwrite the shared scratchpad. Keep it short; it is injected into \
         every future run."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"}
            },
            "required": ["text"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(text) = input["text"].as_str() else {
            return Err(ToolError::InvalidArguments("text is required".into()));
        };
        self.scratchpad
            .write(text)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(json!({"written": text.len()}))
    }
}
