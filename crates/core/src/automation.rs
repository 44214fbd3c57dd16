//! Automation domain types.
//!
//! An automation is an immutable snapshot of one notebook file. Its identity
//! is the content hash, so a rename keeps the schedule and an edit produces a
//! new automation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A per-automation model override parsed from a leading `@model` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Driver name ("anthropic", "ollama", or a configured OpenAI-compatible
    /// endpoint name).
    pub driver: String,
    /// Model identifier, empty means the driver's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// An immutable snapshot of one automation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automation {
    /// Hex SHA-256 of `contents`. Primary identity in the signal store.
    pub hash: String,
    pub file_name: String,
    pub contents: String,
}

impl Automation {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        Self {
            hash: content_hash(&contents),
            file_name: file_name.into(),
            contents,
        }
    }

    /// Parse an optional leading `@model driver/name` directive.
    ///
    /// Returns the override (if any) and the prompt body with the directive
    /// line stripped.
    pub fn model_directive(&self) -> (Option<ModelSpec>, &str) {
        let trimmed = self.contents.trim_start();
        let Some(rest) = trimmed.strip_prefix("@model") else {
            return (None, self.contents.as_str());
        };

        let (line, body) = match rest.split_once('\n') {
            Some((line, body)) => (line.trim(), body),
            None => (rest.trim(), ""),
        };
        if line.is_empty() {
            return (None, self.contents.as_str());
        }

        let spec = match line.split_once('/') {
            Some((driver, model)) => ModelSpec {
                driver: driver.trim().to_string(),
                model: Some(model.trim().to_string()).filter(|m| !m.is_empty()),
            },
            None => ModelSpec {
                driver: line.to_string(),
                model: None,
            },
        };
        (Some(spec), body)
    }
}

/// Hex SHA-256 content hash, stable across file renames.
pub fn content_hash(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
