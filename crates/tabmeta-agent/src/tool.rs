//! Capabilities the model may invoke mid-conversation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tabmeta_ai::{Content, Message, ToolCall};

use crate::error::{Error, Phase, Result};

/// Result of a capability execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content returned to the model as the observation
    pub content: Vec<Content>,
    /// Whether the execution failed
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Get the text content as a single string
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trait for capabilities the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Capability name (used in API calls)
    fn name(&self) -> &str;

    /// Description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute with arguments that already passed schema validation
    async fn execute(&self, arguments: serde_json::Value) -> ToolResult;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to a tabmeta_ai::Tool declaration
pub fn to_api_tool(tool: &dyn Tool) -> tabmeta_ai::Tool {
    tabmeta_ai::Tool {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// Named capabilities with compiled argument validators
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    tools: Vec<BoxedTool>,
    /// Compiled JSON schema validators keyed by tool name
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn add(&mut self, tool: BoxedTool) {
        let name = tool.name().to_string();
        match jsonschema::validator_for(&tool.parameters_schema()) {
            Ok(validator) => {
                self.schema_cache.insert(name.clone(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!("Schema for capability '{}' does not compile: {}", name, e);
                self.schema_cache.remove(&name);
            }
        }
        self.tools.retain(|t| t.name() != name);
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Declarations offered to the model
    pub fn declarations(&self) -> Vec<tabmeta_ai::Tool> {
        self.tools.iter().map(|t| to_api_tool(t.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one requested call and wrap its output as an observation.
    ///
    /// Unknown names, arguments failing the declared schema and capability
    /// errors are all fatal for the generation.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<Message> {
        let fail = |message: String| Error::Capability {
            phase: Phase::Tool,
            name: call.name.clone(),
            message,
        };

        let tool = self
            .get(&call.name)
            .ok_or_else(|| fail(format!("unknown capability; available: {}", self.names().join(", "))))?;

        // Arguments the provider could not decode arrive as the raw string
        if let serde_json::Value::String(raw) = &call.arguments {
            return Err(fail(format!("arguments are not valid JSON: {}", raw)));
        }

        if let Some(message) = self
            .schema_cache
            .get(&call.name)
            .and_then(|validator| validate_with_validator(&call.arguments, validator))
        {
            return Err(fail(message));
        }

        let result = tool.execute(call.arguments.clone()).await;
        if result.is_error {
            return Err(fail(result.text_content()));
        }

        Ok(Message::tool_result(
            call.id.clone(),
            call.name.clone(),
            result.content,
            false,
        ))
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!("argument validation failed: {}", errors.join("; ")))
    }
}
