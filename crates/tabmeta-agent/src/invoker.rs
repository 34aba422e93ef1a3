//! Model invocation boundary

use async_trait::async_trait;
use tabmeta_ai::providers::LlmProvider;
use tabmeta_ai::providers::openai::OpenAIProvider;
use tabmeta_ai::{Context, Message, Model, StreamOptions, ToolCall, Usage};

/// Sends a conversation to a model and returns exactly one message
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> tabmeta_ai::Result<(Message, Usage)>;
}

/// What the model answered with
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// One or more capability calls, in request order
    CapabilityRequest(Vec<ToolCall>),
    /// Free text expected to carry the structured payload
    Completion(String),
}

impl ModelReply {
    /// A message with any tool call is a capability request; any text
    /// alongside it is ignored.
    pub fn classify(message: &Message) -> Self {
        let calls = message.tool_calls();
        if calls.is_empty() {
            ModelReply::Completion(message.text())
        } else {
            ModelReply::CapabilityRequest(calls)
        }
    }
}

/// Invoker backed by the OpenAI-compatible provider
#[derive(Debug, Clone, Default)]
pub struct ProviderInvoker {
    api_key: Option<String>,
}

impl ProviderInvoker {
    /// Read keys from the environment at call time
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    fn provider_for(&self, model: &Model) -> tabmeta_ai::Result<OpenAIProvider> {
        if let Some(ref key) = self.api_key {
            return Ok(OpenAIProvider::new(key.clone()));
        }
        match model.provider.api_key_env_var() {
            Some(var) => Ok(OpenAIProvider::new(tabmeta_ai::providers::get_api_key(
                None, var,
            )?)),
            // Local OpenAI-compatible servers accept unauthenticated requests
            None => Ok(OpenAIProvider::anonymous()),
        }
    }
}

#[async_trait]
impl ModelInvoker for ProviderInvoker {
    async fn invoke(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> tabmeta_ai::Result<(Message, Usage)> {
        let provider = self.provider_for(model)?;
        tracing::debug!(
            "Invoking {} ({} messages, {} tools)",
            model.id,
            context.messages.len(),
            context.tools.len()
        );
        let stream = provider.stream(model, context, options).await?;
        tabmeta_ai::stream::collect_message(stream).await
    }
}
