//! OpenAI-compatible Chat Completions provider

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::{
    error::{Error, Result},
    stream::{MessageEvent, MessageEventStream},
    types::{
        AssistantMetadata, Content, Context, Message, Model, StopReason, StreamOptions, Usage,
    },
};

/// Client for OpenAI and OpenAI-compatible chat-completions endpoints
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAIProvider {
    /// Create a new provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key.into()),
        }
    }

    /// Create a provider that sends no Authorization header (local servers)
    pub fn anonymous() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
        }
    }

    fn build_headers(&self, model: &Model) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| Error::InvalidApiKey)?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        // Add model-specific headers
        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (key.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
                headers.insert(name, val);
            }
        }
        Ok(headers)
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> OpenAIRequest {
        let mut messages = Vec::new();

        // System prompt goes first
        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &context.messages {
            messages.push(convert_message(msg));
        }

        let tools: Option<Vec<OpenAITool>> = if context.tools.is_empty() {
            None
        } else {
            Some(
                context
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        let has_tools = tools.is_some();
        let stream = true;
        OpenAIRequest {
            model: model.id.clone(),
            messages,
            stream,
            stream_options: stream.then_some(OpenAIStreamOptions {
                include_usage: true,
            }),
            max_tokens: Some(options.max_tokens.unwrap_or(model.max_tokens)),
            temperature: options.temperature,
            tools,
            tool_choice: has_tools.then(|| serde_json::json!("auto")),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let headers = self.build_headers(model)?;

        tracing::debug!(
            "POST {} model={} messages={} tools={}",
            url,
            model.id,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len())
        );

        let request_builder = self.client.post(&url).headers(headers).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, model.clone())))
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::User { .. } => OpenAIMessage {
            role: "user".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, .. } => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for c in content {
                match c {
                    Content::Text { text } => text_parts.push(text.clone()),
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        tool_calls.push(OpenAIToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: name.clone(),
                                arguments: arguments.to_string(),
                            },
                        });
                    }
                }
            }

            OpenAIMessage {
                role: "assistant".to_string(),
                content: (!text_parts.is_empty()).then(|| text_parts.join("")),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }
        }
        Message::ToolResult { tool_call_id, .. } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// Accumulates streamed chunks into the final assistant message.
#[derive(Debug, Default)]
struct ChunkAccumulator {
    text: String,
    /// (id, name, arguments json) per tool-call index
    tool_calls: Vec<(String, String, String)>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl ChunkAccumulator {
    fn apply(&mut self, chunk: &StreamChunk) -> Vec<MessageEvent> {
        let mut events = Vec::new();

        for choice in &chunk.choices {
            if let Some(ref content) = choice.delta.content {
                self.text.push_str(content);
                events.push(MessageEvent::TextDelta {
                    content_index: 0,
                    delta: content.clone(),
                });
            }

            if let Some(ref tcs) = choice.delta.tool_calls {
                for tc in tcs {
                    let idx = tc.index;
                    while self.tool_calls.len() <= idx {
                        self.tool_calls
                            .push((String::new(), String::new(), String::new()));
                    }

                    if let Some(ref id) = tc.id {
                        self.tool_calls[idx].0 = id.clone();
                    }
                    if let Some(ref function) = tc.function {
                        if let Some(ref name) = function.name {
                            self.tool_calls[idx].1 = name.clone();
                            events.push(MessageEvent::ToolCallStart {
                                content_index: idx,
                                id: self.tool_calls[idx].0.clone(),
                                name: name.clone(),
                            });
                        }
                        if let Some(ref args) = function.arguments {
                            self.tool_calls[idx].2.push_str(args);
                            events.push(MessageEvent::ToolCallDelta {
                                content_index: idx,
                                delta: args.clone(),
                            });
                        }
                    }
                }
            }

            if let Some(ref reason) = choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }

        if let Some(ref stream_usage) = chunk.usage {
            self.usage.input = stream_usage.prompt_tokens;
            self.usage.output = stream_usage.completion_tokens;
        }

        events
    }

    fn finish(self, model: &Model) -> MessageEvent {
        let mut content = Vec::new();

        if !self.text.is_empty() {
            content.push(Content::Text { text: self.text });
        }

        for (id, name, args) in self.tool_calls {
            if id.is_empty() || name.is_empty() {
                continue;
            }
            let arguments = if args.trim().is_empty() {
                serde_json::json!({})
            } else {
                // Undecodable arguments are passed on as the raw string
                serde_json::from_str(&args).unwrap_or_else(|e| {
                    tracing::warn!("Tool call {} sent unparseable arguments: {}", name, e);
                    serde_json::Value::String(args)
                })
            };
            content.push(Content::ToolCall {
                id,
                name,
                arguments,
            });
        }

        let stop_reason = match self.finish_reason.as_deref() {
            Some("length") => StopReason::Length,
            Some("tool_calls") => StopReason::ToolUse,
            _ => StopReason::Stop,
        };

        let message = Message::Assistant {
            content,
            metadata: AssistantMetadata {
                provider: Some(model.provider),
                model: Some(model.id.clone()),
                usage: self.usage.clone(),
                stop_reason: Some(stop_reason),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        };

        MessageEvent::Done {
            message,
            stop_reason,
            usage: self.usage,
        }
    }
}

fn create_stream(
    mut event_source: EventSource,
    model: Model,
) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut acc = ChunkAccumulator::default();

        let start_message = Message::Assistant {
            content: vec![],
            metadata: AssistantMetadata {
                provider: Some(model.provider),
                model: Some(model.id.clone()),
                ..Default::default()
            },
        };
        yield MessageEvent::Start { message: start_message };

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            for event in acc.apply(&chunk) {
                                yield event;
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            yield MessageEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    event_source.close();
                    let body = response.text().await.unwrap_or_default();
                    let err = Error::from_status(status.as_u16(), body);
                    yield MessageEvent::Error { message: err.to_string() };
                    return;
                }
                Err(e) => {
                    event_source.close();
                    yield MessageEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }

        event_source.close();
        yield acc.finish(&model);
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    /// Without this the stream carries no token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAIStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provider, Tool};

    fn model() -> Model {
        Model::new("gpt-4o-2024-05-13", "GPT 4o", Provider::OpenAI)
    }

    fn chunk(json: serde_json::Value) -> StreamChunk {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_build_request_system_first_and_tools() {
        let provider = OpenAIProvider::new("sk-test");
        let mut context = Context::with_system("be precise");
        context.push(Message::user("describe orders"));
        context.add_tool(Tool::new(
            "fetch_sample_rows",
            "Get sample rows",
            serde_json::json!({"type": "object"}),
        ));
        let options = StreamOptions {
            max_tokens: None,
            temperature: Some(0.0),
        };

        let request = provider.build_request(&model(), &context, &options);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "describe orders");
        assert_eq!(value["tools"][0]["function"]["name"], "fetch_sample_rows");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["max_tokens"], 4096);
    }

    #[test]
    fn test_build_request_asks_for_stream_usage() {
        let provider = OpenAIProvider::new("sk-test");
        let request = provider.build_request(&model(), &Context::default(), &StreamOptions::default());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_build_request_without_tools_omits_choice() {
        let provider = OpenAIProvider::anonymous();
        let context = Context::default();
        let request = provider.build_request(&model(), &context, &StreamOptions::default());
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_convert_assistant_tool_call_and_result() {
        let assistant = Message::assistant(vec![Content::tool_call(
            "call_1",
            "fetch_sample_rows",
            serde_json::json!({"dataset_id": "orders"}),
        )]);
        let converted = serde_json::to_value(convert_message(&assistant)).unwrap();
        assert_eq!(converted["role"], "assistant");
        assert!(converted.get("content").is_none());
        assert_eq!(converted["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            converted["tool_calls"][0]["function"]["arguments"],
            r#"{"dataset_id":"orders"}"#
        );

        let result = Message::tool_result("call_1", "fetch_sample_rows", vec![Content::text("id\n1")], false);
        let converted = serde_json::to_value(convert_message(&result)).unwrap();
        assert_eq!(converted["role"], "tool");
        assert_eq!(converted["tool_call_id"], "call_1");
        assert_eq!(converted["content"], "id\n1");
    }

    #[test]
    fn test_build_headers_anonymous_has_no_auth() {
        let headers = OpenAIProvider::anonymous().build_headers(&model()).unwrap();
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());

        let headers = OpenAIProvider::new("sk-x").build_headers(&model()).unwrap();
        assert_eq!(headers[reqwest::header::AUTHORIZATION], "Bearer sk-x");
    }

    #[test]
    fn test_accumulator_text_completion() {
        let mut acc = ChunkAccumulator::default();
        acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"content": "```json\n{"}, "finish_reason": null}]
        })));
        acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"content": "}\n```"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        })));

        match acc.finish(&model()) {
            MessageEvent::Done {
                message,
                stop_reason,
                usage,
            } => {
                assert_eq!(message.text(), "```json\n{}\n```");
                assert_eq!(stop_reason, StopReason::Stop);
                assert_eq!(usage.input, 12);
                assert!(message.tool_calls().is_empty());
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[test]
    fn test_accumulator_tool_call_fragments() {
        let mut acc = ChunkAccumulator::default();
        let events = acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_9", "function": {"name": "fetch_sample_rows", "arguments": "{\"data"}}
            ]}, "finish_reason": null}]
        })));
        assert!(matches!(events[0], MessageEvent::ToolCallStart { .. }));

        acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "set_id\": \"orders\"}"}}
            ]}, "finish_reason": "tool_calls"}]
        })));

        match acc.finish(&model()) {
            MessageEvent::Done {
                message,
                stop_reason,
                ..
            } => {
                assert_eq!(stop_reason, StopReason::ToolUse);
                let calls = message.tool_calls();
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_9");
                assert_eq!(calls[0].arguments["dataset_id"], "orders");
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[test]
    fn test_accumulator_empty_arguments_become_object() {
        let mut acc = ChunkAccumulator::default();
        acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c", "function": {"name": "fetch_sample_rows", "arguments": ""}}
            ]}, "finish_reason": "tool_calls"}]
        })));
        let MessageEvent::Done { message, .. } = acc.finish(&model()) else {
            panic!("expected Done");
        };
        assert_eq!(message.tool_calls()[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_accumulator_keeps_undecodable_arguments() {
        let mut acc = ChunkAccumulator::default();
        acc.apply(&chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c", "function": {"name": "fetch_sample_rows", "arguments": "{\"dataset_id\": "}}
            ]}, "finish_reason": "tool_calls"}]
        })));
        let MessageEvent::Done { message, .. } = acc.finish(&model()) else {
            panic!("expected Done");
        };
        assert_eq!(
            message.tool_calls()[0].arguments,
            serde_json::Value::String("{\"dataset_id\": ".to_string())
        );
    }
}
