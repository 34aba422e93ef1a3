//! The generation state machine
//!
//! One call to [`MetadataGenerator::generate_metadata`] walks
//! `INIT → PROMPT → MODEL ⇄ TOOL → PARSE → (MODEL | DONE)` with a fresh
//! [`AgentState`]. Every await is sequential, so each generation has at most
//! one model or capability call in flight.

use std::sync::Arc;
use tabmeta_ai::{Context, Message, ModelCatalog, StreamOptions, ToolCall};
use tokio::sync::broadcast;

use crate::{
    accumulator::accumulate,
    error::{Error, Phase, Result},
    events::GenerationEvent,
    invoker::{ModelInvoker, ModelReply},
    metadata::DatasetMetadata,
    parser::parse_response,
    planner::next_batch,
    prompt::PromptBuilder,
    sample::FetchSampleRowsTool,
    schema::SchemaInspector,
    state::AgentState,
    tool::{BoxedTool, CapabilityRegistry},
};

/// Generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Friendly label → backend model
    pub models: ModelCatalog,
    /// Maximum columns requested per round
    pub batch_size: usize,
    /// Rows returned by `fetch_sample_rows`
    pub sample_row_limit: usize,
    pub temperature: Option<f32>,
    /// Maximum tokens per response; the model's own limit when unset
    pub max_tokens: Option<u32>,
    /// Capability turns allowed inside one round
    pub max_tool_turns_per_round: u32,
    /// Consecutive rounds without new columns before giving up
    pub max_stalled_rounds: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            models: ModelCatalog::builtin(),
            batch_size: 20,
            sample_row_limit: 3,
            temperature: Some(0.0),
            max_tokens: None,
            max_tool_turns_per_round: 8,
            max_stalled_rounds: 3,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.max_stalled_rounds == 0 {
            return Err(Error::Config("max_stalled_rounds must be at least 1".into()));
        }
        if self.models.is_empty() {
            return Err(Error::Config("no models configured".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::Config(format!(
                    "temperature {} is outside 0.0..=2.0",
                    t
                )));
            }
        }
        Ok(())
    }
}

enum Step {
    Init,
    Prompt,
    Model,
    Tool(Vec<ToolCall>),
    Parse(String),
    Done,
}

/// Drives a model through batched rounds until every column is described
pub struct MetadataGenerator {
    config: GeneratorConfig,
    inspector: Arc<dyn SchemaInspector>,
    invoker: Arc<dyn ModelInvoker>,
    capabilities: CapabilityRegistry,
    prompts: PromptBuilder,
    event_tx: broadcast::Sender<GenerationEvent>,
}

impl MetadataGenerator {
    /// Create a generator with the `fetch_sample_rows` capability registered
    pub fn new(
        config: GeneratorConfig,
        inspector: Arc<dyn SchemaInspector>,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let mut capabilities = CapabilityRegistry::new();
        capabilities.add(Arc::new(FetchSampleRowsTool::new(
            inspector.clone(),
            config.sample_row_limit,
        )));
        Self {
            config,
            inspector,
            invoker,
            capabilities,
            prompts: PromptBuilder::new(),
            event_tx,
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Register an extra capability
    pub fn add_capability(&mut self, tool: BoxedTool) {
        self.capabilities.add(tool);
    }

    /// Describe every column of `dataset_id` using the model behind
    /// `model_label`.
    ///
    /// Any failure aborts the generation; partial metadata is dropped.
    pub async fn generate_metadata(
        &self,
        dataset_id: &str,
        model_label: &str,
    ) -> Result<DatasetMetadata> {
        self.config.validate()?;
        let model = self
            .config
            .models
            .resolve(model_label)
            .map_err(|e| Error::Config(e.to_string()))?;

        let mut state = AgentState::new(dataset_id, model, self.config.batch_size);
        tracing::info!(
            "Generation {} for '{}' with {}",
            state.generation_id,
            dataset_id,
            state.model.id
        );

        match self.run(&mut state).await {
            Ok(()) => Ok(state.accumulated_metadata),
            Err(e) => {
                tracing::warn!(
                    "Generation {} failed after {} rounds: {}",
                    state.generation_id,
                    state.round,
                    e
                );
                self.emit(GenerationEvent::Error {
                    generation_id: state.generation_id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, state: &mut AgentState) -> Result<()> {
        let mut step = Step::Init;
        let mut tool_turns: u32 = 0;
        let mut stalled_rounds: u32 = 0;

        loop {
            step = match step {
                Step::Init => {
                    self.init(state).await?;
                    Step::Prompt
                }

                Step::Prompt => {
                    state.pending_batch = next_batch(
                        &state.all_columns,
                        &state.processed_columns,
                        state.batch_size,
                    );
                    state.round = 1;
                    let prompt = self
                        .prompts
                        .first_round(&state.dataset_id, &state.pending_batch);
                    self.start_round(state, prompt);
                    Step::Model
                }

                Step::Model => match self.invoke(state).await? {
                    ModelReply::CapabilityRequest(calls) => {
                        tool_turns += 1;
                        if tool_turns > self.config.max_tool_turns_per_round {
                            return Err(Error::Stalled {
                                phase: Phase::Model,
                                reason: format!(
                                    "more than {} capability turns in round {}",
                                    self.config.max_tool_turns_per_round, state.round
                                ),
                                pending: state.pending_batch.clone(),
                            });
                        }
                        Step::Tool(calls)
                    }
                    ModelReply::Completion(text) => Step::Parse(text),
                },

                Step::Tool(calls) => {
                    for call in &calls {
                        let observation = self.dispatch(state, call).await?;
                        state.conversation.push(observation);
                    }
                    Step::Model
                }

                Step::Parse(text) => {
                    let payload = parse_response(&text)?;
                    let outcome = accumulate(state, payload);
                    self.emit(GenerationEvent::RoundEnd {
                        generation_id: state.generation_id,
                        round: state.round,
                        new_columns: outcome.new_columns.len(),
                        processed: state.processed_columns.len(),
                        total: state.all_columns.len(),
                    });

                    if outcome.new_columns.is_empty() {
                        stalled_rounds += 1;
                        tracing::warn!(
                            "Round {} added no columns ({} in a row)",
                            state.round,
                            stalled_rounds
                        );
                        if stalled_rounds >= self.config.max_stalled_rounds {
                            return Err(Error::Stalled {
                                phase: Phase::Parse,
                                reason: format!(
                                    "{} consecutive rounds added no columns",
                                    stalled_rounds
                                ),
                                pending: state.pending_batch.clone(),
                            });
                        }
                    } else {
                        stalled_rounds = 0;
                    }

                    let batch = next_batch(
                        &state.all_columns,
                        &state.processed_columns,
                        state.batch_size,
                    );
                    if batch.is_empty() {
                        Step::Done
                    } else {
                        state.pending_batch = batch;
                        state.round += 1;
                        tool_turns = 0;
                        let prompt = self
                            .prompts
                            .next_round(&state.dataset_id, &state.pending_batch);
                        self.start_round(state, prompt);
                        Step::Model
                    }
                }

                Step::Done => {
                    state.pending_batch.clear();
                    tracing::info!(
                        "Generation {} done: {} columns in {} rounds",
                        state.generation_id,
                        state.processed_columns.len(),
                        state.round
                    );
                    self.emit(GenerationEvent::GenerationEnd {
                        generation_id: state.generation_id,
                        rounds: state.round,
                        usage: state.usage.clone(),
                    });
                    return Ok(());
                }
            };
        }
    }

    async fn init(&self, state: &mut AgentState) -> Result<()> {
        let columns = self
            .inspector
            .list_columns(&state.dataset_id)
            .await
            .map_err(|e| Error::Schema {
                dataset: state.dataset_id.clone(),
                message: e.to_string(),
            })?;
        if columns.is_empty() {
            return Err(Error::Schema {
                dataset: state.dataset_id.clone(),
                message: "dataset has no columns".into(),
            });
        }

        state.all_columns = columns.into_iter().collect();
        state.processed_columns.clear();
        tracing::debug!(
            "'{}' has {} columns",
            state.dataset_id,
            state.all_columns.len()
        );
        self.emit(GenerationEvent::GenerationStart {
            generation_id: state.generation_id,
            dataset_id: state.dataset_id.clone(),
            model: state.model.id.clone(),
            total_columns: state.all_columns.len(),
        });
        Ok(())
    }

    fn start_round(&self, state: &mut AgentState, prompt: String) {
        tracing::debug!("Round {}: {:?}", state.round, state.pending_batch);
        state.conversation.push(Message::user(prompt));
        self.emit(GenerationEvent::RoundStart {
            generation_id: state.generation_id,
            round: state.round,
            batch: state.pending_batch.clone(),
        });
    }

    async fn invoke(&self, state: &mut AgentState) -> Result<ModelReply> {
        let context = Context {
            system_prompt: Some(self.prompts.system_prompt().to_string()),
            messages: state.conversation.clone(),
            tools: self.capabilities.declarations(),
        };
        let options = StreamOptions {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let (message, usage) = self
            .invoker
            .invoke(&state.model, &context, &options)
            .await
            .map_err(|source| Error::Transport {
                phase: Phase::Model,
                source,
            })?;
        state.usage.add(&usage);

        let reply = ModelReply::classify(&message);
        let (tool_calls, text_chars) = match &reply {
            ModelReply::CapabilityRequest(calls) => (calls.len(), 0),
            ModelReply::Completion(text) => (0, text.chars().count()),
        };
        tracing::debug!(
            "Round {} reply: {} tool calls, {} chars",
            state.round,
            tool_calls,
            text_chars
        );
        self.emit(GenerationEvent::ModelReply {
            generation_id: state.generation_id,
            round: state.round,
            tool_calls,
            text_chars,
        });

        state.conversation.push(message);
        Ok(reply)
    }

    async fn dispatch(&self, state: &AgentState, call: &ToolCall) -> Result<Message> {
        tracing::debug!("Capability {} ({}): {}", call.name, call.id, call.arguments);
        self.emit(GenerationEvent::CapabilityStart {
            generation_id: state.generation_id,
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        let result = self.capabilities.dispatch(call).await;
        self.emit(GenerationEvent::CapabilityEnd {
            generation_id: state.generation_id,
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            is_error: result.is_err(),
        });
        result
    }

    fn emit(&self, event: GenerationEvent) {
        let _ = self.event_tx.send(event);
    }
}
