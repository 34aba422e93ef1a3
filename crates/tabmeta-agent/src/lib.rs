//! tabmeta-agent: Tool-augmented metadata generation for tabular datasets
//!
//! This crate drives a language model through a multi-round conversation:
//! it plans column batches, renders prompts, dispatches the capabilities the
//! model asks for, parses the structured replies and accumulates column
//! metadata until every column of the dataset is covered.

pub mod accumulator;
pub mod error;
pub mod events;
pub mod invoker;
pub mod metadata;
pub mod orchestrator;
pub mod parser;
pub mod planner;
pub mod prompt;
pub mod sample;
pub mod schema;
pub mod state;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Phase, Result};
pub use events::GenerationEvent;
pub use invoker::{ModelInvoker, ModelReply, ProviderInvoker};
pub use metadata::{ColumnMetadata, DatasetMetadata, Sensitivity, Tag};
pub use orchestrator::{GeneratorConfig, MetadataGenerator};
pub use schema::{InspectError, SampleRows, SchemaInspector};
pub use state::AgentState;
pub use tool::{CapabilityRegistry, Tool, ToolResult};
