//! Per-generation mutable state.

use std::collections::BTreeSet;
use tabmeta_ai::{Message, Model, Usage};
use uuid::Uuid;

use crate::metadata::DatasetMetadata;

/// Everything one generation threads through the loop.
///
/// Created once per `generate_metadata` call and dropped when it returns;
/// never shared between generations.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Correlates events of this generation
    pub generation_id: Uuid,
    pub dataset_id: String,
    pub model: Model,
    /// Snapshot taken once at initialization
    pub all_columns: BTreeSet<String>,
    /// Columns covered by a successful parse; always a subset of `all_columns`
    pub processed_columns: BTreeSet<String>,
    /// Columns targeted by the current round
    pub pending_batch: Vec<String>,
    pub conversation: Vec<Message>,
    pub accumulated_metadata: DatasetMetadata,
    pub batch_size: usize,
    /// 1-based round counter, 0 before the first prompt
    pub round: u32,
    pub usage: Usage,
}

impl AgentState {
    pub fn new(dataset_id: impl Into<String>, model: Model, batch_size: usize) -> Self {
        let dataset_id = dataset_id.into();
        Self {
            generation_id: Uuid::new_v4(),
            accumulated_metadata: DatasetMetadata::empty(dataset_id.clone()),
            dataset_id,
            model,
            all_columns: BTreeSet::new(),
            processed_columns: BTreeSet::new(),
            pending_batch: Vec::new(),
            conversation: Vec::new(),
            batch_size,
            round: 0,
            usage: Usage::default(),
        }
    }

    /// Number of columns not yet covered
    pub fn remaining(&self) -> usize {
        self.all_columns.difference(&self.processed_columns).count()
    }

    pub fn is_complete(&self) -> bool {
        self.processed_columns == self.all_columns
    }

    /// The last message of the conversation
    pub fn last_message(&self) -> Option<&Message> {
        self.conversation.last()
    }
}
