//! Generation progress events

use serde::{Deserialize, Serialize};
use tabmeta_ai::Usage;
use uuid::Uuid;

/// Events emitted while a generation runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// Columns were enumerated and the first round is about to start
    GenerationStart {
        generation_id: Uuid,
        dataset_id: String,
        model: String,
        total_columns: usize,
    },

    /// A round was prompted for a batch
    RoundStart {
        generation_id: Uuid,
        round: u32,
        batch: Vec<String>,
    },

    /// The model answered
    ModelReply {
        generation_id: Uuid,
        round: u32,
        tool_calls: usize,
        text_chars: usize,
    },

    /// Capability execution started
    CapabilityStart {
        generation_id: Uuid,
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Capability execution completed
    CapabilityEnd {
        generation_id: Uuid,
        tool_call_id: String,
        tool_name: String,
        is_error: bool,
    },

    /// A round's payload was accumulated
    RoundEnd {
        generation_id: Uuid,
        round: u32,
        new_columns: usize,
        processed: usize,
        total: usize,
    },

    /// Every column is covered
    GenerationEnd {
        generation_id: Uuid,
        rounds: u32,
        usage: Usage,
    },

    /// The generation aborted
    Error { generation_id: Uuid, message: String },
}

impl GenerationEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationEvent::GenerationEnd { .. } | GenerationEvent::Error { .. }
        )
    }

    /// The generation this event belongs to
    pub fn generation_id(&self) -> Uuid {
        match self {
            GenerationEvent::GenerationStart { generation_id, .. }
            | GenerationEvent::RoundStart { generation_id, .. }
            | GenerationEvent::ModelReply { generation_id, .. }
            | GenerationEvent::CapabilityStart { generation_id, .. }
            | GenerationEvent::CapabilityEnd { generation_id, .. }
            | GenerationEvent::RoundEnd { generation_id, .. }
            | GenerationEvent::GenerationEnd { generation_id, .. }
            | GenerationEvent::Error { generation_id, .. } => *generation_id,
        }
    }
}
