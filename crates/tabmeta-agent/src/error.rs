//! Error types for tabmeta-agent

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using tabmeta-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// States of the generation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Prompt,
    Model,
    Tool,
    Parse,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "INIT",
            Phase::Prompt => "PROMPT",
            Phase::Model => "MODEL",
            Phase::Tool => "TOOL",
            Phase::Parse => "PARSE",
            Phase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Fatal errors of a metadata generation.
///
/// None of these are recovered inside the loop; each aborts the generation
/// and nothing accumulated so far is returned.
#[derive(Error, Debug)]
pub enum Error {
    /// The dataset or its columns could not be enumerated
    #[error("Schema error for dataset '{dataset}': {message}")]
    Schema { dataset: String, message: String },

    /// The model backend call failed
    #[error("Model backend failed in {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: tabmeta_ai::Error,
    },

    /// Unknown capability, invalid arguments, or a failing capability
    #[error("Capability '{name}' failed in {phase}: {message}")]
    Capability {
        phase: Phase,
        name: String,
        message: String,
    },

    /// No structured payload could be located or decoded
    #[error("No structured payload in model response ({phase}): {message}")]
    Parse {
        phase: Phase,
        message: String,
        raw: String,
    },

    /// A located payload violates the metadata schema
    #[error("Model response failed validation ({phase}): {}", .messages.join("; "))]
    Validation {
        phase: Phase,
        messages: Vec<String>,
        raw: String,
    },

    /// The loop stopped making progress
    #[error("Generation stalled in {phase}: {reason}")]
    Stalled {
        phase: Phase,
        reason: String,
        pending: Vec<String>,
    },

    /// Invalid generator configuration or unknown model label
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The loop state the error originated in, if it arose inside the loop
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Schema { .. } => Some(Phase::Init),
            Error::Transport { phase, .. }
            | Error::Capability { phase, .. }
            | Error::Parse { phase, .. }
            | Error::Validation { phase, .. }
            | Error::Stalled { phase, .. } => Some(*phase),
            Error::Config(_) => None,
        }
    }

    /// The offending model text for parse and validation failures
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Error::Parse { raw, .. } | Error::Validation { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
