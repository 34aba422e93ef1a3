//! tabmeta-ai: Language model backend abstraction
//!
//! This crate provides the message types, model catalogue and the
//! OpenAI-compatible chat-completions provider used by the metadata agent.

pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use models::ModelCatalog;
pub use stream::MessageEventStream;
pub use types::*;
