//! Model catalogue: friendly labels mapped to backend models.

use crate::{Error, Model, Provider, Result};

struct ModelEntry {
    label: &'static str,
    id: &'static str,
    provider: Provider,
    context_window: u32,
    max_tokens: u32,
}

const BUILTIN_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        label: "GPT 3.5",
        id: "gpt-3.5-turbo-0125",
        provider: Provider::OpenAI,
        context_window: 16_385,
        max_tokens: 4096,
    },
    ModelEntry {
        label: "GPT 4",
        id: "gpt-4-turbo-2024-04-09",
        provider: Provider::OpenAI,
        context_window: 128_000,
        max_tokens: 4096,
    },
    ModelEntry {
        label: "GPT 4o",
        id: "gpt-4o-2024-05-13",
        provider: Provider::OpenAI,
        context_window: 128_000,
        max_tokens: 4096,
    },
];

impl ModelEntry {
    fn to_model(&self) -> Model {
        Model::new(self.id, self.label, self.provider)
            .with_limits(self.context_window, self.max_tokens)
    }
}

/// Ordered mapping from friendly label to backend model.
///
/// The catalogue is an immutable value handed to the generator; nothing here
/// is process-wide state.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<(String, Model)>,
}

impl ModelCatalog {
    /// An empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in OpenAI labels
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for entry in BUILTIN_ENTRIES {
            catalog.insert(entry.label, entry.to_model());
        }
        catalog
    }

    /// Add or replace the model behind a label
    pub fn insert(&mut self, label: impl Into<String>, model: Model) {
        let label = label.into();
        if let Some(slot) = self.entries.iter_mut().find(|(l, _)| *l == label) {
            slot.1 = model;
        } else {
            self.entries.push((label, model));
        }
    }

    /// Look up a model by friendly label, falling back to an exact backend id.
    pub fn resolve(&self, label_or_id: &str) -> Result<Model> {
        self.entries
            .iter()
            .find(|(label, _)| label == label_or_id)
            .or_else(|| self.entries.iter().find(|(_, m)| m.id == label_or_id))
            .map(|(_, model)| model.clone())
            .ok_or_else(|| Error::ModelNotFound(label_or_id.to_string()))
    }

    /// Labels in insertion order
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(l, _)| l.as_str()).collect()
    }

    /// Iterate over (label, model) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Model)> {
        self.entries.iter().map(|(l, m)| (l.as_str(), m))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
