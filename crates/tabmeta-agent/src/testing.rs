//! In-memory inspector and scripted invokers for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tabmeta_ai::{Content, Context, Message, Model, StreamOptions, Usage};

use crate::invoker::ModelInvoker;
use crate::schema::{InspectError, SampleRows, SchemaInspector};

#[derive(Default)]
pub struct MemoryInspector {
    tables: BTreeMap<String, SampleRows>,
    column_calls: AtomicUsize,
    sample_calls: AtomicUsize,
}

impl MemoryInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        self.tables.insert(
            name.to_string(),
            SampleRows {
                columns: columns.iter().map(|s| s.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|s| s.to_string()).collect())
                    .collect(),
            },
        );
        self
    }

    pub fn column_calls(&self) -> usize {
        self.column_calls.load(Ordering::SeqCst)
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    fn table(&self, dataset: &str) -> Result<&SampleRows, InspectError> {
        self.tables
            .get(dataset)
            .ok_or_else(|| InspectError::NotFound(dataset.to_string()))
    }
}

#[async_trait]
impl SchemaInspector for MemoryInspector {
    async fn list_tables(&self) -> Result<Vec<String>, InspectError> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_columns(&self, dataset: &str) -> Result<Vec<String>, InspectError> {
        self.column_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table(dataset)?.columns.clone())
    }

    async fn sample_rows(&self, dataset: &str, limit: usize) -> Result<SampleRows, InspectError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        let table = self.table(dataset)?;
        Ok(SampleRows {
            columns: table.columns.clone(),
            rows: table.rows.iter().take(limit).cloned().collect(),
        })
    }
}

/// An assistant message carrying only text
pub fn text_reply(text: &str) -> Message {
    Message::assistant(vec![Content::text(text)])
}

/// An assistant message requesting capabilities, `(id, name, arguments)`
pub fn tool_reply(calls: &[(&str, &str, serde_json::Value)]) -> Message {
    Message::assistant(
        calls
            .iter()
            .map(|(id, name, args)| Content::tool_call(*id, *name, args.clone()))
            .collect(),
    )
}

/// A fenced JSON payload describing `columns`
pub fn payload_reply(dataset: &str, columns: &[&str]) -> Message {
    text_reply(&format!("```json\n{}\n```", payload_json(dataset, columns)))
}

pub fn payload_json(dataset: &str, columns: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "name": dataset,
        "description": format!("The {} dataset", dataset),
        "columns": columns.iter().map(|c| serde_json::json!({
            "name": c,
            "data_type": "string",
            "description": format!("The {} column", c),
            "sensitivity": "not sensitive",
            "tags": ["Other"],
            "analysis": "from the sample"
        })).collect::<Vec<_>>()
    })
}

/// Plays back a fixed list of replies and records every context it was sent
#[derive(Default)]
pub struct ScriptedInvoker {
    replies: Mutex<VecDeque<Message>>,
    contexts: Mutex<Vec<Context>>,
}

impl ScriptedInvoker {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        _model: &Model,
        context: &Context,
        _options: &StreamOptions,
    ) -> tabmeta_ai::Result<(Message, Usage)> {
        self.contexts.lock().push(context.clone());
        match self.replies.lock().pop_front() {
            Some(message) => Ok((message, Usage { input: 10, output: 5 })),
            None => Err(tabmeta_ai::Error::UnexpectedResponse(
                "script exhausted".to_string(),
            )),
        }
    }
}

static COLUMNS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Columns: (\[.*\])$").unwrap());

/// Answers every prompt with metadata for exactly the columns it names
#[derive(Default)]
pub struct EchoInvoker {
    calls: AtomicUsize,
}

impl EchoInvoker {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelInvoker for EchoInvoker {
    async fn invoke(
        &self,
        _model: &Model,
        context: &Context,
        _options: &StreamOptions,
    ) -> tabmeta_ai::Result<(Message, Usage)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = context
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::User { .. }))
            .map(|m| m.text())
            .unwrap_or_default();
        let batch: Vec<String> = COLUMNS_LINE
            .captures(&prompt)
            .and_then(|c| serde_json::from_str(&c[1]).ok())
            .unwrap_or_default();
        let names: Vec<&str> = batch.iter().map(String::as_str).collect();
        Ok((payload_reply("echo", &names), Usage { input: 1, output: 1 }))
    }
}
