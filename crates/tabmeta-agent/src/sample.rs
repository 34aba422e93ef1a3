//! The `fetch_sample_rows` capability

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::schema::SchemaInspector;
use crate::tool::{Tool, ToolResult};

pub const FETCH_SAMPLE_ROWS: &str = "fetch_sample_rows";

#[derive(Deserialize)]
struct FetchSampleRowsArgs {
    dataset_id: String,
}

/// Lets the model look at a bounded number of rows, rendered as CSV
pub struct FetchSampleRowsTool {
    inspector: Arc<dyn SchemaInspector>,
    limit: usize,
}

impl FetchSampleRowsTool {
    pub fn new(inspector: Arc<dyn SchemaInspector>, limit: usize) -> Self {
        Self { inspector, limit }
    }
}

#[async_trait]
impl Tool for FetchSampleRowsTool {
    fn name(&self) -> &str {
        FETCH_SAMPLE_ROWS
    }

    fn description(&self) -> &str {
        "Fetch a few sample rows of a dataset as CSV with a header row. \
         Use this to see real values before describing columns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dataset_id": {
                    "type": "string",
                    "description": "Name of the dataset (table) to sample"
                }
            },
            "required": ["dataset_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult {
        let args: FetchSampleRowsArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        tracing::debug!("Sampling {} rows of '{}'", self.limit, args.dataset_id);
        let sample = match self.inspector.sample_rows(&args.dataset_id, self.limit).await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(format!("Failed to sample '{}': {}", args.dataset_id, e)),
        };

        match sample.to_csv() {
            Ok(csv) => ToolResult::text(csv),
            Err(e) => ToolResult::error(format!("Failed to render sample: {}", e)),
        }
    }
}
