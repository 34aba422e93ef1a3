//! Prompt rendering

use crate::parser::format_instructions;
use crate::sample::FETCH_SAMPLE_ROWS;

const SYSTEM_PROMPT: &str = "You are an expert in analyzing data. You generate meaningful \
definitions for datasets and their columns, infer data types, and identify the sensitivity \
of the data they hold.";

/// Renders the messages of each round.
///
/// Pure: the same dataset and batch always produce the same text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    format_instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            format_instructions: format_instructions(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    /// Opening request: fetch samples, then describe the first batch
    pub fn first_round(&self, dataset_id: &str, batch: &[String]) -> String {
        format!(
            "You are provided with a table or dataset. Your tasks are:\n\
             1. Get sample data for the table '{dataset}'. Call the `{tool}` tool with \
             dataset_id \"{dataset}\" if you need to see values.\n\
             2. Analyze the sample data and create metadata for the dataset and for each of \
             the columns listed below. For every column give a definition, data type, \
             sensitivity, tags and your analysis.\n\
             {columns}\n\n\
             Format your output as per the instructions:\n{format}",
            dataset = dataset_id,
            tool = FETCH_SAMPLE_ROWS,
            columns = render_batch(batch),
            format = self.format_instructions,
        )
    }

    /// Follow-up request naming exactly the next batch
    pub fn next_round(&self, dataset_id: &str, batch: &[String]) -> String {
        format!(
            "Now create the metadata for the following columns of '{dataset}', using the \
             same approach.\n\
             {columns}\n\n\
             Format your output as per the instructions:\n{format}",
            dataset = dataset_id,
            columns = render_batch(batch),
            format = self.format_instructions,
        )
    }
}

/// One line, `Columns: [...]`, as a JSON array of names
fn render_batch(batch: &[String]) -> String {
    format!(
        "Columns: {}",
        serde_json::to_string(batch).unwrap_or_else(|_| format!("{:?}", batch))
    )
}
