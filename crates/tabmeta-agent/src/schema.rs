//! Schema inspection boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a schema inspector
#[derive(Error, Debug)]
pub enum InspectError {
    /// The named dataset does not exist
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// The underlying store failed
    #[error("{0}")]
    Backend(String),
}

/// A bounded sample of rows, values rendered as text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SampleRows {
    /// Serialize as CSV with a header row
    pub fn to_csv(&self) -> Result<String, InspectError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| InspectError::Backend(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| InspectError::Backend(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| InspectError::Backend(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| InspectError::Backend(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read-only access to the datasets being described
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Names of all datasets this inspector can see
    async fn list_tables(&self) -> Result<Vec<String>, InspectError>;

    /// Column names of a dataset, in declaration order
    async fn list_columns(&self, dataset: &str) -> Result<Vec<String>, InspectError>;

    /// At most `limit` rows of a dataset
    async fn sample_rows(&self, dataset: &str, limit: usize) -> Result<SampleRows, InspectError>;
}
