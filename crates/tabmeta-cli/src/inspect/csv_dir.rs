//! A directory of CSV files as datasets

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabmeta_agent::{InspectError, SampleRows, SchemaInspector};

/// Every `*.csv` file is a dataset named after its lower-cased file stem
pub struct CsvDirInspector {
    files: BTreeMap<String, PathBuf>,
}

impl CsvDirInspector {
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.insert(stem.to_lowercase(), path.clone());
            }
        }
        tracing::debug!("Found {} CSV datasets in {}", files.len(), dir.display());
        Ok(Self { files })
    }

    fn reader(&self, dataset: &str) -> Result<csv::Reader<std::fs::File>, InspectError> {
        let path = self
            .files
            .get(&dataset.to_lowercase())
            .ok_or_else(|| InspectError::NotFound(dataset.to_string()))?;
        csv::Reader::from_path(path).map_err(|e| InspectError::Backend(e.to_string()))
    }
}

fn header(reader: &mut csv::Reader<std::fs::File>) -> Result<Vec<String>, InspectError> {
    Ok(reader
        .headers()
        .map_err(|e| InspectError::Backend(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect())
}

#[async_trait]
impl SchemaInspector for CsvDirInspector {
    async fn list_tables(&self) -> Result<Vec<String>, InspectError> {
        Ok(self.files.keys().cloned().collect())
    }

    async fn list_columns(&self, dataset: &str) -> Result<Vec<String>, InspectError> {
        header(&mut self.reader(dataset)?)
    }

    async fn sample_rows(&self, dataset: &str, limit: usize) -> Result<SampleRows, InspectError> {
        let mut reader = self.reader(dataset)?;
        let columns = header(&mut reader)?;
        let mut rows = Vec::new();
        for record in reader.records().take(limit) {
            let record = record.map_err(|e| InspectError::Backend(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(SampleRows { columns, rows })
    }
}
