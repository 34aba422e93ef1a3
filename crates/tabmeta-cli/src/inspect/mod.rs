//! Concrete schema sources

mod csv_dir;
mod postgres;

pub use csv_dir::CsvDirInspector;
pub use postgres::PostgresInspector;

use std::sync::Arc;
use tabmeta_agent::SchemaInspector;

/// Where datasets come from, in precedence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    CsvDir(String),
    Postgres { url: String, schema: String },
}

impl Source {
    /// Pick a source: a CSV directory wins over a database URL
    pub fn resolve(
        csv_dir: Option<String>,
        database_url: Option<String>,
        schema: Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(dir) = csv_dir {
            return Ok(Source::CsvDir(dir));
        }
        match database_url {
            Some(url) => Ok(Source::Postgres {
                url,
                schema: schema.unwrap_or_else(|| "public".to_string()),
            }),
            None => anyhow::bail!(
                "No data source configured. Pass --csv-dir or --database-url, \
                 set DATABASE_URL, or add one to the config file (tabmeta init-config)"
            ),
        }
    }

    pub async fn connect(&self) -> anyhow::Result<Arc<dyn SchemaInspector>> {
        Ok(match self {
            Source::CsvDir(dir) => Arc::new(CsvDirInspector::new(dir)?),
            Source::Postgres { url, schema } => {
                Arc::new(PostgresInspector::connect(url, schema).await?)
            }
        })
    }
}
