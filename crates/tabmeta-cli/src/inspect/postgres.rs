//! PostgreSQL tables as datasets

use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tabmeta_agent::{InspectError, SampleRows, SchemaInspector};

pub struct PostgresInspector {
    pool: PgPool,
    schema: String,
}

impl PostgresInspector {
    pub async fn connect(url: &str, schema: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        tracing::debug!("Connected to PostgreSQL, schema '{}'", schema);
        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }
}

fn backend(e: sqlx::Error) -> InspectError {
    InspectError::Backend(e.to_string())
}

/// Double-quote an identifier for interpolation into SQL
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render one JSON value the way it would appear in a CSV cell
fn cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl SchemaInspector for PostgresInspector {
    async fn list_tables(&self) -> Result<Vec<String>, InspectError> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn list_columns(&self, dataset: &str) -> Result<Vec<String>, InspectError> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(dataset)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        if columns.is_empty() && !self.list_tables().await?.iter().any(|t| t == dataset) {
            return Err(InspectError::NotFound(dataset.to_string()));
        }
        Ok(columns)
    }

    async fn sample_rows(&self, dataset: &str, limit: usize) -> Result<SampleRows, InspectError> {
        let columns = self.list_columns(dataset).await?;
        let sql = format!(
            "SELECT row_to_json(t)::text AS row FROM (SELECT * FROM {}.{} LIMIT $1) t",
            quote_ident(&self.schema),
            quote_ident(dataset)
        );
        let records = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let text: String = record.try_get("row").map_err(backend)?;
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&text).map_err(|e| InspectError::Backend(e.to_string()))?;
            rows.push(columns.iter().map(|c| cell(object.get(c))).collect());
        }
        Ok(SampleRows { columns, rows })
    }
}
