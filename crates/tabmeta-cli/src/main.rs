//! tabmeta - generate dataset and column metadata with a language model

mod config;
mod inspect;
mod utils;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabmeta_agent::{GenerationEvent, GeneratorConfig, MetadataGenerator, ProviderInvoker};

use crate::inspect::Source;

/// tabmeta - describe tables and their columns with a language model
#[derive(Parser, Debug)]
#[command(name = "tabmeta")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// PostgreSQL connection string
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// PostgreSQL schema holding the tables (default: public)
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Read datasets from the CSV files of this directory
    #[arg(long, global = true)]
    csv_dir: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate metadata for one table
    Generate {
        /// Table (dataset) to describe
        table: String,

        /// Model label or backend id (see `tabmeta models`)
        #[arg(short, long)]
        model: Option<String>,

        /// Columns requested per round
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the tables of the data source
    Tables,

    /// Print sample rows of a table as CSV
    Sample {
        table: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// List the configured models
    Models,

    /// Write an example config file
    InitConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

const DEFAULT_MODEL: &str = "GPT 4o";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("tabmeta=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    if let Command::InitConfig = args.command {
        return init_config();
    }

    let cfg = config::Config::load();

    if let Command::Models = args.command {
        for (label, model) in cfg.catalog().iter() {
            println!("{:<16} {} ({})", label, model.id, model.provider.name());
        }
        return Ok(());
    }

    // CLI flags take precedence over the config file
    let source = Source::resolve(
        args.csv_dir.or(cfg.csv_dir.clone()),
        args.database_url.or(cfg.database_url.clone()),
        args.schema.or(cfg.database_schema.clone()),
    )?;
    let inspector = source.connect().await?;

    match args.command {
        Command::Tables => {
            let tables = inspector
                .list_tables()
                .await
                .context("Failed to list tables")?;
            for table in tables {
                println!("{}", table);
            }
            Ok(())
        }
        Command::Sample { table, limit } => {
            let sample = inspector
                .sample_rows(&table, limit)
                .await
                .with_context(|| format!("Failed to sample '{}'", table))?;
            print!("{}", sample.to_csv()?);
            Ok(())
        }
        Command::Generate {
            table,
            model,
            batch_size,
            format,
            output,
        } => {
            let label = model
                .or(cfg.default_model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            let defaults = GeneratorConfig::default();
            let generator_config = GeneratorConfig {
                models: cfg.catalog(),
                batch_size: batch_size.or(cfg.batch_size).unwrap_or(defaults.batch_size),
                sample_row_limit: cfg.sample_row_limit.unwrap_or(defaults.sample_row_limit),
                ..defaults
            };
            run_generate(
                &cfg,
                generator_config,
                inspector,
                &table,
                &label,
                format,
                output,
            )
            .await
        }
        Command::Models | Command::InitConfig => Ok(()),
    }
}

fn init_config() -> anyhow::Result<()> {
    let (path, created) = config::Config::init().context("Failed to create config file")?;
    if created {
        println!("Config file created at: {}", path.display());
    } else {
        println!("Config file already exists at: {}", path.display());
    }
    println!("\nExample config:\n{}", config::example_config());
    Ok(())
}

async fn run_generate(
    cfg: &config::Config,
    generator_config: GeneratorConfig,
    inspector: Arc<dyn tabmeta_agent::SchemaInspector>,
    table: &str,
    label: &str,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let model = generator_config.models.resolve(label)?;

    // Check for an API key before doing any work
    let invoker = match cfg.get_api_key(model.provider) {
        Some(key) => ProviderInvoker::with_api_key(key),
        None => {
            if let Some(var) = model.provider.api_key_env_var() {
                eprintln!("Error: No API key found for {}", model.provider.name());
                eprintln!();
                eprintln!("Set your API key with: export {}=your-key", var);
                eprintln!("Or add it to config file: tabmeta init-config");
                std::process::exit(1);
            }
            ProviderInvoker::new()
        }
    };

    let generator = MetadataGenerator::new(generator_config, inspector, Arc::new(invoker));
    let mut receiver = generator.subscribe();

    // Spawn event handler
    let handle = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            let terminal = event.is_terminal();
            match event {
                GenerationEvent::GenerationStart {
                    dataset_id,
                    model,
                    total_columns,
                    ..
                } => {
                    eprintln!(
                        "[{}: {} columns, model {}]",
                        dataset_id, total_columns, model
                    );
                }
                GenerationEvent::RoundStart { round, batch, .. } => {
                    eprintln!("[Round {}: {}]", round, batch.join(", "));
                }
                GenerationEvent::CapabilityStart {
                    tool_name,
                    arguments,
                    ..
                } => {
                    let preview = crate::utils::truncate_chars(&arguments.to_string(), 80);
                    eprintln!("[Running {} {}]", tool_name, preview);
                }
                GenerationEvent::CapabilityEnd {
                    tool_name,
                    is_error: true,
                    ..
                } => {
                    eprintln!("[{} failed]", tool_name);
                }
                GenerationEvent::RoundEnd {
                    new_columns,
                    processed,
                    total,
                    ..
                } => {
                    eprintln!("[+{} columns, {}/{} done]", new_columns, processed, total);
                }
                GenerationEvent::GenerationEnd { rounds, usage, .. } => {
                    eprintln!(
                        "[Done in {} rounds | Tokens: {} in, {} out]",
                        rounds, usage.input, usage.output
                    );
                }
                GenerationEvent::Error { message, .. } => {
                    eprintln!("Error: {}", message);
                }
                _ => {}
            }
            if terminal {
                break;
            }
        }
    });

    let result = generator.generate_metadata(table, label).await;

    // Let the handler drain the final events
    if tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .is_err()
    {
        tracing::debug!("Event handler did not finish in time");
    }

    let metadata = result?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&metadata)?,
        OutputFormat::Text => utils::render_text(&metadata),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Metadata written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let args = Args::try_parse_from([
            "tabmeta",
            "--csv-dir",
            "./data",
            "generate",
            "orders",
            "--model",
            "GPT 4",
            "--format",
            "text",
        ])
        .unwrap();
        assert_eq!(args.csv_dir.as_deref(), Some("./data"));
        match args.command {
            Command::Generate {
                table,
                model,
                format,
                batch_size,
                ..
            } => {
                assert_eq!(table, "orders");
                assert_eq!(model.as_deref(), Some("GPT 4"));
                assert_eq!(format, OutputFormat::Text);
                assert!(batch_size.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flag_after_subcommand() {
        let args = Args::try_parse_from(["tabmeta", "tables", "--schema", "sales", "-v"]).unwrap();
        assert_eq!(args.schema.as_deref(), Some("sales"));
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Tables));
    }

    #[test]
    fn test_sample_default_limit() {
        let args = Args::try_parse_from(["tabmeta", "sample", "orders"]).unwrap();
        assert!(matches!(args.command, Command::Sample { limit: 5, .. }));
    }
}
