use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use shelf::config::Config;
use shelf::{Fields, StoreRegistry};

#[derive(Parser)]
#[command(name = "shelf", version, about = "Inspect and maintain shelf record stores")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "shelf.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List records.
    List {
        db: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show one record.
    Get { db: String, id: String },
    /// Create a record from a JSON object.
    Create { db: String, fields: String },
    /// Replace the fields of a record with a JSON object.
    Update {
        db: String,
        id: String,
        fields: String,
    },
    /// Delete a record.
    Delete { db: String, id: String },
    /// List backup snapshots, oldest first.
    Backups { db: String },
    /// Restore a backup snapshot over the live document.
    Restore { db: String, snapshot: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?
        .with_env_overrides();
    let registry = StoreRegistry::from_config(&config);

    match cli.command {
        Command::List { db, limit } => print(&registry.get(&db)?.get_all(limit).await?),
        Command::Get { db, id } => print(&registry.get(&db)?.get(&id).await?),
        Command::Create { db, fields } => {
            print(&registry.get(&db)?.save(parse_fields(&fields)?).await?)
        }
        Command::Update { db, id, fields } => {
            print(&registry.get(&db)?.update(&id, parse_fields(&fields)?).await?)
        }
        Command::Delete { db, id } => print(&registry.get(&db)?.delete(&id).await?),
        Command::Backups { db } => print(&registry.get(&db)?.list_backups().await?),
        Command::Restore { db, snapshot } => {
            print(&registry.get(&db)?.restore_backup(&snapshot).await?)
        }
    }
}

fn parse_fields(raw: &str) -> Result<Fields> {
    match serde_json::from_str(raw).context("fields must be valid JSON")? {
        serde_json::Value::Object(fields) => Ok(fields),
        _ => bail!("fields must be a JSON object"),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
