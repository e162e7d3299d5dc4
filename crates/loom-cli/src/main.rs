use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loom_storage::PatternStore;

#[derive(Debug, Parser)]
#[command(name = "loom-cli")]
#[command(about = "Loom pattern catalog command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web interface (default).
    Serve,
    /// Create the database schema and exit.
    Migrate,
    /// Print the JSON export envelope to stdout.
    Export {
        /// Only export patterns carrying this tag.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Bulk-import patterns from a JSON file.
    Import { file: PathBuf },
    /// Insert reference professions by name.
    SeedProfessions { names: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => loom_web::serve_from_env().await?,
        Commands::Migrate => {
            let store = connect().await?;
            store.migrate().await?;
            println!("schema ready");
        }
        Commands::Export { tag } => {
            let store = connect().await?;
            store.migrate().await?;
            let envelope = loom_transfer::export_patterns(&store, tag.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let store = connect().await?;
            store.migrate().await?;
            let summary = loom_transfer::import_patterns(&store, &raw).await?;
            println!(
                "import complete: state={} new_records={} missing_professions={:?}",
                summary.state, summary.new_records_count, summary.missing_professions
            );
        }
        Commands::SeedProfessions { names } => {
            let store = connect().await?;
            store.migrate().await?;
            for name in &names {
                store
                    .create_profession(name)
                    .await
                    .with_context(|| format!("seeding profession {name}"))?;
            }
            println!("seeded {} professions", names.len());
        }
    }

    Ok(())
}

async fn connect() -> Result<PatternStore> {
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:loom.db".to_string());
    PatternStore::connect(&database_url)
        .await
        .with_context(|| format!("connecting to {database_url}"))
}
