use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use artcross_import::Importer;
use artcross_storage::CatalogStore;

#[derive(Debug, Parser)]
#[command(name = "artcross")]
#[command(about = "Article cross-reference catalog: import, migrate, serve")]
struct Cli {
    /// SQLite database location.
    #[arg(long, global = true, default_value = "sqlite://artcross.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a product spreadsheet into the catalog.
    Import {
        file: PathBuf,
        /// Keep the source file instead of deleting it after the run.
        #[arg(long)]
        keep_file: bool,
    },
    /// Apply the database schema.
    Migrate,
    /// Serve the query/update API.
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = CatalogStore::connect(&cli.db).await?;
    store.migrate().await?;

    match cli.command {
        Commands::Import { file, keep_file } => {
            let importer = Importer::new(store);
            let summary = if keep_file {
                importer.run(&file).await?
            } else {
                importer.run_and_cleanup(&file).await?
            };
            println!(
                "import complete: run_id={} rows={} created={} updated={} skipped={} errors={}",
                summary.run_id,
                summary.total_rows,
                summary.created,
                summary.updated,
                summary.skipped,
                summary.errors
            );
        }
        Commands::Migrate => {
            info!(db = %cli.db, "schema applied");
            println!("schema applied to {}", cli.db);
        }
        Commands::Serve { port } => {
            artcross_web::serve(store, port).await?;
        }
    }

    Ok(())
}
