//! Bookstore maintenance CLI.
//!
//! ```bash
//! bookstore-cli migrate
//! bookstore-cli sales-report --output-dir sales_reports --filename-prefix sales_report
//! bookstore-cli import-books books.json
//! bookstore-cli restore-stock
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bookstore_sales::repository::{postgres, PgRepository};
use bookstore_sales::report::SalesReport;
use bookstore_sales::{Bookstore, Config};

#[derive(Parser)]
#[command(name = "bookstore-cli")]
#[command(author, version, about = "Bookstore maintenance tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Write a sales report for last month, the last 7 days and top customers
    SalesReport {
        /// Directory the report is written to
        #[arg(long, default_value = "sales_reports")]
        output_dir: PathBuf,

        /// Report file name prefix
        #[arg(long, default_value = "sales_report")]
        filename_prefix: String,

        /// Do not echo the report to stdout
        #[arg(long)]
        quiet: bool,
    },
    /// Import books from a JSON file, upserting by ISBN
    ImportBooks {
        json_file: PathBuf,
    },
    /// Return stock held by expired quick adds
    RestoreStock,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bookstore_sales::init_tracing();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    let pool = postgres::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")?;
    let store = Bookstore::with_log_events(Arc::new(PgRepository::new(pool)), config.settings);

    match cli.command {
        Commands::Migrate => tracing::info!("Migrations complete"),
        Commands::SalesReport { output_dir, filename_prefix, quiet } => {
            let report = SalesReport::build(store.repository().as_ref(), chrono::Utc::now()).await?;
            if !quiet {
                println!("{}", report.render());
            }
            let path = report.write_to(&output_dir, &filename_prefix)?;
            println!("Report saved to {}", path.display());
        }
        Commands::ImportBooks { json_file } => {
            let summary = store.import_books_file(&json_file).await?;
            println!("Imported {} new and {} updated books", summary.created, summary.updated);
        }
        Commands::RestoreStock => {
            let summary = store.restore_expired_reservations(chrono::Utc::now()).await?;
            println!(
                "Released {} units from {} lines across {} sessions",
                summary.units, summary.lines, summary.sessions
            );
        }
    }
    Ok(())
}
