use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use models::{BatchEntry, BatchReport, EntryOutcome};
use services::batch::{run_batch, BatchManifest};

#[derive(Parser, Debug)]
#[command(about = "Convert CSV files into SQLite tables")]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert the given CSV files, or every entry of a manifest.
    Convert {
        /// JSON manifest: an array of {input_path, output_path?, table_name?, index_columns?}.
        #[arg(long, conflicts_with = "inputs")]
        manifest: Option<PathBuf>,

        /// Output database (single input only). Defaults to the input path with a .db extension.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Table name (single input only). Defaults to the cleaned file name.
        #[arg(long)]
        table: Option<String>,

        /// Column to index, skipping the index advisor. Repeatable; single input only.
        #[arg(long = "index")]
        index_columns: Vec<String>,

        /// Print the batch report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        inputs: Vec<PathBuf>,
    },
    /// Serve the conversion API over HTTP.
    Serve {
        /// Listen address, overriding CSV2SQLITE_ADDR.
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init_logging(&cli.log_level)?;

    // Load configuration
    let config = config::load_config()?;

    match cli.command {
        Command::Convert {
            manifest,
            output,
            table,
            index_columns,
            json,
            inputs,
        } => {
            let entries = match manifest {
                Some(path) => BatchManifest::from_path(&path)
                    .with_context(|| format!("Failed to load manifest {}", path.display()))?
                    .into_entries(),
                None => entries_from_args(inputs, output, table, index_columns)?,
            };
            anyhow::ensure!(!entries.is_empty(), "Nothing to convert: pass CSV paths or --manifest");

            let report = tokio::task::spawn_blocking(move || run_batch(&entries, &config)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }

            Ok(if report.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or(config.listen_addr);

            // Build our application state
            let state = Arc::new(AppState::new(config));

            let app = Router::new()
                .merge(routes::routes())
                .merge(routes::conversions::routes())
                .layer(TraceLayer::new_for_http())
                .with_state(state);

            tracing::info!("listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;

            Ok(ExitCode::SUCCESS)
        }
    }
}

fn entries_from_args(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    table: Option<String>,
    index_columns: Vec<String>,
) -> Result<Vec<BatchEntry>> {
    let single_only = output.is_some() || table.is_some() || !index_columns.is_empty();
    anyhow::ensure!(
        !single_only || inputs.len() == 1,
        "--output, --table and --index need exactly one input file"
    );

    Ok(inputs
        .into_iter()
        .map(|input_path| BatchEntry {
            input_path,
            output_path: output.clone(),
            table_name: table.clone(),
            index_columns: (!index_columns.is_empty()).then(|| index_columns.clone()),
        })
        .collect())
}

fn print_summary(report: &BatchReport) {
    for outcome in &report.entries {
        match outcome {
            EntryOutcome::Success(r) => {
                println!(
                    "OK   {} -> {} (table '{}', {} rows, {})",
                    r.input_path.display(),
                    r.output_path.display(),
                    r.table_name,
                    r.row_count,
                    r.encoding
                );
                for column in &r.columns {
                    println!("       - {} {}", column.name, column.inferred_type);
                }
                if r.indexes.is_empty() {
                    println!("       no indexes created");
                } else {
                    println!("       indexes: {}", r.indexes.join(", "));
                }
            }
            EntryOutcome::Failure {
                input_path,
                kind,
                message,
                ..
            } => {
                println!("FAIL {} [{}] {}", input_path.display(), kind, message);
            }
        }
    }
    println!("{} succeeded, {} failed", report.succeeded, report.failed);
}

// Application state
#[derive(Clone)]
pub struct AppState {
    config: config::Config,
}

impl AppState {
    fn new(config: config::Config) -> Self {
        Self { config }
    }
}
