use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use courtside_client::{ApiConfig, FixtureClient};
use courtside_core::{FetchOutcome, FetchRequest};
use courtside_store::BulkLoader;
use courtside_sync::{orchestrator_from_env, run_today_from_env, SyncConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "courtside")]
#[command(about = "Tennis fixture ingestion command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch one day of fixtures and insert them into the database.
    Sync {
        /// Day to sync (YYYY-MM-DD); defaults to today in local time.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fetch fixtures and print them without touching the database.
    Fetch {
        #[arg(long)]
        date_start: NaiveDate,
        /// Defaults to --date-start.
        #[arg(long)]
        date_stop: Option<NaiveDate>,
        #[arg(long)]
        player_key: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Create the destination schema and table if they do not exist.
    Migrate,
    /// Serve the fixtures dashboard.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("COURTSIDE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Commands::Sync { date: None }) {
        Commands::Sync { date } => {
            let result = match date {
                Some(date) => orchestrator_from_env()?.run(date).await,
                None => run_today_from_env().await?,
            };
            println!("{}", result.message);
            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Fetch {
            date_start,
            date_stop,
            player_key,
            format,
        } => {
            let client = FixtureClient::new(ApiConfig::from_env())?;
            let mut request = FetchRequest::new(date_start, date_stop.unwrap_or(date_start));
            if let Some(player_key) = player_key {
                request = request.with_player_key(player_key);
            }
            let rows = match client.fetch(&request).await {
                FetchOutcome::Fixtures(rows) => rows,
                FetchOutcome::Empty => {
                    eprintln!("No fixtures found");
                    Vec::new()
                }
                FetchOutcome::Failed(failure) => {
                    eprintln!("Failed to fetch fixtures: {failure}");
                    return Ok(ExitCode::FAILURE);
                }
            };
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&rows).context("serializing fixtures")?;
                    println!("{json}");
                }
                OutputFormat::Csv => print!("{}", courtside_web::fixtures_csv(&rows)),
            }
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            BulkLoader::from_env()
                .ensure_table(&config.schema, &config.table)
                .await
                .with_context(|| format!("creating {}.{}", config.schema, config.table))?;
            println!("table {}.{} is ready", config.schema, config.table);
        }
        Commands::Serve { port } => {
            courtside_web::serve_from_env(port).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
