use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use hackathon_ingest::server::{self, AppState, TriggerResponse};
use hackathon_ingest::{
    db, ensure_populated, init_tracing, run_ingestion, AppConfig, EventStore, HttpFetcher,
    MemoryStore,
};

#[derive(Parser)]
#[command(name = "hackathon-ingest", about = "Aggregate MLH and Devpost hackathon listings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the fetch trigger and read query over HTTP
    Serve {
        /// Overrides `bind_addr` from the config file or `BIND_ADDR`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one ingestion and print the summary
    Ingest {
        /// Normalize and count without touching the configured store
        #[arg(long)]
        dry_run: bool,
    },
    /// Print stored hackathons ordered by start date
    List {
        /// Run an ingestion first if the store is empty
        #[arg(long)]
        bootstrap: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::load();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            let state = AppState::from_config(&config).context("failed to initialise state")?;
            server::serve(Arc::new(state), &addr).await
        }
        Command::Ingest { dry_run } => {
            let fetcher = HttpFetcher::from_config(&config)?;
            let store: Arc<dyn EventStore> = if dry_run {
                Arc::new(MemoryStore::new())
            } else {
                db::open_configured(&config)?
            };
            let summary = run_ingestion(&fetcher, store.as_ref()).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&TriggerResponse::from(summary))?
            );
            Ok(())
        }
        Command::List { bootstrap } => {
            let store = db::open_configured(&config)?;
            let events = if bootstrap {
                let fetcher = HttpFetcher::from_config(&config)?;
                ensure_populated(&fetcher, store.as_ref()).await?
            } else {
                store.list_by_start().await?
            };
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
    }
}
