pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod server;
pub mod sources;
pub mod supabase;
mod utils;

pub use config::AppConfig;
pub use db::{EventStore, MemoryStore, SqliteStore};
pub use error::{IngestError, Result, StoreError};
pub use ingest::{ensure_populated, run_ingestion, IngestSummary, SourceCounts};
pub use models::{Location, NormalizedEvent, Source, StoredEvent};
pub use sources::{HttpFetcher, ListingFetcher, RawListing};

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
