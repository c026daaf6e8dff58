use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::db::EventStore;
use crate::error::Result;
use crate::models::{NormalizedEvent, Source, StoredEvent};
use crate::sources::{ListingFetcher, RawListing};

/// Raw record counts per provider, as fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub mlh: usize,
    pub devpost: usize,
}

impl SourceCounts {
    fn record(&mut self, listing: &RawListing) {
        match listing.source() {
            Source::Mlh => self.mlh += listing.raw_count(),
            Source::Devpost => self.devpost += listing.raw_count(),
        }
    }

    pub fn total(&self) -> usize {
        self.mlh + self.devpost
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub sources: SourceCounts,
}

impl IngestSummary {
    pub fn message(&self) -> String {
        format!("Fetched and stored {} hackathons", self.success_count)
    }
}

/// Fetches both providers, normalizes every record and upserts each one on
/// its own. Only fetch-level failures abort the run; a failed upsert is
/// counted in `error_count`.
pub async fn run_ingestion(
    fetcher: &dyn ListingFetcher,
    store: &dyn EventStore,
) -> Result<IngestSummary> {
    info!("starting hackathon ingestion");

    let (mlh, devpost) = tokio::try_join!(
        fetcher.fetch(Source::Mlh),
        fetcher.fetch(Source::Devpost)
    )?;

    let mut sources = SourceCounts::default();
    sources.record(&mlh);
    sources.record(&devpost);

    let mut candidates = mlh.normalize();
    candidates.extend(devpost.normalize());
    info!(
        mlh = sources.mlh,
        devpost = sources.devpost,
        total = candidates.len(),
        "normalized hackathons"
    );

    let (success_count, error_count) = persist_events(store, &candidates).await;
    let summary = IngestSummary {
        success_count,
        error_count,
        sources,
    };

    info!(
        success = summary.success_count,
        errors = summary.error_count,
        "inserted/updated hackathons"
    );
    Ok(summary)
}

async fn persist_events(store: &dyn EventStore, events: &[NormalizedEvent]) -> (usize, usize) {
    let mut success = 0;
    let mut failed = 0;

    for event in events {
        match store.upsert(event).await {
            Ok(()) => success += 1,
            Err(err) => {
                error!(title = %event.title, url = %event.url, error = %err, "upsert failed");
                failed += 1;
            }
        }
    }

    (success, failed)
}

/// Reads every stored event; when the store is empty, runs one ingestion
/// first and reads again.
pub async fn ensure_populated(
    fetcher: &dyn ListingFetcher,
    store: &dyn EventStore,
) -> Result<Vec<StoredEvent>> {
    let events = store.list_by_start().await?;
    if !events.is_empty() {
        return Ok(events);
    }

    info!("store is empty, triggering initial ingestion");
    let summary = run_ingestion(fetcher, store).await?;
    info!(stored = summary.success_count, "initial ingestion finished");
    Ok(store.list_by_start().await?)
}
