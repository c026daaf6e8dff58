pub mod base;
pub mod devpost;
pub mod mlh;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::AppConfig;
use crate::error::{IngestError, Result};
use crate::models::{NormalizedEvent, Source};

use devpost::{DevpostHackathon, DevpostListing};
use mlh::MlhEvent;

/// Converts one provider record into the canonical event shape.
pub trait Normalize {
    fn normalize(self) -> NormalizedEvent;
}

/// A provider payload as fetched, tagged by provider.
#[derive(Debug, Clone)]
pub enum RawListing {
    Mlh(Vec<MlhEvent>),
    Devpost(Vec<DevpostHackathon>),
}

impl RawListing {
    pub fn source(&self) -> Source {
        match self {
            RawListing::Mlh(_) => Source::Mlh,
            RawListing::Devpost(_) => Source::Devpost,
        }
    }

    pub fn raw_count(&self) -> usize {
        match self {
            RawListing::Mlh(events) => events.len(),
            RawListing::Devpost(events) => events.len(),
        }
    }

    pub fn normalize(self) -> Vec<NormalizedEvent> {
        match self {
            RawListing::Mlh(events) => events.into_iter().map(Normalize::normalize).collect(),
            RawListing::Devpost(events) => events.into_iter().map(Normalize::normalize).collect(),
        }
    }
}

impl Source {
    pub fn endpoint<'a>(&self, config: &'a AppConfig) -> &'a str {
        match self {
            Source::Mlh => &config.mlh_url,
            Source::Devpost => &config.devpost_url,
        }
    }
}

/// Outbound side of ingestion: retrieves one provider's raw listing.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn fetch(&self, source: Source) -> Result<RawListing>;
}

pub struct HttpFetcher {
    client: Client,
    mlh_url: String,
    devpost_url: String,
}

impl HttpFetcher {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| IngestError::Config(format!("http client: {err}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            mlh_url: Source::Mlh.endpoint(config).to_string(),
            devpost_url: Source::Devpost.endpoint(config).to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| IngestError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|source| IngestError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ListingFetcher for HttpFetcher {
    async fn fetch(&self, source: Source) -> Result<RawListing> {
        let listing = match source {
            Source::Mlh => RawListing::Mlh(self.get_json::<Vec<MlhEvent>>(&self.mlh_url).await?),
            Source::Devpost => RawListing::Devpost(
                self.get_json::<DevpostListing>(&self.devpost_url)
                    .await?
                    .into_hackathons(),
            ),
        };
        tracing::info!(source = %source, count = listing.raw_count(), "fetched listing");
        Ok(listing)
    }
}
