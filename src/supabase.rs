use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::config::AppConfig;
use crate::db::{self, EventStore};
use crate::error::{IngestError, StoreError};
use crate::models::{NormalizedEvent, StoredEvent};

const TABLE: &str = "hackathons";

/// `EventStore` backed by the `hackathons` table of a Supabase project,
/// spoken to through its PostgREST endpoint.
pub struct SupabaseStore {
    client: Client,
    table_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(client: Client, project_url: &str, service_key: &str) -> Self {
        let base = project_url.trim_end_matches('/');
        Self {
            client,
            table_url: format!("{base}/rest/v1/{TABLE}"),
            service_key: service_key.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, IngestError> {
        let project_url = config
            .supabase_url
            .as_deref()
            .ok_or_else(|| IngestError::Config("SUPABASE_URL is not set".to_string()))?;
        let service_key = config
            .supabase_service_role_key
            .as_deref()
            .ok_or_else(|| {
                IngestError::Config("SUPABASE_SERVICE_ROLE_KEY is not set".to_string())
            })?;

        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| IngestError::Config(format!("http client: {err}")))?;

        Ok(Self::new(client, project_url, service_key))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl EventStore for SupabaseStore {
    async fn upsert(&self, event: &NormalizedEvent) -> Result<(), StoreError> {
        db::require_url(event)?;
        let request = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "url")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(event);
        self.send(request).await.map(|_| ())
    }

    async fn list_by_start(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let request = self.client.get(&self.table_url).query(&[
            ("select", "*"),
            ("order", "start_date.asc.nullslast,created_at.asc"),
        ]);
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
