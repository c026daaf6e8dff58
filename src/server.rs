use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::db::{self, EventStore};
use crate::error::IngestError;
use crate::ingest::{self, IngestSummary, SourceCounts};
use crate::models::StoredEvent;
use crate::sources::{HttpFetcher, ListingFetcher};

pub struct AppState {
    pub fetcher: Arc<dyn ListingFetcher>,
    pub store: Arc<dyn EventStore>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, IngestError> {
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::from_config(config)?),
            store: db::open_configured(config)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub sources: SourceCounts,
    pub errors: usize,
}

impl From<IngestSummary> for TriggerResponse {
    fn from(summary: IngestSummary) -> Self {
        Self {
            success: true,
            message: summary.message(),
            sources: summary.sources,
            errors: summary.error_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Run-level failure rendered as `500 {"error": "..."}`.
pub struct ApiError(IngestError);

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    bootstrap: bool,
}

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Preflight requests are answered here and never reach a handler.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fetch-hackathons", post(fetch_hackathons))
        .route("/functions/v1/fetch-hackathons", post(fetch_hackathons))
        .route("/hackathons", get(list_hackathons))
        .layer(cors_layer())
        // CorsLayer only lists allowed headers on preflight; plain responses
        // (including the 500) carry them too.
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn fetch_hackathons(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let summary = ingest::run_ingestion(state.fetcher.as_ref(), state.store.as_ref()).await?;
    Ok(Json(summary.into()))
}

async fn list_hackathons(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let events = if params.bootstrap {
        ingest::ensure_populated(state.fetcher.as_ref(), state.store.as_ref()).await?
    } else {
        state
            .store
            .list_by_start()
            .await
            .map_err(IngestError::from)?
    };
    Ok(Json(events))
}

pub async fn serve(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "hackathon ingest listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::db::MemoryStore;
    use crate::ingest::tests::FakeFetcher;

    const ORIGIN: &str = "http://localhost:8080";

    fn app_with(fetcher: Arc<FakeFetcher>, store: Arc<MemoryStore>) -> Router {
        build_router(Arc::new(AppState { fetcher, store }))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn preflight_answers_without_running_ingestion() {
        let fetcher = Arc::new(FakeFetcher::sample());
        let store = Arc::new(MemoryStore::new());
        let app = app_with(fetcher.clone(), store.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/fetch-hackathons")
                    .header(header::ORIGIN, ORIGIN)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(
                        header::ACCESS_CONTROL_REQUEST_HEADERS,
                        "authorization, x-client-info, apikey, content-type",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_lowercase();
        for name in ["authorization", "x-client-info", "apikey", "content-type"] {
            assert!(allowed.contains(name), "missing {name} in {allowed}");
        }
        assert_eq!(fetcher.calls(), 0);
        assert!(store.list_by_start().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trigger_returns_summary() {
        let fetcher = Arc::new(FakeFetcher::sample());
        let store = Arc::new(MemoryStore::new());
        let app = app_with(fetcher, store.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/functions/v1/fetch-hackathons")
                    .header(header::ORIGIN, ORIGIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization, x-client-info, apikey, content-type"
        );

        let body: TriggerResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(
            body,
            TriggerResponse {
                success: true,
                message: "Fetched and stored 5 hackathons".to_string(),
                sources: SourceCounts { mlh: 3, devpost: 2 },
                errors: 0,
            }
        );
        assert_eq!(store.list_by_start().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn fetch_failure_is_a_500_with_error_body() {
        let mut fake = FakeFetcher::sample();
        fake.fail_devpost = true;
        let app = app_with(Arc::new(fake), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/fetch-hackathons")
                    .header(header::ORIGIN, ORIGIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization, x-client-info, apikey, content-type"
        );
        let body = body_json(response).await;
        let message = body["error"].as_str().expect("error message");
        assert!(message.contains("502"), "unexpected message {message}");
        assert!(body.get("success").is_none());
    }

    #[tokio::test]
    async fn read_path_only_bootstraps_when_asked() {
        let fetcher = Arc::new(FakeFetcher::sample());
        let store = Arc::new(MemoryStore::new());

        let response = app_with(fetcher.clone(), store.clone())
            .oneshot(
                Request::builder()
                    .uri("/hackathons")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, Value::Array(vec![]));
        assert_eq!(fetcher.calls(), 0);

        let response = app_with(fetcher.clone(), store.clone())
            .oneshot(
                Request::builder()
                    .uri("/hackathons?bootstrap=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let rows = body_json(response).await;
        let rows = rows.as_array().expect("array");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["url"], "https://climate.devpost.com/");
        assert_eq!(rows[0]["source"], "Devpost");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app_with(
            Arc::new(FakeFetcher::sample()),
            Arc::new(MemoryStore::new()),
        );
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }
}
