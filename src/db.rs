use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::config::AppConfig;
use crate::error::{IngestError, StoreError};
use crate::models::{Location, NormalizedEvent, Source, StoredEvent};
use crate::supabase::SupabaseStore;
use crate::utils;

/// Persistence seam for normalized events. Each `upsert` is atomic on its own;
/// there is no cross-record transaction.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert, or replace the row sharing `event.url`.
    async fn upsert(&self, event: &NormalizedEvent) -> Result<(), StoreError>;

    /// Every row ordered by `start_date` ascending. Rows without a start date
    /// sort last; ties keep insertion order.
    async fn list_by_start(&self) -> Result<Vec<StoredEvent>, StoreError>;
}

/// Supabase when a project URL is configured, the local SQLite file otherwise.
pub fn open_configured(config: &AppConfig) -> Result<Arc<dyn EventStore>, IngestError> {
    if config.supabase_url.is_some() {
        tracing::info!("using supabase store");
        return Ok(Arc::new(SupabaseStore::from_config(config)?));
    }

    let path = config.resolved_database_path();
    tracing::info!(path = %path.display(), "using sqlite store");
    Ok(Arc::new(SqliteStore::open(&path)?))
}

/// Rejects records without a url; every store keys rows on it.
pub(crate) fn require_url(event: &NormalizedEvent) -> Result<(), StoreError> {
    if event.url.trim().is_empty() {
        return Err(StoreError::MissingUrl {
            title: event.title.clone(),
        });
    }
    Ok(())
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS hackathons(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        start_date TEXT,
        end_date TEXT,
        location TEXT NOT NULL,
        theme TEXT NOT NULL DEFAULT '[]',
        url TEXT NOT NULL UNIQUE,
        image_url TEXT,
        source TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_updated TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_hackathons_start_date ON hackathons(start_date);";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection poisoned".to_string()))?;
            op(&guard)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn upsert(&self, event: &NormalizedEvent) -> Result<(), StoreError> {
        require_url(event)?;
        let event = event.clone();
        self.with_conn(move |conn| upsert_row(conn, &event)).await
    }

    async fn list_by_start(&self) -> Result<Vec<StoredEvent>, StoreError> {
        self.with_conn(list_rows).await
    }
}

fn upsert_row(conn: &Connection, event: &NormalizedEvent) -> Result<(), StoreError> {
    let now = Utc::now();
    let theme = serde_json::to_string(&event.theme)?;
    // The WHERE clause keeps an unchanged re-run from touching last_updated.
    conn.execute(
        "INSERT INTO hackathons
            (title, description, start_date, end_date, location, theme, url, image_url, source,
             created_at, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(url) DO UPDATE SET
           title = excluded.title,
           description = excluded.description,
           start_date = excluded.start_date,
           end_date = excluded.end_date,
           location = excluded.location,
           theme = excluded.theme,
           image_url = excluded.image_url,
           source = excluded.source,
           last_updated = excluded.last_updated
         WHERE hackathons.title IS NOT excluded.title
            OR hackathons.description IS NOT excluded.description
            OR hackathons.start_date IS NOT excluded.start_date
            OR hackathons.end_date IS NOT excluded.end_date
            OR hackathons.location IS NOT excluded.location
            OR hackathons.theme IS NOT excluded.theme
            OR hackathons.image_url IS NOT excluded.image_url
            OR hackathons.source IS NOT excluded.source",
        params![
            event.title,
            event.description,
            event.start_date,
            event.end_date,
            event.location.as_str(),
            theme,
            event.url,
            event.image_url,
            event.source.as_str(),
            now,
        ],
    )?;
    Ok(())
}

fn list_rows(conn: &Connection) -> Result<Vec<StoredEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, start_date, end_date, location, theme, url, image_url,
                source, created_at, last_updated
         FROM hackathons
         ORDER BY start_date IS NULL, start_date ASC, id ASC",
    )?;
    let rows = stmt.query_map([], read_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let location: String = row.get(5)?;
    let theme: String = row.get(6)?;
    let source: String = row.get(9)?;

    let id: i64 = row.get(0)?;

    Ok(StoredEvent {
        id: id.to_string(),
        event: NormalizedEvent {
            title: row.get(1)?,
            description: row.get(2)?,
            start_date: row.get(3)?,
            end_date: row.get(4)?,
            location: Location::from_tag(&location)
                .ok_or_else(|| invalid_text(5, format!("unknown location {location}")))?,
            theme: serde_json::from_str(&theme).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?,
            url: row.get(7)?,
            image_url: row.get(8)?,
            source: Source::from_tag(&source)
                .ok_or_else(|| invalid_text(9, format!("unknown source {source}")))?,
        },
        created_at: row.get(10)?,
        last_updated: row.get(11)?,
    })
}

fn invalid_text(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

/// Process-local store used for dry runs.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn upsert(&self, event: &NormalizedEvent) -> Result<(), StoreError> {
        require_url(event)?;
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Task("memory store poisoned".to_string()))?;
        let now = Utc::now();

        match rows.iter_mut().find(|row| row.event.url == event.url) {
            Some(existing) if existing.event == *event => {}
            Some(existing) => {
                existing.event = event.clone();
                existing.last_updated = now;
            }
            None => {
                let id = rows.len() + 1;
                rows.push(StoredEvent {
                    id: id.to_string(),
                    event: event.clone(),
                    created_at: now,
                    last_updated: now,
                });
            }
        }
        Ok(())
    }

    async fn list_by_start(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Task("memory store poisoned".to_string()))?;
        Ok(sorted_by_start(rows.clone()))
    }
}

fn sorted_by_start(mut rows: Vec<StoredEvent>) -> Vec<StoredEvent> {
    // sort_by_key is stable, so equal keys keep insertion order.
    rows.sort_by_key(|row| start_key(row.event.start_date));
    rows
}

fn start_key(start: Option<DateTime<Utc>>) -> (bool, Option<DateTime<Utc>>) {
    (start.is_none(), start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(url: &str, title: &str, day: Option<u32>) -> NormalizedEvent {
        let start = day.map(|d| Utc.with_ymd_and_hms(2025, 5, d, 0, 0, 0).unwrap());
        NormalizedEvent {
            title: title.to_string(),
            description: NormalizedEvent::describe(Source::Mlh, title),
            start_date: start,
            end_date: start,
            location: Location::Online,
            theme: vec!["AI".to_string()],
            url: url.to_string(),
            image_url: None,
            source: Source::Mlh,
        }
    }

    async fn exercise_upsert_by_url(store: &dyn EventStore) {
        store.upsert(&sample("https://a.test", "A", Some(3))).await.unwrap();
        store.upsert(&sample("https://b.test", "B", Some(1))).await.unwrap();
        store.upsert(&sample("https://a.test", "A renamed", Some(3))).await.unwrap();

        let rows = store.list_by_start().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event.url, "https://b.test");
        assert_eq!(rows[1].event.title, "A renamed");
    }

    async fn exercise_ordering(store: &dyn EventStore) {
        store.upsert(&sample("https://undated.test", "U", None)).await.unwrap();
        store.upsert(&sample("https://late.test", "L", Some(20))).await.unwrap();
        store.upsert(&sample("https://tie-1.test", "T1", Some(10))).await.unwrap();
        store.upsert(&sample("https://tie-2.test", "T2", Some(10))).await.unwrap();

        let urls: Vec<String> = store
            .list_by_start()
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.event.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://tie-1.test",
                "https://tie-2.test",
                "https://late.test",
                "https://undated.test"
            ]
        );
    }

    async fn exercise_idempotent_rerun(store: &dyn EventStore) {
        let event = sample("https://same.test", "Same", Some(7));
        store.upsert(&event).await.unwrap();
        let before = store.list_by_start().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert(&event).await.unwrap();
        let after = store.list_by_start().await.unwrap();

        assert_eq!(before, after);
    }

    async fn exercise_rejects_missing_url(store: &dyn EventStore) {
        let err = store.upsert(&sample("", "No link", Some(1))).await.expect_err("empty url");
        assert!(matches!(err, StoreError::MissingUrl { ref title } if title == "No link"));
        store.upsert(&sample("  ", "Blank", Some(2))).await.expect_err("blank url");
        assert!(store.list_by_start().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_upserts_by_url() {
        exercise_upsert_by_url(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_orders_by_start_date() {
        exercise_ordering(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_rerun_changes_nothing() {
        exercise_idempotent_rerun(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn memory_store_matches_sqlite_semantics() {
        exercise_upsert_by_url(&MemoryStore::new()).await;
        exercise_ordering(&MemoryStore::new()).await;
        exercise_idempotent_rerun(&MemoryStore::new()).await;
        exercise_rejects_missing_url(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_rejects_records_without_url() {
        exercise_rejects_missing_url(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_round_trips_every_field() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut event = sample("https://full.test", "Full", Some(2));
        event.location = Location::Hybrid;
        event.source = Source::Devpost;
        event.image_url = Some("https://img.test/x.png".into());
        event.theme = vec!["Web3".into(), "Fintech".into()];
        store.upsert(&event).await.unwrap();

        let rows = store.list_by_start().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, event);
        assert_eq!(rows[0].created_at, rows[0].last_updated);
    }

    #[tokio::test]
    async fn changed_fields_bump_last_updated_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&sample("https://c.test", "C", Some(4))).await.unwrap();
        let first = store.list_by_start().await.unwrap().remove(0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert(&sample("https://c.test", "C v2", Some(4))).await.unwrap();
        let second = store.list_by_start().await.unwrap().remove(0);

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_updated > first.last_updated);
        assert_eq!(second.event.title, "C v2");
    }

    #[tokio::test]
    async fn configured_store_prefers_supabase_and_needs_its_key() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database_path: Some(tmp.path().join("events.sqlite")),
            ..AppConfig::default()
        };
        let store = open_configured(&config).expect("sqlite store");
        assert!(store.list_by_start().await.unwrap().is_empty());
        assert!(tmp.path().join("events.sqlite").exists());

        let config = AppConfig {
            supabase_url: Some("https://proj.supabase.co".into()),
            ..config
        };
        let err = open_configured(&config).err().expect("missing key");
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[tokio::test]
    async fn on_disk_store_persists_between_opens() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/hackathons.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert(&sample("https://disk.test", "Disk", Some(9))).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.list_by_start().await.unwrap().len(), 1);
    }
}
