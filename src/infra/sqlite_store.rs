use crate::app::ports::{BulkInsertReport, Store};
use crate::domain::{normalize_text, Artist, ArtistStatus, EventKey, PersistedEvent};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS artists (
        seq               INTEGER PRIMARY KEY AUTOINCREMENT,
        id                TEXT NOT NULL UNIQUE,
        name              TEXT NOT NULL,
        name_key          TEXT NOT NULL UNIQUE,
        status            TEXT,
        main_role         TEXT,
        last_processed_at INTEGER,
        created_at        INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS artists_rotation ON artists (last_processed_at, seq);
    CREATE TABLE IF NOT EXISTS events (
        id          TEXT PRIMARY KEY,
        event_key   TEXT NOT NULL UNIQUE,
        artist_name TEXT NOT NULL,
        name        TEXT NOT NULL,
        date        TEXT NOT NULL,
        time        TEXT,
        venue       TEXT NOT NULL,
        city        TEXT,
        province    TEXT,
        country     TEXT,
        description TEXT,
        source_url  TEXT,
        image_url   TEXT,
        verified    INTEGER NOT NULL DEFAULT 0,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    );
"#;

const ARTIST_COLUMNS: &str = "id, name, status, main_role, last_processed_at, created_at";

/// Artists and events in one SQLite file. `events.event_key` is unique, so a
/// concurrent run that passed the same existence check inserts nothing.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

struct ArtistRow {
    id: String,
    name: String,
    status: Option<String>,
    main_role: Option<String>,
    last_processed_at: Option<i64>,
    created_at: i64,
}

impl ArtistRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            main_role: row.get(3)?,
            last_processed_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_artist(self) -> Result<Artist> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| ScraperError::Store(format!("bad artist id '{}': {}", self.id, e)))?;
        Ok(Artist {
            id,
            name: self.name,
            status: self.status.map(ArtistStatus::from),
            main_role: self.main_role,
            last_processed_at: self.last_processed_at.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| ScraperError::Store(format!("timestamp out of range: {ms}")))
}

/// Bind a list as one JSON text parameter, unpacked with `json_each`.
fn json_list<I, S>(items: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: serde::Serialize,
{
    Ok(serde_json::to_string(&items.into_iter().collect::<Vec<S>>())?)
}

impl SqliteStore {
    /// Open `<dir>/<db_name>.sqlite3`, creating the directory and schema.
    pub fn open_in_dir<P: AsRef<Path>>(dir: P, db_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(format!("{db_name}.sqlite3"));
        info!("Opening sqlite store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ScraperError::Store("sqlite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ScraperError::Store(format!("sqlite task failed: {e}")))?
    }

    pub async fn count_events(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    pub async fn events_for_artist(&self, artist_name: &str) -> Result<Vec<PersistedEvent>> {
        let key_prefix = format!("{}|", normalize_text(artist_name));
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_key, artist_name, name, date, time, venue, city, province, country,
                        description, source_url, image_url, verified, created_at, updated_at
                 FROM events WHERE substr(event_key, 1, length(?1)) = ?1 ORDER BY date, event_key",
            )?;
            let rows = stmt.query_map(params![key_prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    (
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                        row.get::<_, Option<String>>(12)?,
                    ),
                    row.get::<_, bool>(13)?,
                    row.get::<_, i64>(14)?,
                    row.get::<_, i64>(15)?,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, key, artist_name, name, date, time, venue, extra, verified, created, updated) = row?;
                let (city, province, country, description, source_url, image_url) = extra;
                out.push(PersistedEvent {
                    id,
                    event_key: EventKey::from(key),
                    artist_name,
                    name,
                    date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                        .map_err(|e| ScraperError::Store(format!("bad event date '{date}': {e}")))?,
                    time: time.and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S").ok()),
                    venue,
                    city,
                    province,
                    country,
                    description,
                    source_url,
                    image_url,
                    verified,
                    created_at: from_millis(created)?,
                    updated_at: from_millis(updated)?,
                });
            }
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn stale_artists(&self, limit: usize, status: Option<&ArtistStatus>) -> Result<Vec<Artist>> {
        let status = status.map(|s| s.as_str().to_string());
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ARTIST_COLUMNS} FROM artists
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY last_processed_at IS NOT NULL, last_processed_at, seq
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status, limit as i64], ArtistRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ArtistRow::into_artist).collect()
        })
        .await
    }

    async fn stamp_artists(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        let ids = json_list(ids.iter().map(|id| id.to_string()))?;
        let at = at.timestamp_millis();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE artists SET last_processed_at = ?1
                 WHERE id IN (SELECT value FROM json_each(?2))
                   AND (last_processed_at IS NULL OR last_processed_at < ?1)",
                params![at, ids],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn artists_named(&self, names: &[String]) -> Result<Vec<Artist>> {
        let keys = json_list(names.iter().map(|n| normalize_text(n)))?;
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ARTIST_COLUMNS} FROM artists
                 WHERE name_key IN (SELECT value FROM json_each(?1)) ORDER BY seq"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![keys], ArtistRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ArtistRow::into_artist).collect()
        })
        .await
    }

    async fn insert_artists(&self, artists: &[Artist]) -> Result<usize> {
        let artists = artists.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            for a in &artists {
                inserted += tx.execute(
                    "INSERT OR IGNORE INTO artists
                        (id, name, name_key, status, main_role, last_processed_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        a.id.to_string(),
                        a.name,
                        a.name_key(),
                        a.status.as_ref().map(|s| s.as_str().to_string()),
                        a.main_role,
                        a.last_processed_at.map(|t| t.timestamp_millis()),
                        a.created_at.timestamp_millis(),
                    ],
                )?;
            }
            tx.commit()?;
            debug!("Inserted {} of {} artists", inserted, artists.len());
            Ok(inserted)
        })
        .await
    }

    async fn existing_event_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>> {
        let keys = json_list(keys.iter().map(|k| k.as_str()))?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_key FROM events WHERE event_key IN (SELECT value FROM json_each(?1))",
            )?;
            let found = stmt
                .query_map(params![keys], |row| row.get::<_, String>(0))?
                .map(|r| r.map(EventKey::from))
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(found)
        })
        .await
    }

    async fn insert_events(&self, events: &[PersistedEvent]) -> Result<BulkInsertReport> {
        let events = events.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            for e in &events {
                inserted += tx.execute(
                    "INSERT OR IGNORE INTO events
                        (id, event_key, artist_name, name, date, time, venue, city, province, country,
                         description, source_url, image_url, verified, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        e.id,
                        e.event_key.as_str(),
                        e.artist_name,
                        e.name,
                        e.date.format("%Y-%m-%d").to_string(),
                        e.time.map(|t| t.format("%H:%M:%S").to_string()),
                        e.venue,
                        e.city,
                        e.province,
                        e.country,
                        e.description,
                        e.source_url,
                        e.image_url,
                        e.verified,
                        e.created_at.timestamp_millis(),
                        e.updated_at.timestamp_millis(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(BulkInsertReport { inserted, conflicts: events.len() - inserted })
        })
        .await
    }
}
