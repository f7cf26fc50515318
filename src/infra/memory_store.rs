use crate::app::ports::{BulkInsertReport, Store};
use crate::domain::{normalize_text, Artist, ArtistStatus, EventKey, PersistedEvent};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory store for development and tests. Artists keep insertion order.
pub struct InMemoryStore {
    artists: Mutex<Vec<Artist>>,
    events: Mutex<HashMap<EventKey, PersistedEvent>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| ScraperError::Store("in-memory store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            artists: Mutex::new(Vec::new()),
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn all_artists(&self) -> Result<Vec<Artist>> {
        Ok(lock(&self.artists)?.clone())
    }

    pub fn all_events(&self) -> Result<Vec<PersistedEvent>> {
        let mut events: Vec<PersistedEvent> = lock(&self.events)?.values().cloned().collect();
        events.sort_by(|a, b| a.event_key.cmp(&b.event_key));
        Ok(events)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn stale_artists(&self, limit: usize, status: Option<&ArtistStatus>) -> Result<Vec<Artist>> {
        let artists = lock(&self.artists)?;
        let mut eligible: Vec<&Artist> = artists
            .iter()
            .filter(|a| status.map_or(true, |s| a.status.as_ref() == Some(s)))
            .collect();
        // Stable sort keeps insertion order among equal stamps; None < Some.
        eligible.sort_by_key(|a| a.last_processed_at);
        Ok(eligible.into_iter().take(limit).cloned().collect())
    }

    async fn stamp_artists(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut artists = lock(&self.artists)?;
        let mut changed = 0;
        for artist in artists.iter_mut().filter(|a| wanted.contains(&a.id)) {
            if artist.last_processed_at.map_or(true, |prev| prev < at) {
                artist.last_processed_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn artists_named(&self, names: &[String]) -> Result<Vec<Artist>> {
        let wanted: HashSet<String> = names.iter().map(|n| normalize_text(n)).collect();
        let artists = lock(&self.artists)?;
        Ok(artists
            .iter()
            .filter(|a| wanted.contains(&a.name_key()))
            .cloned()
            .collect())
    }

    async fn insert_artists(&self, new_artists: &[Artist]) -> Result<usize> {
        let mut artists = lock(&self.artists)?;
        let mut taken: HashSet<String> = artists.iter().map(|a| a.name_key()).collect();
        let mut inserted = 0;
        for artist in new_artists {
            if taken.insert(artist.name_key()) {
                artists.push(artist.clone());
                inserted += 1;
            }
        }
        debug!("Inserted {} artists", inserted);
        Ok(inserted)
    }

    async fn existing_event_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>> {
        let events = lock(&self.events)?;
        Ok(keys.iter().filter(|k| events.contains_key(*k)).cloned().collect())
    }

    async fn insert_events(&self, new_events: &[PersistedEvent]) -> Result<BulkInsertReport> {
        let mut events = lock(&self.events)?;
        let mut report = BulkInsertReport::default();
        for event in new_events {
            if events.contains_key(&event.event_key) {
                report.conflicts += 1;
            } else {
                events.insert(event.event_key.clone(), event.clone());
                report.inserted += 1;
            }
        }
        debug!("Inserted {} events ({} conflicts)", report.inserted, report.conflicts);
        Ok(report)
    }
}
