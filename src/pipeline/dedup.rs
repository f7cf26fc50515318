use crate::app::ports::Store;
use crate::domain::{province_for_city, EventCandidate, EventKey, PersistedEvent};
use crate::error::Result;
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Counts from one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
    pub invalid: usize,
    /// Later duplicates collapsed into a first-seen candidate.
    pub folded: usize,
    pub already_present: usize,
    pub inserted: usize,
}

/// A candidate that passed validation, with its derived key.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCandidate {
    pub key: EventKey,
    pub artist_name: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub venue: String,
    pub candidate: EventCandidate,
}

/// Check required fields and the date. Returns `None` for anything that
/// should be dropped; dropping is never an error.
pub fn validate(candidate: &EventCandidate, today: NaiveDate) -> Option<ValidCandidate> {
    let artist_name = candidate.artist_name.as_deref()?.trim();
    let name = candidate.name.as_deref()?.trim();
    let venue = candidate.venue.as_deref()?.trim();
    let raw_date = candidate.date.as_deref()?.trim();
    if artist_name.is_empty() || name.is_empty() || venue.is_empty() {
        return None;
    }
    if !ISO_DATE.is_match(raw_date) {
        return None;
    }
    let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").ok()?;
    if date < today {
        return None;
    }
    let time = candidate
        .time
        .as_deref()
        .and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").ok());

    Some(ValidCandidate {
        key: EventKey::derive(artist_name, date, venue),
        artist_name: artist_name.to_string(),
        name: name.to_string(),
        date,
        time,
        venue: venue.to_string(),
        candidate: candidate.clone(),
    })
}

/// Keep the first candidate per key, in input order.
pub fn fold_first_seen(candidates: Vec<ValidCandidate>) -> Vec<ValidCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.key.clone()))
        .collect()
}

impl ValidCandidate {
    pub fn into_persisted(self) -> PersistedEvent {
        let now = Utc::now();
        let c = self.candidate;
        PersistedEvent {
            id: self.key.document_id(),
            event_key: self.key,
            artist_name: self.artist_name,
            name: self.name,
            date: self.date,
            time: self.time,
            venue: self.venue,
            province: c
                .province
                .or_else(|| c.city.as_deref().and_then(province_for_city).map(str::to_string)),
            city: c.city,
            country: c.country,
            description: c.description,
            source_url: c.source_url,
            image_url: c.image_url,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Turns raw candidates into the minimal set of new events: validate, fold,
/// one existence query, one bulk insert. Existing events are never touched.
pub struct EventDeduplicator {
    store: Arc<dyn Store>,
}

impl EventDeduplicator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Ingest with "today" taken from the local calendar.
    pub async fn ingest(&self, candidates: &[EventCandidate]) -> Result<IngestReport> {
        self.ingest_as_of(candidates, Local::now().date_naive()).await
    }

    #[instrument(skip(self, candidates), fields(received = candidates.len(), today = %today))]
    pub async fn ingest_as_of(&self, candidates: &[EventCandidate], today: NaiveDate) -> Result<IngestReport> {
        let mut report = IngestReport { received: candidates.len(), ..Default::default() };

        let valid: Vec<ValidCandidate> = candidates.iter().filter_map(|c| validate(c, today)).collect();
        report.invalid = candidates.len() - valid.len();

        let unique = fold_first_seen(valid);
        report.folded = candidates.len() - report.invalid - unique.len();
        if unique.is_empty() {
            debug!("Nothing to ingest after validation");
            return Ok(report);
        }

        let keys: Vec<EventKey> = unique.iter().map(|c| c.key.clone()).collect();
        let existing = self.store.existing_event_keys(&keys).await?;

        let fresh: Vec<PersistedEvent> = unique
            .into_iter()
            .filter(|c| !existing.contains(&c.key))
            .map(ValidCandidate::into_persisted)
            .collect();
        report.already_present = keys.len() - fresh.len();

        if !fresh.is_empty() {
            let written = self.store.insert_events(&fresh).await?;
            report.inserted = written.inserted;
            // Lost a race with a concurrent run; the other run's row stands.
            report.already_present += written.conflicts;
        }

        counter!("duende_events_inserted_total").increment(report.inserted as u64);
        counter!("duende_candidates_dropped_total").increment(report.invalid as u64);
        info!(
            "Ingested {} new events ({} invalid, {} folded, {} already present)",
            report.inserted, report.invalid, report.folded, report.already_present
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn candidate(artist: &str, date: &str, venue: &str) -> EventCandidate {
        EventCandidate {
            artist_name: Some(artist.to_string()),
            name: Some(format!("{artist} en concierto")),
            date: Some(date.to_string()),
            venue: Some(venue.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn past_dates_are_dropped() {
        assert!(validate(&candidate("X", "2020-01-01", "V"), today()).is_none());
        assert!(validate(&candidate("X", "2026-10-18", "V"), today()).is_none());
    }

    #[test]
    fn today_counts_as_upcoming() {
        assert!(validate(&candidate("X", "2026-10-19", "V"), today()).is_some());
    }

    #[test]
    fn malformed_dates_are_dropped() {
        for bad in ["2099-13-01", "2099-02-30", "01/02/2099", "2099-1-1", "mañana"] {
            assert!(validate(&candidate("X", bad, "V"), today()).is_none(), "{bad}");
        }
    }

    #[test]
    fn missing_required_fields_are_dropped() {
        let mut c = candidate("X", "2099-01-01", "V");
        c.name = None;
        assert!(validate(&c, today()).is_none());

        let mut c = candidate("X", "2099-01-01", "V");
        c.venue = Some("   ".to_string());
        assert!(validate(&c, today()).is_none());

        let mut c = candidate("X", "2099-01-01", "V");
        c.artist_name = None;
        assert!(validate(&c, today()).is_none());
    }

    #[test]
    fn time_is_optional_and_lenient() {
        let mut c = candidate("X", "2099-01-01", "V");
        c.time = Some("21:30".to_string());
        let v = validate(&c, today()).unwrap();
        assert_eq!(v.time, NaiveTime::from_hms_opt(21, 30, 0));

        c.time = Some("por la noche".to_string());
        assert_eq!(validate(&c, today()).unwrap().time, None);
    }

    #[test]
    fn fold_keeps_first_seen_across_case() {
        let first = validate(&candidate("Antonio Reyes", "2099-01-01", "Sala"), today()).unwrap();
        let mut second_raw = candidate("antonio reyes", "2099-01-01", "SALA");
        second_raw.name = Some("later duplicate".to_string());
        let second = validate(&second_raw, today()).unwrap();
        let other = validate(&candidate("Antonio Reyes", "2099-01-02", "Sala"), today()).unwrap();

        let folded = fold_first_seen(vec![first.clone(), second, other.clone()]);
        assert_eq!(folded, vec![first, other]);
    }

    #[test]
    fn province_is_filled_from_known_cities() {
        let mut c = candidate("X", "2099-01-01", "Tabanco El Pasaje");
        c.city = Some("Jerez de la Frontera".to_string());
        let event = validate(&c, today()).unwrap().into_persisted();
        assert_eq!(event.province.as_deref(), Some("Cádiz"));

        c.province = Some("Provincia de Cádiz".to_string());
        let event = validate(&c, today()).unwrap().into_persisted();
        assert_eq!(event.province.as_deref(), Some("Provincia de Cádiz"));

        c.province = None;
        c.city = Some("Nîmes".to_string());
        assert_eq!(validate(&c, today()).unwrap().into_persisted().province, None);
    }
}
