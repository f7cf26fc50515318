use crate::app::ports::Store;
use crate::domain::{normalize_text, Artist, ArtistCandidate, ArtistStatus};
use crate::error::Result;
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of adding suggested names to the artist roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrollReport {
    /// Distinct names after case-insensitive folding.
    pub unique: usize,
    pub already_known: usize,
    pub inserted: usize,
}

/// Adds artists found on pages to the roster as never-processed
/// `pending_review` entries. Known names, in any case, are left alone.
#[derive(Clone)]
pub struct ArtistRoster {
    store: Arc<dyn Store>,
}

impl ArtistRoster {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// One lookup for the known names, one bulk insert for the rest. The
    /// first spelling of a name wins.
    pub async fn enroll(&self, candidates: Vec<ArtistCandidate>) -> Result<EnrollReport> {
        let mut keys = HashSet::new();
        let unique: Vec<(String, Option<String>)> = candidates
            .into_iter()
            .filter_map(|c| {
                let name = c.name?.trim().to_string();
                let fresh_key = !name.is_empty() && keys.insert(normalize_text(&name));
                fresh_key.then_some((name, c.main_role))
            })
            .collect();

        let mut report = EnrollReport { unique: unique.len(), ..Default::default() };
        if unique.is_empty() {
            return Ok(report);
        }

        let names: Vec<String> = unique.iter().map(|(n, _)| n.clone()).collect();
        let known: HashSet<String> = self
            .store
            .artists_named(&names)
            .await?
            .iter()
            .map(Artist::name_key)
            .collect();

        let fresh: Vec<Artist> = unique
            .into_iter()
            .filter(|(name, _)| !known.contains(&normalize_text(name)))
            .map(|(name, main_role)| {
                let mut artist = Artist::new(name).with_status(ArtistStatus::PendingReview);
                artist.main_role = main_role;
                artist
            })
            .collect();
        report.already_known = report.unique - fresh.len();

        if !fresh.is_empty() {
            report.inserted = self.store.insert_artists(&fresh).await?;
            counter!("duende_artists_enrolled_total").increment(report.inserted as u64);
            info!("Added {} artists for review", report.inserted);
        }
        debug!("{} names already on the roster", report.already_known);
        Ok(report)
    }
}
