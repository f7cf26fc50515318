use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Lifecycle tag on an artist record. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArtistStatus {
    PendingReview,
    Approved,
    Other(String),
}

impl ArtistStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ArtistStatus::PendingReview => "pending_review",
            ArtistStatus::Approved => "approved",
            ArtistStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for ArtistStatus {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pending_review" | "pending" => ArtistStatus::PendingReview,
            "approved" => ArtistStatus::Approved,
            _ => ArtistStatus::Other(s),
        }
    }
}

impl From<&str> for ArtistStatus {
    fn from(s: &str) -> Self {
        ArtistStatus::from(s.to_string())
    }
}

impl From<ArtistStatus> for String {
    fn from(s: ArtistStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for ArtistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub status: Option<ArtistStatus>,
    pub main_role: Option<String>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Artist {
    /// A never-processed artist, as created by discovery or seeding.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into().trim().to_string(),
            status: None,
            main_role: None,
            last_processed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ArtistStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Case-insensitive identity used for uniqueness checks.
    pub fn name_key(&self) -> String {
        normalize_text(&self.name)
    }
}

/// Event as returned by the extraction provider. Nothing here is trusted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCandidate {
    #[serde(default, alias = "artist", deserialize_with = "lenient_string")]
    pub artist_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, alias = "provincia", deserialize_with = "lenient_string")]
    pub province: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_url: Option<String>,
}

/// Accept strings and numbers, turn blanks and anything else into `None`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Derived identity of an event: normalized artist, ISO date, normalized venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    pub fn derive(artist_name: &str, date: NaiveDate, venue: &str) -> Self {
        EventKey(format!(
            "{}|{}|{}",
            normalize_text(artist_name),
            date.format("%Y-%m-%d"),
            normalize_text(venue)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable document id for the key.
    pub fn document_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl From<String> for EventKey {
    fn from(s: String) -> Self {
        EventKey(s)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEvent {
    pub id: String,
    pub event_key: EventKey,
    pub artist_name: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub venue: String,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ranked hit from the search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub image_url: Option<String>,
}

/// Artist name suggested by the extraction provider during discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub main_role: Option<String>,
}

/// Province of a well-known flamenco city, matched case-insensitively.
pub fn province_for_city(city: &str) -> Option<&'static str> {
    let province = match normalize_text(city).as_str() {
        "málaga" | "malaga" => "Málaga",
        "madrid" => "Madrid",
        "barcelona" => "Barcelona",
        "sevilla" | "seville" => "Sevilla",
        "córdoba" | "cordoba" => "Córdoba",
        "granada" => "Granada",
        "cádiz" | "cadiz" | "jerez de la frontera" | "jerez" | "sotogrande" => "Cádiz",
        "valencia" => "Valencia",
        _ => return None,
    };
    Some(province)
}

/// Trim, collapse inner whitespace, lower-case.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
