use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    #[serde(rename = "MLH")]
    Mlh,
    Devpost,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Mlh, Source::Devpost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mlh => "MLH",
            Source::Devpost => "Devpost",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.as_str() == tag)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Online,
    Offline,
    Hybrid,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Online => "Online",
            Location::Offline => "Offline",
            Location::Hybrid => "Hybrid",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Online" => Some(Location::Online),
            "Offline" => Some(Location::Offline),
            "Hybrid" => Some(Location::Hybrid),
            _ => None,
        }
    }
}

/// Canonical hackathon record shared by every provider. `url` is the identity
/// key used for upserts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
    pub title: String,
    pub description: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Location,
    pub theme: Vec<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source: Source,
}

impl NormalizedEvent {
    pub fn describe(source: Source, title: &str) -> String {
        format!("{source} hackathon: {title}")
    }
}

/// A persisted row as returned by the read path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredEvent {
    #[serde(deserialize_with = "id_from_text_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub event: NormalizedEvent,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Row ids are integers in SQLite and UUID strings in Supabase.
fn id_from_text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
