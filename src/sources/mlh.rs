use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base;
use super::Normalize;
use crate::models::{Location, NormalizedEvent, Source};
use crate::utils;

/// One entry of the MLH season listing. Keys are hyphenated upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlhEvent {
    #[serde(default, deserialize_with = "base::lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "base::lenient")]
    pub url: Option<String>,
    #[serde(rename = "event-start", default, deserialize_with = "base::lenient")]
    pub event_start: Option<String>,
    #[serde(rename = "event-end", default, deserialize_with = "base::lenient")]
    pub event_end: Option<String>,
    #[serde(rename = "register-by", default, deserialize_with = "base::lenient")]
    pub register_by: Option<String>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(rename = "banner-background", default, deserialize_with = "base::lenient")]
    pub banner_background: Option<String>,
    #[serde(default, deserialize_with = "base::lenient_vec")]
    pub themes: Option<Vec<String>>,
}

impl Normalize for MlhEvent {
    fn normalize(self) -> NormalizedEvent {
        let title = self.name.unwrap_or_default();
        let url = self.url.unwrap_or_default();

        let start = self.event_start.as_deref().and_then(base::parse_timestamp);
        let end = self.event_end.as_deref().and_then(base::parse_timestamp);
        if start.is_none() || end.is_none() {
            tracing::warn!(
                url = %url,
                event_start = ?self.event_start,
                event_end = ?self.event_end,
                "unparseable MLH date, using best effort"
            );
        }

        NormalizedEvent {
            description: NormalizedEvent::describe(Source::Mlh, &title),
            title,
            start_date: start.or(end),
            end_date: end.or(start),
            location: classify_location(self.location.as_ref()),
            theme: self.themes.unwrap_or_default(),
            url,
            image_url: utils::non_empty(self.banner_background),
            source: Source::Mlh,
        }
    }
}

/// Text mentioning "online" is `Online`; every other non-empty string is
/// `Offline`. `Hybrid` is only produced when the field is missing, empty or
/// not a string.
// TODO: classify text mentioning "hybrid" as Hybrid, mirroring the Devpost rules.
pub fn classify_location(location: Option<&Value>) -> Location {
    match location {
        Some(Value::String(text)) if !text.is_empty() => {
            if base::mentions(text, "online") {
                Location::Online
            } else {
                Location::Offline
            }
        }
        _ => Location::Hybrid,
    }
}
