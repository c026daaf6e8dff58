use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::base;
use super::Normalize;
use crate::models::{Location, NormalizedEvent, Source};
use crate::utils;

const PERIOD_SEPARATOR: &str = " - ";

static BARE_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2},\s*\d{4}$").expect("valid bare day regex"));
static LEADING_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)\b").expect("valid month regex"));

/// Top-level Devpost search response. A missing `hackathons` key means no
/// results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevpostListing {
    #[serde(default)]
    pub hackathons: Option<Vec<DevpostHackathon>>,
}

impl DevpostListing {
    pub fn into_hackathons(self) -> Vec<DevpostHackathon> {
        self.hackathons.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevpostHackathon {
    #[serde(default, deserialize_with = "base::lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "base::lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "base::lenient")]
    pub submission_period_dates: Option<String>,
    #[serde(default, deserialize_with = "base::lenient")]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "base::lenient")]
    pub displayed_location: Option<DisplayedLocation>,
    #[serde(default, deserialize_with = "base::lenient_vec")]
    pub themes: Option<Vec<DevpostTheme>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayedLocation {
    #[serde(default, deserialize_with = "base::lenient")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevpostTheme {
    #[serde(default, deserialize_with = "base::lenient")]
    pub name: Option<String>,
}

impl Normalize for DevpostHackathon {
    fn normalize(self) -> NormalizedEvent {
        let title = self.title.unwrap_or_default();
        let url = self.url.unwrap_or_default();

        let (start_date, end_date) = match self.submission_period_dates.as_deref() {
            Some(period) => parse_period(period),
            None => (None, None),
        };
        if start_date.is_none() {
            tracing::warn!(
                url = %url,
                period = ?self.submission_period_dates,
                "unparseable Devpost submission period"
            );
        }

        let location_text = self
            .displayed_location
            .and_then(|displayed| displayed.location);

        NormalizedEvent {
            description: NormalizedEvent::describe(Source::Devpost, &title),
            title,
            start_date,
            end_date,
            location: classify_location(location_text.as_deref()),
            theme: self
                .themes
                .unwrap_or_default()
                .into_iter()
                .filter_map(|theme| theme.name)
                .collect(),
            url,
            image_url: utils::non_empty(self.thumbnail_url).map(absolute_thumbnail),
            source: Source::Devpost,
        }
    }
}

pub fn classify_location(location: Option<&str>) -> Location {
    match location {
        Some(text) if !text.is_empty() => {
            if base::mentions(text, "hybrid") {
                Location::Hybrid
            } else if !base::mentions(text, "online") && !base::mentions(text, "remote") {
                Location::Offline
            } else {
                Location::Online
            }
        }
        _ => Location::Online,
    }
}

/// Splits `"<start> - <end>"`. A single date yields `start == end`.
///
/// Devpost shortens ranges inside one year (`"Sep 16 - Nov 04, 2025"`) or one
/// month (`"Oct 01 - 15, 2025"`), so the missing pieces are borrowed from the
/// other half.
pub fn parse_period(text: &str) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut parts = text.split(PERIOD_SEPARATOR);
    let first = parts.next().unwrap_or_default().trim();

    let end_text = match parts.next().map(str::trim) {
        Some(second) if BARE_DAY_RE.is_match(second) => match LEADING_MONTH_RE.captures(first) {
            Some(caps) => format!("{} {}", &caps[1], second),
            None => second.to_string(),
        },
        Some(second) => second.to_string(),
        None => first.to_string(),
    };

    let end = base::parse_timestamp(&end_text);
    let start = base::parse_timestamp(first).or_else(|| borrow_year(first, end));

    (start.or(end), end.or(start))
}

fn borrow_year(first: &str, end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    if base::has_year(first) {
        return None;
    }
    let end = end?;
    let start = base::parse_timestamp(&format!("{first}, {}", end.year()))?;
    if start > end {
        start.with_year(end.year() - 1)
    } else {
        Some(start)
    }
}

fn absolute_thumbnail(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    }
}
