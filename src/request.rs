//! Raw booking records from config or the prompt, and their validation.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::dates::{parse_date, parse_time};
use crate::error::{EngineError, EngineResult};
use crate::models::{BookingKind, BookingRequest, Preferences};

/// A booking as written in `config.json`. Accepts the legacy
/// `movie_title` / `theater` keys alongside `title` / `venue`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BookingRecord {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(alias = "target_url")]
    pub url: String,
    #[serde(default)]
    pub preferences: PreferencesRecord,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreferencesRecord {
    #[serde(default, alias = "movie_title", alias = "product_title")]
    pub title: Option<String>,
    #[serde(default, alias = "theater", alias = "venue_name")]
    pub venue: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

fn required(field: &str, value: Option<&String>) -> EngineResult<String> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EngineError::InvalidRequest(format!("missing {field}"))),
    }
}

impl BookingRecord {
    /// Check every field and build the immutable request. Runs before any navigation.
    pub fn validate(&self) -> EngineResult<BookingRequest> {
        let kind = match self.kind.trim().to_lowercase().as_str() {
            "movie" => BookingKind::Movie,
            "" => return Err(EngineError::InvalidRequest("missing booking type".to_string())),
            other => {
                return Err(EngineError::InvalidRequest(format!(
                    "unsupported booking type '{other}'"
                )));
            }
        };

        let url = Url::parse(self.url.trim())
            .map_err(|e| EngineError::InvalidRequest(format!("invalid url '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::InvalidRequest(format!(
                "url '{}' is not http(s)",
                self.url
            )));
        }

        let prefs = &self.preferences;
        let product_title = required("title", prefs.title.as_ref())?;
        let venue_name = required("venue", prefs.venue.as_ref())?;
        let raw_date = required("date", prefs.date.as_ref())?;
        let date = parse_date(&raw_date)
            .ok_or_else(|| EngineError::InvalidRequest(format!("unrecognised date '{raw_date}'")))?;
        let time = match prefs.time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                parse_time(raw)
                    .ok_or_else(|| EngineError::InvalidRequest(format!("unrecognised time '{raw}'")))?,
            ),
        };

        Ok(BookingRequest {
            kind,
            target_url: url.to_string(),
            preferences: Preferences {
                product_title,
                venue_name,
                date,
                time,
            },
        })
    }
}

/// Host of a request URL, lowercased. Used to pick a site profile.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}
