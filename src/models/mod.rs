//! Booking requests, match results, and Discord webhook payloads

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Kinds of product a booking request can watch for. Only movies are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingKind {
    Movie,
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => f.write_str("movie"),
        }
    }
}

/// What the user wants to see, as free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub product_title: String,
    pub venue_name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

/// A validated request, read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    pub kind: BookingKind,
    pub target_url: String,
    pub preferences: Preferences,
}

/// Fields read from the matched listing element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub title: String,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub price: Option<String>,
}

/// Times discovered for one date while sweeping a date picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateShowtimes {
    pub date: String,
    pub times: Vec<String>,
}

/// Why a result is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Evidence {
    /// A listing matched every preference and offered a book affordance.
    Listing(ListingSnapshot),
    /// The date sweep found at least one date with listed times.
    Schedule(Vec<DateShowtimes>),
}

/// Output of one scan. `evidence` is `None` for a negative result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub url: String,
    pub evidence: Option<Evidence>,
    pub checked_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn not_found(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            evidence: None,
            checked_at: Utc::now(),
        }
    }

    pub fn found_listing(url: impl Into<String>, listing: ListingSnapshot) -> Self {
        Self {
            url: url.into(),
            evidence: Some(Evidence::Listing(listing)),
            checked_at: Utc::now(),
        }
    }

    /// Positive only if at least one date produced times.
    pub fn from_schedule(url: impl Into<String>, schedule: Vec<DateShowtimes>) -> Self {
        let schedule: Vec<DateShowtimes> = schedule
            .into_iter()
            .filter(|entry| !entry.times.is_empty())
            .collect();
        Self {
            url: url.into(),
            evidence: (!schedule.is_empty()).then_some(Evidence::Schedule(schedule)),
            checked_at: Utc::now(),
        }
    }

    pub fn found(&self) -> bool {
        self.evidence.is_some()
    }
}

/// What one engine run reports to the scheduler.
#[derive(Debug)]
pub enum Outcome {
    /// Stop scheduling this request.
    Found(MatchResult),
    /// Try again next tick.
    NotFound(MatchResult),
    /// Try again next tick, but surface the failure.
    Error(EngineError),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound(_) => "not found",
            Self::Error(_) => "error",
        }
    }
}

impl From<MatchResult> for Outcome {
    fn from(result: MatchResult) -> Self {
        if result.found() {
            Self::Found(result)
        } else {
            Self::NotFound(result)
        }
    }
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}
