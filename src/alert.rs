//! Human-readable alert built from a positive result.

use crate::models::{BookingRequest, Evidence, MatchResult};

/// What gets logged, and posted to Discord when a webhook is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub url: String,
    /// Name/value pairs for structured sinks such as embeds.
    pub fields: Vec<(String, String)>,
}

impl Alert {
    /// `None` for a negative result: there is nothing to announce.
    pub fn from_result(request: &BookingRequest, result: &MatchResult) -> Option<Self> {
        let evidence = result.evidence.as_ref()?;
        let prefs = &request.preferences;

        let mut fields = vec![
            ("Film".to_string(), prefs.product_title.clone()),
            ("Venue".to_string(), prefs.venue_name.clone()),
            ("Date".to_string(), prefs.date.format("%Y-%m-%d").to_string()),
            (
                "Time".to_string(),
                prefs
                    .time
                    .map_or_else(|| "any".to_string(), |t| t.format("%H:%M").to_string()),
            ),
        ];

        match evidence {
            Evidence::Listing(listing) => {
                fields.push((
                    "Listing".to_string(),
                    format!(
                        "{} at {}, {} {}",
                        listing.title, listing.venue, listing.date, listing.time
                    ),
                ));
                if let Some(price) = &listing.price {
                    fields.push(("Price".to_string(), price.clone()));
                }
            }
            Evidence::Schedule(schedule) => {
                let lines: Vec<String> = schedule
                    .iter()
                    .map(|day| format!("{}: {}", day.date, day.times.join(", ")))
                    .collect();
                fields.push(("Showtimes".to_string(), lines.join("\n")));
            }
        }

        let mut body: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        body.push(format!("Book: {}", result.url));

        Some(Self {
            title: format!("Tickets available: {}", prefs.product_title),
            body: body.join("\n"),
            url: result.url.clone(),
            fields,
        })
    }
}
