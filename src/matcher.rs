//! Availability matching over the results view.
//!
//! A listing is a hit only when its title, time and venue all match the
//! request and it offers something to book with. The scan is read-only:
//! running it twice over the same page gives the same answer.

use tracing::{debug, info};

use crate::dates::{DateFormatCandidates, TimeFormatCandidates};
use crate::error::EngineResult;
use crate::models::{ListingSnapshot, MatchResult, Preferences};
use crate::page::{Page, is_disabled, normalize_text};
use crate::profile::{ListingProfile, Patterns, candidates};
use crate::retry::RetryPolicy;
use crate::selector::{Resolver, Role};

/// Case-insensitive containment.
pub fn venue_matches(text: &str, venue: &str) -> bool {
    let venue = normalize_text(venue).to_lowercase();
    !venue.is_empty() && normalize_text(text).to_lowercase().contains(&venue)
}

/// Case-insensitive containment, treating a known language tag on either side
/// as part of the same title: "Dune (Hindi)" matches a request for "Dune" and
/// "Dune - Hindi" matches a request for "Dune (Hindi)".
pub fn title_matches(text: &str, title: &str, suffixes: &[String]) -> bool {
    let text = normalize_text(text).to_lowercase();
    let title = normalize_text(title).to_lowercase();
    if title.is_empty() {
        return false;
    }
    if text.contains(&title) {
        return true;
    }
    let base = strip_language(&title, suffixes);
    base != title && !base.is_empty() && strip_language(&text, suffixes).contains(&base)
}

fn strip_language(title: &str, suffixes: &[String]) -> String {
    let mut out = title.to_string();
    for suffix in suffixes {
        let suffix = suffix.to_lowercase();
        for form in [
            format!("({suffix})"),
            format!("[{suffix}]"),
            format!("- {suffix}"),
        ] {
            out = out.replace(&form, "");
        }
    }
    normalize_text(&out)
}

/// Labels an affordance carries when the listing cannot actually be booked.
const UNAVAILABLE: &[&str] = &[
    "sold out",
    "booked",
    "unavailable",
    "not available",
    "no tickets",
    "closed",
];

/// Whole-word check, so "Fully booked" is unavailable but "Book now" is not.
fn announces_unavailable(label: &str) -> bool {
    let words: Vec<&str> = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let padded = format!(" {} ", words.join(" ").to_lowercase());
    UNAVAILABLE
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
}

pub struct Matcher<'p, P: Page> {
    resolver: Resolver<'p, P>,
    listings: &'p ListingProfile,
    title_suffixes: &'p [String],
}

/// Text read from one listing element.
struct ListingFields {
    title: String,
    /// `None` when the listing has no separate time element.
    time: Option<String>,
    /// The listing's whole text, where fields without an element are looked up.
    text: String,
    venue: String,
    date: Option<String>,
    price: Option<String>,
}

impl<'p, P: Page> Matcher<'p, P> {
    pub fn new(
        resolver: &Resolver<'p, P>,
        listings: &'p ListingProfile,
        title_suffixes: &'p [String],
    ) -> Self {
        Self {
            // A results view without listings is the normal negative case, not worth a retry.
            resolver: resolver.with_policy(RetryPolicy::new(1, resolver.policy().delay)),
            listings,
            title_suffixes,
        }
    }

    pub async fn scan(&self, prefs: &Preferences, url: &str) -> EngineResult<MatchResult> {
        let containers = candidates(Role::Listing, &self.listings.container);
        let listings = self.resolver.items_or_empty(&containers).await?;
        debug!("Scanning {} listing(s)", listings.len());

        let time = prefs.time.map(TimeFormatCandidates::new);
        for listing in &listings {
            let fields = self.read(&listing.element, &listing.label).await?;

            let title_ok = title_matches(&fields.title, &prefs.product_title, self.title_suffixes);
            let time_ok = time.as_ref().is_none_or(|t| match &fields.time {
                Some(shown) => t.matches(shown),
                None => t.matches_in_prose(&fields.text),
            });
            let venue_ok = venue_matches(&fields.venue, &prefs.venue_name);
            if !(title_ok && time_ok && venue_ok) {
                continue;
            }
            if !self.bookable(&listing.element).await? {
                debug!("'{}' matches but offers nothing to book", fields.title);
                continue;
            }

            let shown_time = fields.time.unwrap_or(fields.text);
            info!("Matched listing '{}' at {} {}", fields.title, fields.venue, shown_time);
            let date = match fields.date {
                Some(label) => DateFormatCandidates::new(prefs.date)
                    .parse_rendering(&label)
                    .map_or(label, |d| d.format("%Y-%m-%d").to_string()),
                None => prefs.date.format("%Y-%m-%d").to_string(),
            };
            return Ok(MatchResult::found_listing(
                url,
                ListingSnapshot {
                    title: fields.title,
                    date,
                    time: shown_time,
                    venue: fields.venue,
                    price: fields.price,
                },
            ));
        }
        Ok(MatchResult::not_found(url))
    }

    async fn read(&self, listing: &P::Element, full_text: &str) -> EngineResult<ListingFields> {
        Ok(ListingFields {
            title: self
                .field(listing, Role::ListingTitle, &self.listings.title)
                .await?
                .unwrap_or_else(|| full_text.to_string()),
            time: self.field(listing, Role::ListingTime, &self.listings.time).await?,
            text: full_text.to_string(),
            venue: self
                .field(listing, Role::ListingVenue, &self.listings.venue)
                .await?
                .unwrap_or_else(|| full_text.to_string()),
            date: self.field(listing, Role::ListingDate, &self.listings.date).await?,
            price: self.field(listing, Role::ListingPrice, &self.listings.price).await?,
        })
    }

    async fn field(&self, listing: &P::Element, role: Role, patterns: &Patterns) -> EngineResult<Option<String>> {
        let Some(element) = self.resolver.first_within(listing, &candidates(role, patterns)).await? else {
            return Ok(None);
        };
        let text = self.resolver.page().inner_text(&element).await?;
        Ok((!text.is_empty()).then_some(text))
    }

    /// Some enabled affordance inside the listing that does not say it is sold out.
    async fn bookable(&self, listing: &P::Element) -> EngineResult<bool> {
        let page = self.resolver.page();
        let affordance = candidates(Role::BookAffordance, &self.listings.affordance);
        for pattern in affordance.patterns() {
            for element in self.resolver.visible_within(listing, pattern).await? {
                if is_disabled(page, &element).await? {
                    continue;
                }
                let label = page.inner_text(&element).await?;
                if announces_unavailable(&label) {
                    debug!("Ignoring '{}' affordance", label);
                    continue;
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}
