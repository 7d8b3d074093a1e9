//! Per-site selector tables.
//!
//! One engine drives every booking site; what differs between sites is only
//! which selectors locate each funnel control. A [`SiteProfile`] holds those
//! candidate lists. New sites are onboarded by adding a profile (in code under
//! `sites/`, or in the `profiles` block of the config file).

use serde::Deserialize;
use tracing::debug;

use crate::request::host_of;
use crate::selector::{CandidateSet, Role, SelectorPattern};
use crate::sites;

pub type Patterns = Vec<SelectorPattern>;

/// Build patterns from `css` / `css:has-text('..')` strings.
pub fn patterns(raw: &[&str]) -> Patterns {
    raw.iter().copied().map(SelectorPattern::parse).collect()
}

/// Selector tables for one booking site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    /// Display name used in logs
    pub name: String,
    /// Host suffixes this profile applies to. Empty means any host.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Site-specific consent buttons, tried before the generic ones
    #[serde(default)]
    pub consent: Patterns,
    pub venue: Option<DropdownStage>,
    pub product: Option<ProductStage>,
    pub date: Option<DateStage>,
    pub time: Option<DropdownStage>,
    /// Submit/search control. Empty when the funnel has no explicit submit.
    #[serde(default)]
    pub submit: Patterns,
    pub listings: ListingProfile,
    /// Localized-language tags a listed title may carry, e.g. `Hindi` for "Dune (Hindi)"
    #[serde(default)]
    pub title_suffixes: Vec<String>,
}

/// A selector that opens a list of items.
#[derive(Debug, Clone, Deserialize)]
pub struct DropdownStage {
    pub opener: Patterns,
    pub items: Patterns,
    /// Skip the stage instead of failing when the opener is absent.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductStage {
    pub opener: Patterns,
    /// Text filter inside the opened selector
    #[serde(default)]
    pub search_input: Patterns,
    pub items: Patterns,
    /// Page-wide search box, first fallback
    #[serde(default)]
    pub page_search: Patterns,
    /// Slide-in search panel, second fallback
    pub sidebar: Option<SidebarSearch>,
    /// Any list of titles on the page, last fallback
    #[serde(default)]
    pub generic_items: Patterns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidebarSearch {
    pub opener: Patterns,
    pub input: Patterns,
    pub items: Patterns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateStage {
    pub opener: Patterns,
    pub items: Patterns,
    /// Set when dates must each be selected to reveal their showtimes.
    pub sweep: Option<SweepProfile>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepProfile {
    /// Control that reveals the time list, when it is collapsed
    #[serde(default)]
    pub time_opener: Patterns,
    /// Times listed once a date is selected
    pub time_items: Patterns,
    /// Spinners that must detach before the times are read
    #[serde(default)]
    pub loading: Patterns,
    /// URL fragment of the XHR that carries showtime data, if the site exposes one
    pub showtime_response: Option<String>,
}

/// Where listings live on the results view and what a listing contains.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingProfile {
    pub container: Patterns,
    pub title: Patterns,
    pub time: Patterns,
    pub venue: Patterns,
    #[serde(default)]
    pub date: Patterns,
    #[serde(default)]
    pub price: Patterns,
    /// "Book" / "available" controls that make a listing actionable
    pub affordance: Patterns,
}

impl SiteProfile {
    pub fn applies_to(&self, host: &str) -> bool {
        self.hosts.is_empty()
            || self
                .hosts
                .iter()
                .any(|h| host == h || host.ends_with(&format!(".{h}")))
    }
}

/// Candidate set for `role` from a profile pattern list.
pub fn candidates(role: Role, patterns: &Patterns) -> CandidateSet {
    CandidateSet::new(role, patterns.iter().cloned())
}

/// Profiles in lookup order: configured ones, then built-ins, with the
/// catch-all generic profile last.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<SiteProfile>,
    fallback: SiteProfile,
}

impl ProfileRegistry {
    pub fn with_builtins(extra: Vec<SiteProfile>) -> Self {
        let mut profiles = extra;
        profiles.push(sites::vue::profile());
        Self {
            profiles,
            fallback: sites::generic::profile(),
        }
    }

    pub fn for_url(&self, url: &str) -> &SiteProfile {
        let host = host_of(url).unwrap_or_default();
        let profile = self
            .profiles
            .iter()
            .find(|p| p.applies_to(&host))
            .unwrap_or(&self.fallback);
        debug!("Using site profile '{}' for {}", profile.name, host);
        profile
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteProfile> {
        self.profiles.iter().chain(std::iter::once(&self.fallback))
    }
}
