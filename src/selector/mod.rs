//! Ranked selector fallback.
//!
//! Site markup is unknown and drifts, so every element the engine needs is
//! described by a [`CandidateSet`]: alternative patterns in priority order.
//! The [`Resolver`] walks the set, retries whole passes, and only gives up
//! once every candidate has missed on every pass.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::page::{Page, is_disabled};
use crate::retry::RetryPolicy;

/// What a candidate set is looking for. Used in diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ConsentAccept,
    ConsentSave,
    ConsentOverlay,
    VenueOpener,
    VenueItem,
    ProductOpener,
    ProductSearch,
    ProductItem,
    PageSearch,
    SidebarOpener,
    SidebarSearch,
    SidebarItem,
    ProductLink,
    DateOpener,
    DateItem,
    LoadingIndicator,
    TimeOpener,
    TimeItem,
    Submit,
    Listing,
    ListingTitle,
    ListingTime,
    ListingVenue,
    ListingDate,
    ListingPrice,
    BookAffordance,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConsentAccept => "consent accept button",
            Self::ConsentSave => "consent save button",
            Self::ConsentOverlay => "consent overlay",
            Self::VenueOpener => "venue selector",
            Self::VenueItem => "venue item",
            Self::ProductOpener => "product selector",
            Self::ProductSearch => "product search input",
            Self::ProductItem => "product item",
            Self::PageSearch => "page search input",
            Self::SidebarOpener => "search panel toggle",
            Self::SidebarSearch => "search panel input",
            Self::SidebarItem => "search panel item",
            Self::ProductLink => "product link",
            Self::DateOpener => "date selector",
            Self::DateItem => "date picker item",
            Self::LoadingIndicator => "loading indicator",
            Self::TimeOpener => "time selector",
            Self::TimeItem => "time item",
            Self::Submit => "submit button",
            Self::Listing => "listing",
            Self::ListingTitle => "listing title",
            Self::ListingTime => "listing time",
            Self::ListingVenue => "listing venue",
            Self::ListingDate => "listing date",
            Self::ListingPrice => "listing price",
            Self::BookAffordance => "book affordance",
        };
        f.write_str(name)
    }
}

/// One way of locating an element: a CSS selector, optionally narrowed to
/// elements whose text contains `text` (case-insensitive).
///
/// Written as `css` or `css:has-text('text')` in profiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct SelectorPattern {
    pub css: String,
    pub text: Option<String>,
}

impl SelectorPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(start) = raw.rfind(":has-text(")
            && raw.ends_with(')')
        {
            let inner = &raw[start + ":has-text(".len()..raw.len() - 1];
            let text = inner.trim().trim_matches(|c| c == '\'' || c == '"');
            let css = raw[..start].trim_end();
            return Self {
                css: if css.is_empty() { "*".to_string() } else { css.to_string() },
                text: Some(text.to_string()),
            };
        }
        Self {
            css: raw.to_string(),
            text: None,
        }
    }
}

impl From<String> for SelectorPattern {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for SelectorPattern {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for SelectorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{}:has-text('{}')", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// Ordered selector patterns for one role. Earlier entries win.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    role: Role,
    patterns: Vec<SelectorPattern>,
}

impl CandidateSet {
    pub fn new<I, S>(role: Role, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectorPattern>,
    {
        Self {
            role,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn patterns(&self) -> &[SelectorPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Rendered patterns, for error diagnostics.
    pub fn describe(&self) -> Vec<String> {
        self.patterns.iter().map(ToString::to_string).collect()
    }

    /// Every pattern rescoped under `scope`, e.g. a preferences panel.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            role: self.role,
            patterns: self
                .patterns
                .iter()
                .map(|p| SelectorPattern {
                    css: format!("{scope} {}", p.css),
                    text: p.text.clone(),
                })
                .collect(),
        }
    }

    pub fn not_found(&self, seen: Vec<String>) -> EngineError {
        EngineError::ElementNotFound {
            role: self.role,
            candidates: self.describe(),
            seen,
        }
    }
}

/// The element a candidate set resolved to, plus the pattern that found it
/// so it can be queried again after the DOM mutates.
#[derive(Debug, Clone)]
pub struct Resolved<E> {
    pub element: E,
    pub pattern: SelectorPattern,
    pub rank: usize,
}

/// A visible, enabled item and its rendered label.
#[derive(Debug, Clone)]
pub struct Item<E> {
    pub element: E,
    pub label: String,
}

/// What to click: something still to be located, or an element already in hand.
pub enum Target<'a, E> {
    Pattern(&'a CandidateSet),
    Resolved(E),
}

pub struct Resolver<'p, P: Page> {
    page: &'p P,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<'p, P: Page> Resolver<'p, P> {
    pub fn new(page: &'p P, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            page,
            policy,
            timeout,
        }
    }

    pub fn page(&self) -> &'p P {
        self.page
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Same resolver with a different per-candidate wait.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            page: self.page,
            policy: self.policy,
            timeout,
        }
    }

    /// Same resolver with a different retry policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            page: self.page,
            policy,
            timeout: self.timeout,
        }
    }

    /// Visible elements matching a single pattern. One page query.
    pub async fn visible_matches(&self, pattern: &SelectorPattern) -> EngineResult<Vec<P::Element>> {
        let found = self.page.wait_for_selector(&pattern.css, self.timeout).await?;
        self.keep_visible(found, pattern).await
    }

    /// Visible descendants of `scope` matching a single pattern. No waiting.
    pub async fn visible_within(
        &self,
        scope: &P::Element,
        pattern: &SelectorPattern,
    ) -> EngineResult<Vec<P::Element>> {
        let found = self.page.query_within(scope, &pattern.css).await?;
        self.keep_visible(found, pattern).await
    }

    /// First visible descendant of `scope` matched by any candidate, in priority order.
    pub async fn first_within(
        &self,
        scope: &P::Element,
        set: &CandidateSet,
    ) -> EngineResult<Option<P::Element>> {
        for pattern in set.patterns() {
            if let Some(hit) = self.visible_within(scope, pattern).await?.into_iter().next() {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    async fn keep_visible(
        &self,
        found: Vec<P::Element>,
        pattern: &SelectorPattern,
    ) -> EngineResult<Vec<P::Element>> {
        let mut visible = Vec::with_capacity(found.len());
        for element in found {
            if !self.page.is_visible(&element).await.unwrap_or(false) {
                continue;
            }
            if let Some(wanted) = &pattern.text {
                let text = self.page.inner_text(&element).await.unwrap_or_default();
                if !text.to_lowercase().contains(&wanted.to_lowercase()) {
                    continue;
                }
            }
            visible.push(element);
        }
        Ok(visible)
    }

    async fn pass(&self, set: &CandidateSet) -> EngineResult<Option<(usize, Vec<P::Element>)>> {
        for (rank, pattern) in set.patterns().iter().enumerate() {
            let hits = self.visible_matches(pattern).await?;
            if !hits.is_empty() {
                return Ok(Some((rank, hits)));
            }
        }
        Ok(None)
    }

    /// First candidate, in priority order, that resolves to a visible element.
    ///
    /// Runs up to `policy.attempts` full passes over the set with a fixed
    /// delay between passes before failing with `ElementNotFound`.
    pub async fn resolve(&self, set: &CandidateSet) -> EngineResult<Resolved<P::Element>> {
        let (rank, mut hits) = self.resolve_many(set).await?;
        Ok(Resolved {
            element: hits.swap_remove(0),
            pattern: set.patterns()[rank].clone(),
            rank,
        })
    }

    /// Like [`Resolver::resolve`], but a miss is `None` instead of an error.
    pub async fn try_resolve(&self, set: &CandidateSet) -> EngineResult<Option<Resolved<P::Element>>> {
        match self.resolve(set).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(EngineError::ElementNotFound { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn resolve_many(&self, set: &CandidateSet) -> EngineResult<(usize, Vec<P::Element>)> {
        if set.is_empty() {
            return Err(set.not_found(Vec::new()));
        }
        for attempt in 1..=self.policy.attempts {
            if let Some(found) = self.pass(set).await? {
                return Ok(found);
            }
            debug!(
                "No {} on pass {}/{} over {} candidate(s)",
                set.role(),
                attempt,
                self.policy.attempts,
                set.len()
            );
            if attempt < self.policy.attempts {
                self.page.pause(self.policy.delay).await;
            }
        }
        Err(set.not_found(Vec::new()))
    }

    /// All visible, enabled, non-empty items matched by the first candidate that matches anything.
    pub async fn resolve_items(&self, set: &CandidateSet) -> EngineResult<Vec<Item<P::Element>>> {
        let (_, hits) = self.resolve_many(set).await?;
        let mut items = Vec::with_capacity(hits.len());
        for element in hits {
            if is_disabled(self.page, &element).await.unwrap_or(false) {
                continue;
            }
            let label = self.page.inner_text(&element).await.unwrap_or_default();
            if label.is_empty() {
                continue;
            }
            items.push(Item { element, label });
        }
        Ok(items)
    }

    /// Like [`Resolver::resolve_items`], but a miss is an empty list.
    pub async fn items_or_empty(&self, set: &CandidateSet) -> EngineResult<Vec<Item<P::Element>>> {
        match self.resolve_items(set).await {
            Ok(items) => Ok(items),
            Err(EngineError::ElementNotFound { .. }) => Ok(Vec::new()),
            Err(other) => Err(other),
        }
    }

    /// Query the pattern that produced `resolved` again, for use after a DOM mutation.
    pub async fn requery(&self, resolved: &Resolved<P::Element>) -> EngineResult<Option<P::Element>> {
        Ok(self.visible_matches(&resolved.pattern).await?.into_iter().next())
    }

    /// Scroll the target into view and force-click it, retrying on failure.
    pub async fn click(&self, target: Target<'_, P::Element>) -> EngineResult<()> {
        let description = match &target {
            Target::Pattern(set) => set.describe().join(" | "),
            Target::Resolved(_) => "resolved element".to_string(),
        };
        for attempt in 1..=self.policy.attempts {
            let element = match &target {
                Target::Resolved(element) => Some(element.clone()),
                Target::Pattern(set) => self
                    .pass(set)
                    .await?
                    .and_then(|(_, hits)| hits.into_iter().next()),
            };
            let outcome = match element {
                Some(element) => self.scroll_and_click(&element).await,
                None => Err(format!("no candidate of {} is present", description)),
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    warn!(
                        "Click attempt {}/{} on {} failed: {}",
                        attempt, self.policy.attempts, description, reason
                    );
                }
            }
            if attempt < self.policy.attempts {
                self.page.pause(self.policy.delay).await;
            }
        }
        Err(EngineError::ClickFailed {
            target: description,
            attempts: self.policy.attempts,
        })
    }

    async fn scroll_and_click(&self, element: &P::Element) -> Result<(), String> {
        self.page
            .scroll_into_view(element)
            .await
            .map_err(|e| e.to_string())?;
        self.page.force_click(element).await.map_err(|e| e.to_string())
    }
}
