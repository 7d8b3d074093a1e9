//! Venue, product, date, time and submit handlers.
//!
//! Each one builds its candidate sets from the site profile, opens the
//! control, reads the offered items, picks the one matching the request and
//! clicks it. A stage the profile leaves out is a no-op.

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use super::{Navigator, timeout_to_navigation};
use crate::dates::{DateFormatCandidates, TimeFormatCandidates};
use crate::error::{EngineError, EngineResult};
use crate::matcher::{title_matches, venue_matches};
use crate::page::{Page, is_disabled};
use crate::profile::{Patterns, candidates};
use crate::selector::{CandidateSet, Item, Resolved, Role, Target};

pub(super) fn labels<E>(items: &[Item<E>]) -> Vec<String> {
    items.iter().map(|item| item.label.clone()).collect()
}

fn push_unique(into: &mut Vec<String>, from: impl IntoIterator<Item = String>) {
    for value in from {
        if !into.contains(&value) {
            into.push(value);
        }
    }
}

/// An opened selector and the items it offered.
pub(super) struct Opened<E> {
    pub items_set: CandidateSet,
    pub items: Vec<Item<E>>,
}

impl<'p, P: Page> Navigator<'p, P> {
    /// Click the opener and read the items it reveals.
    ///
    /// Some sites render the list inline with no opener at all, so a missing
    /// opener falls back to reading the items directly. `Ok(None)` means an
    /// optional stage is absent from this page.
    pub(super) async fn open_stage(
        &self,
        opener: (Role, &Patterns),
        items: (Role, &Patterns),
        optional: bool,
        require_enabled: bool,
    ) -> EngineResult<Option<Opened<P::Element>>> {
        let opener_set = candidates(opener.0, opener.1);
        let items_set = candidates(items.0, items.1);

        match self.resolver.try_resolve(&opener_set).await? {
            Some(found) => {
                let element = if require_enabled {
                    self.wait_enabled(&found).await?
                } else {
                    found.element
                };
                self.resolver.click(Target::Resolved(element)).await?;
                let items = self.resolver.resolve_items(&items_set).await?;
                Ok(Some(Opened { items_set, items }))
            }
            None => {
                let inline = self.resolver.items_or_empty(&items_set).await?;
                if !inline.is_empty() {
                    debug!("No {} present, using inline {} list", opener.0, items.0);
                    return Ok(Some(Opened {
                        items_set,
                        items: inline,
                    }));
                }
                if optional {
                    debug!("Optional {} absent, skipping", opener.0);
                    return Ok(None);
                }
                Err(opener_set.not_found(Vec::new()))
            }
        }
    }

    /// A disabled control gets one grace period to become enabled.
    async fn wait_enabled(&self, found: &Resolved<P::Element>) -> EngineResult<P::Element> {
        if !is_disabled(self.page, &found.element).await? {
            return Ok(found.element.clone());
        }
        debug!("{} is disabled, waiting {:?}", found.pattern, self.settings.retry_policy().delay);
        self.page.pause(self.settings.retry_policy().delay).await;

        if let Some(element) = self.resolver.requery(found).await?
            && !is_disabled(self.page, &element).await?
        {
            return Ok(element);
        }
        Err(EngineError::ClickFailed {
            target: format!("{} (disabled)", found.pattern),
            attempts: 2,
        })
    }

    async fn click_item(&self, item: &Item<P::Element>) -> EngineResult<()> {
        self.resolver.click(Target::Resolved(item.element.clone())).await
    }

    pub(super) async fn select_venue(&self, venue: &str) -> EngineResult<()> {
        let Some(stage) = &self.profile.venue else {
            debug!("Profile '{}' has no venue stage", self.profile.name);
            return Ok(());
        };
        let Some(opened) = self
            .open_stage(
                (Role::VenueOpener, &stage.opener),
                (Role::VenueItem, &stage.items),
                stage.optional,
                false,
            )
            .await?
        else {
            return Ok(());
        };

        let Some(item) = opened.items.iter().find(|item| venue_matches(&item.label, venue)) else {
            return Err(opened.items_set.not_found(labels(&opened.items)));
        };
        info!("Selecting venue '{}'", item.label);
        self.click_item(item).await
    }

    /// Select the product, working through the profile's search fallbacks in order:
    /// the product selector (with its filter box), a page-wide search, a
    /// slide-in search panel, and finally any title links on the page.
    pub(super) async fn select_product(&self, title: &str) -> EngineResult<()> {
        let Some(stage) = &self.profile.product else {
            debug!("Profile '{}' has no product stage", self.profile.name);
            return Ok(());
        };
        let mut tried = Vec::new();
        let mut seen = Vec::new();

        let opener = candidates(Role::ProductOpener, &stage.opener);
        match self.resolver.try_resolve(&opener).await? {
            Some(found) => match self.resolver.click(Target::Resolved(found.element)).await {
                Ok(()) => {
                    self.filter(Role::ProductSearch, &stage.search_input, title).await?;
                    let items = candidates(Role::ProductItem, &stage.items);
                    if self.pick_title(&items, title, &mut tried, &mut seen).await? {
                        return Ok(());
                    }
                }
                Err(e) => warn!("Product selector would not open: {}", e),
            },
            None => debug!("No product selector, trying search fallbacks"),
        }

        let links = candidates(Role::ProductLink, &stage.generic_items);

        if self.filter(Role::PageSearch, &stage.page_search, title).await?
            && self.pick_title(&links, title, &mut tried, &mut seen).await?
        {
            return Ok(());
        }

        if let Some(sidebar) = &stage.sidebar {
            let toggle = candidates(Role::SidebarOpener, &sidebar.opener);
            if let Some(found) = self.resolver.try_resolve(&toggle).await? {
                self.resolver.click(Target::Resolved(found.element)).await?;
                self.filter(Role::SidebarSearch, &sidebar.input, title).await?;
                let items = candidates(Role::SidebarItem, &sidebar.items);
                if self.pick_title(&items, title, &mut tried, &mut seen).await? {
                    return Ok(());
                }
            }
        }

        if self.pick_title(&links, title, &mut tried, &mut seen).await? {
            return Ok(());
        }

        Err(EngineError::ElementNotFound {
            role: Role::ProductItem,
            candidates: tried,
            seen,
        })
    }

    /// Type `text` into the first matching input and let client-side filtering settle.
    async fn filter(&self, role: Role, inputs: &Patterns, text: &str) -> EngineResult<bool> {
        if inputs.is_empty() {
            return Ok(false);
        }
        let Some(input) = self.resolver.try_resolve(&candidates(role, inputs)).await? else {
            return Ok(false);
        };
        debug!("Filtering {} with '{}'", role, text);
        self.page.fill(&input.element, text).await?;
        self.page.pause(self.timeouts.filter_settle).await;
        Ok(true)
    }

    async fn pick_title(
        &self,
        set: &CandidateSet,
        title: &str,
        tried: &mut Vec<String>,
        seen: &mut Vec<String>,
    ) -> EngineResult<bool> {
        if set.is_empty() {
            return Ok(false);
        }
        push_unique(tried, set.describe());
        let items = self.resolver.items_or_empty(set).await?;
        push_unique(seen, labels(&items));

        let suffixes = &self.profile.title_suffixes;
        let Some(item) = items
            .iter()
            .find(|item| title_matches(&item.label, title, suffixes))
        else {
            return Ok(false);
        };
        info!("Selecting product '{}'", item.label);
        self.click_item(item).await?;
        Ok(true)
    }

    pub(super) async fn select_date(&self, date: NaiveDate) -> EngineResult<()> {
        let Some(stage) = &self.profile.date else {
            debug!("Profile '{}' has no date stage", self.profile.name);
            return Ok(());
        };
        let Some(opened) = self
            .open_stage(
                (Role::DateOpener, &stage.opener),
                (Role::DateItem, &stage.items),
                stage.optional,
                false,
            )
            .await?
        else {
            return Ok(());
        };

        let wanted = DateFormatCandidates::new(date).relative_to(self.today);
        let Some(index) = wanted.first_match(opened.items.iter().map(|item| item.label.as_str()))
        else {
            debug!("None of {:?} appear in the date list", wanted.renderings());
            return Err(opened.items_set.not_found(labels(&opened.items)));
        };
        let item = &opened.items[index];
        info!("Selecting date '{}' for {}", item.label, date);
        self.click_item(item).await
    }

    pub(super) async fn select_time(&self, time: Option<NaiveTime>) -> EngineResult<()> {
        let Some(stage) = &self.profile.time else {
            debug!("Profile '{}' has no time stage", self.profile.name);
            return Ok(());
        };
        let Some(time) = time else {
            debug!("No time requested, leaving the time selector alone");
            return Ok(());
        };
        let Some(opened) = self
            .open_stage(
                (Role::TimeOpener, &stage.opener),
                (Role::TimeItem, &stage.items),
                stage.optional,
                true,
            )
            .await?
        else {
            return Ok(());
        };

        let wanted = TimeFormatCandidates::new(time);
        let Some(index) = wanted.first_match(opened.items.iter().map(|item| item.label.as_str()))
        else {
            debug!("None of {:?} appear in the time list", wanted.renderings());
            return Err(opened.items_set.not_found(labels(&opened.items)));
        };
        let item = &opened.items[index];
        info!("Selecting time '{}'", item.label);
        self.click_item(item).await
    }

    pub(super) async fn submit(&self) -> EngineResult<()> {
        if self.profile.submit.is_empty() {
            return Ok(());
        }
        let set = candidates(Role::Submit, &self.profile.submit);
        let found = self.resolver.resolve(&set).await?;
        info!("Submitting via {}", found.pattern);
        self.resolver.click(Target::Resolved(found.element)).await?;
        self.page
            .wait_for_network_idle(self.timeouts.network_idle)
            .await
            .map_err(|e| timeout_to_navigation(e, "results after submit"))
    }
}
