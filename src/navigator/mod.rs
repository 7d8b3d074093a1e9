//! The booking funnel as a forward-only state machine.
//!
//! `Init → ConsentResolved → VenueSelected → ProductSelected → DateSelected
//! → TimeSelected → Submitted`, with the matcher taking it to `Scanned`.
//! Any stage may move it to `Failed`. Stages the site profile does not
//! define are passed through without touching the page.

mod stages;
mod sweep;
#[cfg(test)]
mod tests;

use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::consent::ConsentHandler;
use crate::error::{EngineError, EngineResult, PageError, Stage};
use crate::models::{BookingRequest, DateShowtimes};
use crate::page::Page;
use crate::profile::SiteProfile;
use crate::retry::{EngineSettings, Timeouts};
use crate::selector::Resolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationState {
    Init,
    ConsentResolved,
    VenueSelected,
    ProductSelected,
    DateSelected,
    TimeSelected,
    Submitted,
    Scanned,
    Failed { stage: Stage, reason: String },
}

impl NavigationState {
    fn rank(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::ConsentResolved => 1,
            Self::VenueSelected => 2,
            Self::ProductSelected => 3,
            Self::DateSelected => 4,
            Self::TimeSelected => 5,
            Self::Submitted => 6,
            Self::Scanned => 7,
            Self::Failed { .. } => u8::MAX,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Scanned | Self::Failed { .. })
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { stage, .. } => write!(f, "Failed({stage})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// How the funnel ended up ready for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunnelOutput {
    /// The submit stage ran (or was not needed); listings are on the page.
    Submitted,
    /// Every date was tried; this is what each produced.
    Swept(Vec<DateShowtimes>),
}

pub struct Navigator<'p, P: Page> {
    page: &'p P,
    profile: &'p SiteProfile,
    settings: &'p EngineSettings,
    resolver: Resolver<'p, P>,
    timeouts: Timeouts,
    today: NaiveDate,
    state: NavigationState,
    history: Vec<NavigationState>,
}

impl<'p, P: Page> Navigator<'p, P> {
    pub fn new(page: &'p P, profile: &'p SiteProfile, settings: &'p EngineSettings) -> Self {
        let timeouts = settings.timeouts();
        Self {
            page,
            profile,
            settings,
            resolver: Resolver::new(page, settings.retry_policy(), timeouts.element),
            timeouts,
            today: chrono::Local::now().date_naive(),
            state: NavigationState::Init,
            history: vec![NavigationState::Init],
        }
    }

    /// Reference date for "Today"/"Tomorrow" labels.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[NavigationState] {
        &self.history
    }

    fn advance(&mut self, next: NavigationState) {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            warn!("Ignoring backward transition {} -> {}", self.state, next);
            return;
        }
        debug!("Navigation {} -> {}", self.state, next);
        self.state = next.clone();
        self.history.push(next);
    }

    pub(crate) fn fail(&mut self, stage: Stage, error: EngineError) -> EngineError {
        let error = error.at(stage);
        warn!("Navigation failed at {} stage: {}", stage, error);
        let failed = NavigationState::Failed {
            stage,
            reason: error.to_string(),
        };
        self.state = failed.clone();
        self.history.push(failed);
        error
    }

    /// Mark the run complete once the matcher has looked at the listings.
    pub fn mark_scanned(&mut self) {
        self.advance(NavigationState::Scanned);
    }

    /// Load the page, clear consent, and drive every configured stage.
    pub async fn run(&mut self, request: &BookingRequest) -> EngineResult<FunnelOutput> {
        let prefs = &request.preferences;

        if let Err(e) = self.load(&request.target_url).await {
            return Err(self.fail(Stage::Load, e));
        }

        let report = ConsentHandler::new(
            self.page,
            &self.profile.consent,
            self.timeouts,
            self.settings.retry_policy(),
        )
        .dismiss()
        .await;
        debug!("Consent: {:?}", report);
        self.advance(NavigationState::ConsentResolved);

        if let Err(e) = self.select_venue(&prefs.venue_name).await {
            return Err(self.fail(Stage::Venue, e));
        }
        self.advance(NavigationState::VenueSelected);

        if let Err(e) = self.select_product(&prefs.product_title).await {
            return Err(self.fail(Stage::Product, e));
        }
        self.advance(NavigationState::ProductSelected);

        let profile = self.profile;
        if let Some(date_stage) = &profile.date
            && let Some(sweep) = &date_stage.sweep
        {
            let schedule = match self.sweep_dates(date_stage, sweep).await {
                Ok(schedule) => schedule,
                Err(e) => return Err(self.fail(Stage::Date, e)),
            };
            self.advance(NavigationState::DateSelected);
            info!(
                "Date sweep found times on {} of {} date(s)",
                schedule.iter().filter(|d| !d.times.is_empty()).count(),
                schedule.len()
            );
            return Ok(FunnelOutput::Swept(schedule));
        }

        if let Err(e) = self.select_date(prefs.date).await {
            return Err(self.fail(Stage::Date, e));
        }
        self.advance(NavigationState::DateSelected);

        if let Err(e) = self.select_time(prefs.time).await {
            return Err(self.fail(Stage::Time, e));
        }
        self.advance(NavigationState::TimeSelected);

        if let Err(e) = self.submit().await {
            return Err(self.fail(Stage::Submit, e));
        }
        self.advance(NavigationState::Submitted);

        Ok(FunnelOutput::Submitted)
    }

    /// Navigate and wait for network idle, settling for DOM-ready if the network never goes quiet.
    async fn load(&self, url: &str) -> EngineResult<()> {
        info!("Loading {}", url);
        self.page
            .goto(url, self.timeouts.page_load)
            .await
            .map_err(|e| timeout_to_navigation(e, "page navigation"))?;

        match self.page.wait_for_network_idle(self.timeouts.page_load).await {
            Ok(()) => Ok(()),
            Err(PageError::Timeout { .. }) => {
                warn!(
                    "{} did not reach network idle within {:?}, falling back to DOM ready",
                    url, self.timeouts.page_load
                );
                self.page
                    .wait_for_dom_ready(self.timeouts.dom_ready)
                    .await
                    .map_err(|e| timeout_to_navigation(e, "DOM ready"))
            }
            Err(other) => Err(other.into()),
        }
    }
}

pub(crate) fn timeout_to_navigation(error: PageError, what: &str) -> EngineError {
    match error {
        PageError::Timeout { after, .. } => EngineError::NavigationTimeout {
            what: what.to_string(),
            timeout: after,
        },
        other => other.into(),
    }
}
