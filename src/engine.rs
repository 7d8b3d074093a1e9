//! One availability check: drive the funnel on a page, then scan the results.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::Stage;
use crate::matcher::Matcher;
use crate::models::{BookingRequest, MatchResult, Outcome};
use crate::navigator::{FunnelOutput, Navigator};
use crate::page::Page;
use crate::profile::SiteProfile;
use crate::retry::EngineSettings;
use crate::selector::Resolver;

/// Run the full check for `request` on an already-open page.
pub async fn check<P: Page>(
    page: &P,
    profile: &SiteProfile,
    settings: &EngineSettings,
    request: &BookingRequest,
) -> Outcome {
    check_as_of(page, profile, settings, request, chrono::Local::now().date_naive()).await
}

/// Like [`check`], with "Today"/"Tomorrow" date labels read relative to `today`.
pub async fn check_as_of<P: Page>(
    page: &P,
    profile: &SiteProfile,
    settings: &EngineSettings,
    request: &BookingRequest,
    today: NaiveDate,
) -> Outcome {
    let url = &request.target_url;
    let mut navigator = Navigator::new(page, profile, settings).with_today(today);

    let result = match navigator.run(request).await {
        Ok(FunnelOutput::Swept(schedule)) => MatchResult::from_schedule(url, schedule),
        Ok(FunnelOutput::Submitted) => {
            let resolver = Resolver::new(page, settings.retry_policy(), settings.timeouts().element);
            let matcher = Matcher::new(&resolver, &profile.listings, &profile.title_suffixes);
            match matcher.scan(&request.preferences, url).await {
                Ok(result) => result,
                Err(e) => return Outcome::Error(navigator.fail(Stage::Scan, e)),
            }
        }
        Err(e) => return Outcome::Error(e),
    };
    navigator.mark_scanned();
    debug!(
        "Visited {}",
        navigator
            .history()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    if result.found() {
        info!(
            "'{}' is available at {} ({})",
            request.preferences.product_title, request.preferences.venue_name, url
        );
    } else {
        warn!(
            "'{}' not available yet at {} ({}, {})",
            request.preferences.product_title,
            request.preferences.venue_name,
            url,
            navigator.state()
        );
    }
    Outcome::from(result)
}
