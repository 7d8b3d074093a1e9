//! Date sweep for widgets that only reveal showtimes once a date is picked.
//!
//! Every offered date is selected in turn. Times are read from the showtime
//! XHR when the profile names one, and from the rendered time list. A date
//! that fails is logged and skipped; the sweep carries on with the next.

use chrono::{DateTime, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Navigator;
use super::stages::labels;
use crate::dates::parse_time;
use crate::error::EngineResult;
use crate::models::DateShowtimes;
use crate::page::{Page, normalize_text, wait_until_gone};
use crate::profile::{DateStage, SweepProfile, candidates};
use crate::retry::RetryPolicy;
use crate::selector::{CandidateSet, Role, Target};

impl<'p, P: Page> Navigator<'p, P> {
    pub(super) async fn sweep_dates(
        &self,
        stage: &DateStage,
        sweep: &SweepProfile,
    ) -> EngineResult<Vec<DateShowtimes>> {
        let Some(opened) = self
            .open_stage(
                (Role::DateOpener, &stage.opener),
                (Role::DateItem, &stage.items),
                stage.optional,
                false,
            )
            .await?
        else {
            return Ok(Vec::new());
        };
        let opener = candidates(Role::DateOpener, &stage.opener);
        let dates = labels(&opened.items);
        info!("Sweeping {} date(s)", dates.len());

        let mut schedule = Vec::with_capacity(dates.len());
        for (index, date) in dates.iter().enumerate() {
            match self
                .try_date(index, date, &opener, &opened.items_set, sweep)
                .await
            {
                Ok(times) => {
                    debug!("{}: {} time(s)", date, times.len());
                    schedule.push(DateShowtimes {
                        date: date.clone(),
                        times,
                    });
                }
                Err(e) => warn!("Skipping date '{}': {}", date, e),
            }
        }
        Ok(schedule)
    }

    async fn try_date(
        &self,
        index: usize,
        date: &str,
        opener: &CandidateSet,
        items_set: &CandidateSet,
        sweep: &SweepProfile,
    ) -> EngineResult<Vec<String>> {
        // Picking a date closes the list, so every date after the first reopens it.
        if index > 0 && !opener.is_empty() {
            self.resolver.click(Target::Pattern(opener)).await?;
        }
        let items = self.resolver.resolve_items(items_set).await?;
        let item = match items.iter().position(|item| item.label == date) {
            Some(at) => &items[at],
            None => items
                .get(index)
                .ok_or_else(|| items_set.not_found(labels(&items)))?,
        };

        if let Some(fragment) = &sweep.showtime_response {
            self.page.arm_response(fragment).await?;
        }
        self.resolver
            .click(Target::Resolved(item.element.clone()))
            .await?;
        self.wait_for_loading(sweep).await?;

        let mut times = Vec::new();
        if sweep.showtime_response.is_some() {
            match self.page.await_response(self.timeouts.response).await? {
                Some(body) => collect_times(&body, &mut times),
                None => debug!("No showtime response for '{}'", date),
            }
        }

        // The time list is usually empty for dates without showings, so one short pass is enough.
        let quick = self
            .resolver
            .with_policy(RetryPolicy::new(1, self.timeouts.poll))
            .with_timeout(self.timeouts.consent);
        if let Some(toggle) = quick
            .try_resolve(&candidates(Role::TimeOpener, &sweep.time_opener))
            .await?
            && let Err(e) = quick.click(Target::Resolved(toggle.element)).await
        {
            debug!("Time list toggle for '{}' did not respond: {}", date, e);
        }
        for item in quick
            .items_or_empty(&candidates(Role::TimeItem, &sweep.time_items))
            .await?
        {
            let label = normalize_text(&item.label);
            if !times.contains(&label) {
                times.push(label);
            }
        }
        Ok(times)
    }

    async fn wait_for_loading(&self, sweep: &SweepProfile) -> EngineResult<()> {
        if sweep.loading.is_empty() {
            return Ok(());
        }
        let quick = self
            .resolver
            .with_policy(RetryPolicy::new(1, self.timeouts.poll))
            .with_timeout(self.timeouts.poll);
        let Some(spinner) = quick
            .try_resolve(&candidates(Role::LoadingIndicator, &sweep.loading))
            .await?
        else {
            return Ok(());
        };
        if !wait_until_gone(self.page, &spinner.element, self.timeouts.network_idle, self.timeouts.poll).await? {
            warn!(
                "{} still showing after {:?}, reading times anyway",
                spinner.pattern, self.timeouts.network_idle
            );
        }
        Ok(())
    }
}

/// Showtimes anywhere in a JSON body, as `HH:MM`, in document order without duplicates.
pub(crate) fn collect_times(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            if let Some(time) = showtime_of(text) {
                let time = time.format("%H:%M").to_string();
                if !out.contains(&time) {
                    out.push(time);
                }
            }
        }
        Value::Array(values) => values.iter().for_each(|v| collect_times(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_times(v, out)),
        _ => {}
    }
}

fn showtime_of(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    // Prices and ratings ("12.50") also parse as times, so require a colon.
    if !text.contains(':') {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.time());
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(at.time());
    }
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .ok()
        .or_else(|| parse_time(text))
}
