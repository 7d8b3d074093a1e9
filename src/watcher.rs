use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::alert::Alert;
use crate::browser::{Launcher, Session};
use crate::engine;
use crate::models::{BookingRequest, Outcome};
use crate::notify::Notifier;
use crate::profile::ProfileRegistry;
use crate::retry::EngineSettings;

/// Counts for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    /// Bookings still being watched after this tick
    pub remaining: usize,
}

/// Checks every pending booking once per tick and stops watching the ones that came up.
pub struct Watcher<L: Launcher> {
    launcher: L,
    registry: ProfileRegistry,
    settings: EngineSettings,
    notifier: Notifier,
    pending: Mutex<Vec<BookingRequest>>,
    remaining: AtomicUsize,
}

impl<L: Launcher> Watcher<L> {
    pub fn new(
        launcher: L,
        registry: ProfileRegistry,
        settings: EngineSettings,
        notifier: Notifier,
        requests: Vec<BookingRequest>,
    ) -> Self {
        Self {
            launcher,
            registry,
            settings,
            notifier,
            remaining: AtomicUsize::new(requests.len()),
            pending: Mutex::new(requests),
        }
    }

    /// Bookings not found yet, as of the last completed tick.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Run one check of every pending booking in a fresh browser session.
    ///
    /// Returns `None` when the previous tick is still running; the two never overlap.
    pub async fn tick(&self) -> Result<Option<TickSummary>> {
        let Ok(mut pending) = self.pending.try_lock() else {
            warn!("Previous check still running, skipping this tick");
            return Ok(None);
        };
        if pending.is_empty() {
            return Ok(Some(TickSummary::default()));
        }

        info!("Checking {} booking(s)", pending.len());
        let mut session = self
            .launcher
            .launch()
            .await
            .context("Failed to start browser session")?;

        let mut summary = TickSummary::default();
        let mut still_pending = Vec::with_capacity(pending.len());
        for request in pending.drain(..) {
            match self.check_one(&mut session, &request).await {
                Some(Outcome::Found(result)) => {
                    summary.found += 1;
                    if let Some(alert) = Alert::from_result(&request, &result)
                        && let Err(e) = self.notifier.send(&alert, result.checked_at).await
                    {
                        error!("Failed to deliver alert for {}: {:#}", request.target_url, e);
                    }
                }
                Some(Outcome::NotFound(_)) => {
                    summary.not_found += 1;
                    still_pending.push(request);
                }
                Some(Outcome::Error(e)) => {
                    summary.errors += 1;
                    match e.stage() {
                        Some(stage) => error!(
                            "Check of {} failed at the {} stage: {}",
                            request.target_url,
                            stage,
                            e.root()
                        ),
                        None => error!("Check of {} failed: {}", request.target_url, e),
                    }
                    still_pending.push(request);
                }
                None => {
                    summary.errors += 1;
                    still_pending.push(request);
                }
            }
        }
        *pending = still_pending;

        if let Err(e) = session.close().await {
            warn!("Browser session did not close cleanly: {:#}", e);
        }

        summary.remaining = pending.len();
        self.remaining.store(summary.remaining, Ordering::SeqCst);
        info!(
            "Check finished at {}: {} found, {} not found, {} error(s), {} still watched",
            Utc::now().format("%H:%M:%S"),
            summary.found,
            summary.not_found,
            summary.errors,
            summary.remaining
        );
        Ok(Some(summary))
    }

    /// `None` if no page could be opened for the request.
    async fn check_one(
        &self,
        session: &mut L::Session,
        request: &BookingRequest,
    ) -> Option<Outcome> {
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                error!("Could not open a page for {}: {:#}", request.target_url, e);
                return None;
            }
        };
        let profile = self.registry.for_url(&request.target_url);
        let outcome = engine::check(&page, profile, &self.settings, request).await;
        info!("{} -> {}", request.target_url, outcome.label());
        Some(outcome)
    }
}
