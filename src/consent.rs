//! Best-effort dismissal of cookie/consent overlays.
//!
//! Nothing in here may abort a run. Every failure is logged as a
//! consent-dismiss failure and the funnel proceeds with whatever is on screen.

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::page::{Page, wait_until_gone};
use crate::profile::Patterns;
use crate::retry::{RetryPolicy, Timeouts};
use crate::selector::{CandidateSet, Resolver, Role, SelectorPattern, Target};

const ACCEPT: &[&str] = &[
    "button#onetrust-accept-btn-handler",
    "#didomi-notice-agree-button",
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
    ".cmpboxbtn.cmpboxbtnyes",
    "button.fc-cta-consent",
    "button:has-text('Accept')",
    "button:has-text('Agree')",
    "button:has-text('Allow')",
    "a:has-text('Accept')",
    "[class*='cookie'] button:has-text('Confirm')",
    "[class*='consent'] button:has-text('Confirm')",
    "[class*='cookie'] button:has-text('OK')",
    "[class*='consent'] button:has-text('OK')",
    "button[class*='accept']",
    "button[id*='accept']",
    "[id*='cookie'] button",
    "[class*='cookie'] button",
    "[id*='consent'] button",
    "[class*='consent'] button",
];

/// Labels of controls that open a preferences panel instead of accepting.
const MANAGE_LABELS: &[&str] = &[
    "manage",
    "preferences",
    "settings",
    "customise",
    "customize",
    "options",
    "choices",
];

const PANEL_SCOPES: &[&str] = &[
    "#onetrust-pc-sdk",
    "[class*='preference']",
    "[id*='preference']",
    "[class*='consent']",
    "[id*='consent']",
    "[role='dialog']",
];

const SAVE: &[&str] = &[
    "button:has-text('Save')",
    "button:has-text('Confirm')",
    "button:has-text('Accept')",
    "button:has-text('Allow')",
    "button:has-text('Agree')",
];

const OVERLAY: &[&str] = &[
    "#onetrust-consent-sdk",
    ".onetrust-pc-dark-filter",
    "#CybotCookiebotDialog",
    "#didomi-host",
    "#cmpbox",
    "[class*='cookie-banner']",
    "[id*='cookie-banner']",
    "[class*='consent-banner']",
    "[class*='consent-overlay']",
    "[class*='cookie-overlay']",
    "[class*='modal-backdrop']",
];

/// What the handler did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsentReport {
    /// Label of the control clicked first, if any overlay was found.
    pub clicked: Option<String>,
    /// The first click opened a preferences panel that then had to be saved.
    pub saved_preferences: bool,
    /// The overlay outlived the click and was hidden directly.
    pub force_hidden: bool,
}

pub struct ConsentHandler<'p, P: Page> {
    /// Single short pass: an absent overlay is the common case.
    finder: Resolver<'p, P>,
    clicker: Resolver<'p, P>,
    timeouts: Timeouts,
    accept: CandidateSet,
}

fn is_manage_control(label: &str) -> bool {
    let label = label.to_lowercase();
    MANAGE_LABELS.iter().any(|m| label.contains(m))
}

fn save_candidates() -> CandidateSet {
    let save = CandidateSet::new(Role::ConsentSave, SAVE.iter().copied());
    let patterns: Vec<SelectorPattern> = PANEL_SCOPES
        .iter()
        .flat_map(|scope| save.scoped(scope).patterns().to_vec())
        .collect();
    CandidateSet::new(Role::ConsentSave, patterns)
}

impl<'p, P: Page> ConsentHandler<'p, P> {
    /// Site-specific candidates from the profile are tried before the generic list.
    pub fn new(page: &'p P, site_candidates: &Patterns, timeouts: Timeouts, policy: RetryPolicy) -> Self {
        let accept = CandidateSet::new(
            Role::ConsentAccept,
            site_candidates
                .iter()
                .cloned()
                .chain(ACCEPT.iter().copied().map(SelectorPattern::parse)),
        );
        let finder = Resolver::new(page, RetryPolicy::new(1, policy.delay), timeouts.consent);
        let clicker = finder.with_policy(policy);
        Self {
            finder,
            clicker,
            timeouts,
            accept,
        }
    }

    pub async fn dismiss(&self) -> ConsentReport {
        let mut report = ConsentReport::default();

        let control = match self.finder.try_resolve(&self.accept).await {
            Ok(Some(control)) => control,
            Ok(None) => {
                debug!("No consent overlay detected");
                return report;
            }
            Err(e) => {
                warn!("{}", EngineError::ConsentDismissFailure(e.to_string()));
                return report;
            }
        };

        let page = self.finder.page();
        let label = page.inner_text(&control.element).await.unwrap_or_default();
        info!("Dismissing consent overlay via '{}' ({})", label, control.pattern);

        if let Err(e) = self.clicker.click(Target::Resolved(control.element)).await {
            warn!("{}", EngineError::ConsentDismissFailure(e.to_string()));
        } else if is_manage_control(&label) {
            report.saved_preferences = self.save_preferences().await;
        }
        report.clicked = Some(label);

        report.force_hidden = self.clear_overlay().await;
        report
    }

    async fn save_preferences(&self) -> bool {
        info!("Consent control opened a preferences panel, saving it");
        let save = save_candidates();
        let outcome = async {
            let control = self.finder.resolve(&save).await?;
            self.clicker.click(Target::Resolved(control.element)).await
        }
        .await;
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", EngineError::ConsentDismissFailure(e.to_string()));
                false
            }
        }
    }

    /// Wait for the backdrop to go away, hiding it directly if it will not.
    async fn clear_overlay(&self) -> bool {
        let overlay = CandidateSet::new(Role::ConsentOverlay, OVERLAY.iter().copied());
        let page = self.finder.page();
        let Ok(Some(found)) = self.finder.try_resolve(&overlay).await else {
            return false;
        };
        match wait_until_gone(page, &found.element, self.timeouts.overlay_detach, self.timeouts.poll).await {
            Ok(true) => false,
            Ok(false) | Err(_) => {
                warn!(
                    "{}",
                    EngineError::ConsentDismissFailure(format!(
                        "{} still present after {:?}, hiding it",
                        found.pattern, self.timeouts.overlay_detach
                    ))
                );
                if let Err(e) = page.force_hide(&found.element).await {
                    warn!("{}", EngineError::ConsentDismissFailure(e.to_string()));
                    return false;
                }
                true
            }
        }
    }
}
