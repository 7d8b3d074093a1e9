//! Fixed-attempt, fixed-delay retry policy shared by the resolver and stage handlers.
//!
//! Page operations are short-lived and mostly fail on one-off timing races
//! (a dropdown still animating open), so there is no exponential growth.
//! Network-level waits use the longer bounds in [`Timeouts`].

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Delays taken between attempts: `attempts - 1` entries, all equal.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::repeat_n(self.delay, self.attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// Tunables for one engine run, loaded from the `engine` block of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub element_timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub page_load_timeout_ms: u64,
    pub dom_ready_timeout_ms: u64,
    pub network_idle_timeout_ms: u64,
    pub filter_settle_ms: u64,
    pub response_timeout_ms: u64,
    pub overlay_detach_ms: u64,
    pub consent_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            element_timeout_ms: 5_000,
            retries: 2,
            retry_delay_ms: 1_000,
            page_load_timeout_ms: 60_000,
            dom_ready_timeout_ms: 15_000,
            network_idle_timeout_ms: 10_000,
            filter_settle_ms: 2_000,
            response_timeout_ms: 8_000,
            overlay_detach_ms: 3_000,
            consent_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub element: Duration,
    pub consent: Duration,
    pub page_load: Duration,
    pub dom_ready: Duration,
    pub network_idle: Duration,
    pub response: Duration,
    pub filter_settle: Duration,
    pub overlay_detach: Duration,
    /// Poll interval for detach and disabled-state checks.
    pub poll: Duration,
}

impl EngineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            element: Duration::from_millis(self.element_timeout_ms),
            consent: Duration::from_millis(self.consent_timeout_ms),
            page_load: Duration::from_millis(self.page_load_timeout_ms),
            dom_ready: Duration::from_millis(self.dom_ready_timeout_ms),
            network_idle: Duration::from_millis(self.network_idle_timeout_ms),
            response: Duration::from_millis(self.response_timeout_ms),
            filter_settle: Duration::from_millis(self.filter_settle_ms),
            overlay_detach: Duration::from_millis(self.overlay_detach_ms),
            poll: Duration::from_millis(250),
        }
    }
}
