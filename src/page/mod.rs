//! The page capability the engine drives.
//!
//! The engine never touches a browser directly. Everything it needs from a
//! live page (navigate, query, read text, click, fill, wait) goes through
//! [`Page`], so the same funnel logic runs against Chromium in production and
//! against an in-memory HTML fixture in tests.

#[cfg(test)]
pub mod fixture;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PageError;

pub type PageResult<T> = Result<T, PageError>;

/// A single browser tab, owned exclusively by the running job.
#[async_trait]
pub trait Page: Send + Sync {
    /// Handle to a live element. Cheap to clone; may go stale after DOM mutations.
    type Element: Clone + Send + Sync + 'static;

    /// Navigate to `url`, failing with [`PageError::Timeout`] if the navigation itself does not commit.
    async fn goto(&self, url: &str, timeout: Duration) -> PageResult<()>;

    /// Block until no network activity is observed, bounded by `timeout`.
    async fn wait_for_network_idle(&self, timeout: Duration) -> PageResult<()>;

    /// Block until the document has been parsed, bounded by `timeout`.
    async fn wait_for_dom_ready(&self, timeout: Duration) -> PageResult<()>;

    /// All elements currently matching the CSS selector, in document order.
    async fn query_all(&self, css: &str) -> PageResult<Vec<Self::Element>>;

    /// Like [`Page::query_all`], but waits up to `timeout` for at least one match.
    /// Returns an empty list on timeout instead of an error.
    async fn wait_for_selector(&self, css: &str, timeout: Duration)
    -> PageResult<Vec<Self::Element>>;

    /// Descendants of `scope` matching the CSS selector.
    async fn query_within(
        &self,
        scope: &Self::Element,
        css: &str,
    ) -> PageResult<Vec<Self::Element>>;

    /// Rendered text of the element, whitespace collapsed.
    async fn inner_text(&self, element: &Self::Element) -> PageResult<String>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> PageResult<Option<String>>;

    async fn is_visible(&self, element: &Self::Element) -> PageResult<bool>;

    async fn is_attached(&self, element: &Self::Element) -> PageResult<bool>;

    async fn scroll_into_view(&self, element: &Self::Element) -> PageResult<()>;

    /// Click without actionability checks, so overlays cannot intercept it.
    async fn force_click(&self, element: &Self::Element) -> PageResult<()>;

    /// Replace the element's value and fire the input events client-side filters listen for.
    async fn fill(&self, element: &Self::Element, value: &str) -> PageResult<()>;

    /// Remove the element from view without detaching it.
    async fn force_hide(&self, element: &Self::Element) -> PageResult<()>;

    async fn pause(&self, duration: Duration);

    /// Start recording responses whose URL contains `url_fragment`.
    /// Must be called before the action that triggers the request.
    async fn arm_response(&self, url_fragment: &str) -> PageResult<()>;

    /// JSON body of the first armed response, or `None` if nothing arrived within `timeout`.
    async fn await_response(&self, timeout: Duration) -> PageResult<Option<serde_json::Value>>;
}

/// Disabled state as the funnel widgets expose it: the `disabled` attribute,
/// `aria-disabled="true"`, or a `disabled` class modifier.
pub async fn is_disabled<P: Page>(page: &P, element: &P::Element) -> PageResult<bool> {
    if page.attribute(element, "disabled").await?.is_some() {
        return Ok(true);
    }
    if page
        .attribute(element, "aria-disabled")
        .await?
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(true);
    }
    let class = page.attribute(element, "class").await?.unwrap_or_default();
    Ok(class
        .split_whitespace()
        .any(|c| c == "disabled" || c.ends_with("--disabled") || c.ends_with("-disabled")))
}

/// Poll until the element is detached or hidden. Returns `false` if it is still showing after `timeout`.
pub async fn wait_until_gone<P: Page>(
    page: &P,
    element: &P::Element,
    timeout: Duration,
    poll: Duration,
) -> PageResult<bool> {
    let polls = (timeout.as_millis() / poll.as_millis().max(1)).max(1);
    for _ in 0..polls {
        if !page.is_attached(element).await? || !page.is_visible(element).await? {
            return Ok(true);
        }
        page.pause(poll).await;
    }
    Ok(!page.is_attached(element).await? || !page.is_visible(element).await?)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  Dune:\n  Part   Two \t"), "Dune: Part Two");
    }
}
