//! [`Page`] over a Chromium tab.
//!
//! Every operation is a short synchronous script. Queried elements are tagged
//! with a `data-sf-id` attribute that carries a per-document token, so a
//! handle from a replaced document simply stops resolving and reports
//! [`PageError::Detached`]. Waits are polled from Rust.
//!
//! Network idle is judged from CDP network events rather than from the page,
//! so requests still in flight keep the page busy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::PageError;
use crate::page::{Page, PageResult, normalize_text};

const POLL: Duration = Duration::from_millis(200);
/// No request may be in flight for this long before the network counts as idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Handle to an element tagged by a previous query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(String);

/// Requests the tab has started but not yet finished.
#[derive(Debug)]
struct Traffic {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl Traffic {
    fn started(&mut self, id: &str) {
        self.in_flight.insert(id.to_string());
        self.last_change = Instant::now();
    }

    fn ended(&mut self, id: &str) {
        if self.in_flight.remove(id) {
            self.last_change = Instant::now();
        }
    }

    /// Time since the last request ended, or `None` while any is in flight.
    fn quiet_for(&self) -> Option<Duration> {
        self.in_flight
            .is_empty()
            .then(|| self.last_change.elapsed())
    }
}

pub struct ChromiumPage {
    page: chromiumoxide::Page,
    traffic: Arc<Mutex<Traffic>>,
    watcher: JoinHandle<()>,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    error: Option<String>,
    value: Option<T>,
}

/// Shared prelude: element lookup and tagging helpers.
const PRELUDE: &str = r#"
const doc = (window.__sfDoc ??= Math.random().toString(36).slice(2));
const byId = (id) => document.querySelector(`[data-sf-id="${id}"]`);
const tag = (el) => {
  if (!el.dataset.sfId || !el.dataset.sfId.startsWith(doc + ':')) {
    window.__sfNext = (window.__sfNext || 0) + 1;
    el.dataset.sfId = `${doc}:${window.__sfNext}`;
  }
  return el.dataset.sfId;
};
const visible = (el) => {
  const style = getComputedStyle(el);
  if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
};
"#;

impl ChromiumPage {
    /// Wrap a tab and start following its network traffic.
    pub async fn attach(page: chromiumoxide::Page) -> PageResult<Self> {
        let protocol = |e: chromiumoxide::error::CdpError| PageError::Protocol(e.to_string());
        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(protocol)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(protocol)?;

        let traffic = Arc::new(Mutex::new(Traffic {
            in_flight: HashSet::new(),
            last_change: Instant::now(),
        }));
        let tracked = Arc::clone(&traffic);
        let watcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = sent.next() => lock(&tracked).started(event.request_id.inner()),
                    Some(event) = finished.next() => lock(&tracked).ended(event.request_id.inner()),
                    Some(event) = failed.next() => lock(&tracked).ended(event.request_id.inner()),
                    else => break,
                }
            }
        });

        Ok(Self {
            page,
            traffic,
            watcher,
        })
    }

    /// Run `body` with `args` bound as a constant. The body must return a
    /// `{detached, error, value}` object.
    async fn run<T: DeserializeOwned>(&self, body: &str, args: Value) -> PageResult<T> {
        let script = format!("(() => {{ {PRELUDE}\nconst args = {args};\n{body} }})()");
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?;
        let reply: Reply<T> = result
            .into_value()
            .map_err(|e| PageError::Script(format!("unexpected script result: {e}")))?;

        if reply.detached {
            return Err(PageError::Detached);
        }
        if let Some(error) = reply.error {
            if let Some(selector) = args.get("css").and_then(Value::as_str)
                && error.contains("is not a valid selector")
            {
                return Err(PageError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: error,
                });
            }
            return Err(PageError::Script(error));
        }
        reply
            .value
            .ok_or_else(|| PageError::Script("script returned no value".to_string()))
    }

    /// Run a script against one tagged element, exposed to `body` as `el`.
    async fn on_element<T: DeserializeOwned>(
        &self,
        element: &ElementId,
        body: &str,
        mut args: Value,
    ) -> PageResult<T> {
        args["id"] = Value::String(element.0.clone());
        let wrapped = format!(
            "const el = byId(args.id);\nif (!el) return {{ detached: true }};\ntry {{ {body} }} catch (e) {{ return {{ error: String(e) }}; }}"
        );
        self.run(&wrapped, args).await
    }

    async fn select(&self, scope: Option<&ElementId>, css: &str) -> PageResult<Vec<ElementId>> {
        let body = r#"
let root = document;
if (args.id) {
  root = byId(args.id);
  if (!root) return { detached: true };
}
try {
  return { value: Array.from(root.querySelectorAll(args.css)).map(tag) };
} catch (e) {
  return { error: String(e) };
}"#;
        let args = json!({ "css": css, "id": scope.map(|s| s.0.clone()) });
        let ids: Vec<String> = self.run(body, args).await?;
        Ok(ids.into_iter().map(ElementId).collect())
    }

    async fn ready_state(&self) -> PageResult<String> {
        self.run("return { value: document.readyState };", json!({})).await
    }
}

#[async_trait]
impl Page for ChromiumPage {
    type Element = ElementId;

    async fn goto(&self, url: &str, timeout: Duration) -> PageResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PageError::Protocol(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(PageError::Timeout {
                what: format!("navigation to {url}"),
                after: timeout,
            }),
        }
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> PageResult<()> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let quiet = lock(&self.traffic).quiet_for();
            if quiet.is_some_and(|q| q >= IDLE_WINDOW) && self.ready_state().await? == "complete" {
                debug!("Network idle");
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }

        let busy = lock(&self.traffic).in_flight.len();
        debug!("{} request(s) still in flight", busy);

        Err(PageError::Timeout {
            what: "network idle".to_string(),
            after: timeout,
        })
    }

    async fn wait_for_dom_ready(&self, timeout: Duration) -> PageResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.ready_state().await?;
            if state == "interactive" || state == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    what: "DOM ready".to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn query_all(&self, css: &str) -> PageResult<Vec<ElementId>> {
        self.select(None, css).await
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> PageResult<Vec<ElementId>> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.select(None, css).await?;
            if !found.is_empty() || Instant::now() >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn query_within(&self, scope: &ElementId, css: &str) -> PageResult<Vec<ElementId>> {
        self.select(Some(scope), css).await
    }

    async fn inner_text(&self, element: &ElementId) -> PageResult<String> {
        let raw: String = self
            .on_element(
                element,
                "return { value: el.innerText ?? el.textContent ?? '' };",
                json!({}),
            )
            .await?;
        Ok(normalize_text(&raw))
    }

    async fn attribute(&self, element: &ElementId, name: &str) -> PageResult<Option<String>> {
        let reply: Value = self
            .on_element(
                element,
                "return { value: { attr: el.getAttribute(args.name) } };",
                json!({ "name": name }),
            )
            .await?;
        Ok(reply
            .get("attr")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn is_visible(&self, element: &ElementId) -> PageResult<bool> {
        self.on_element(element, "return { value: visible(el) };", json!({}))
            .await
    }

    async fn is_attached(&self, element: &ElementId) -> PageResult<bool> {
        match self
            .on_element::<bool>(element, "return { value: el.isConnected };", json!({}))
            .await
        {
            Ok(attached) => Ok(attached),
            Err(PageError::Detached) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn scroll_into_view(&self, element: &ElementId) -> PageResult<()> {
        self.on_element::<bool>(
            element,
            "el.scrollIntoView({ block: 'center', inline: 'center' }); return { value: true };",
            json!({}),
        )
        .await
        .map(drop)
    }

    async fn force_click(&self, element: &ElementId) -> PageResult<()> {
        self.on_element::<bool>(element, "el.click(); return { value: true };", json!({}))
            .await
            .map(drop)
    }

    async fn fill(&self, element: &ElementId, value: &str) -> PageResult<()> {
        let body = r#"
el.focus();
const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
if (setter) { setter.call(el, args.value); } else { el.value = args.value; }
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return { value: true };"#;
        self.on_element::<bool>(element, body, json!({ "value": value }))
            .await
            .map(drop)
    }

    async fn force_hide(&self, element: &ElementId) -> PageResult<()> {
        self.on_element::<bool>(
            element,
            "el.style.setProperty('display', 'none', 'important'); return { value: true };",
            json!({}),
        )
        .await
        .map(drop)
    }

    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn arm_response(&self, url_fragment: &str) -> PageResult<()> {
        let body = r#"
window.__sfCaptured = null;
window.__sfWanted = args.fragment;
if (!window.__sfHooked) {
  window.__sfHooked = true;
  const keep = (url, text) => {
    if (window.__sfCaptured !== null || !window.__sfWanted || !String(url).includes(window.__sfWanted)) return;
    try { window.__sfCaptured = JSON.parse(text); } catch (_) {}
  };
  const origFetch = window.fetch;
  window.fetch = async (...params) => {
    const response = await origFetch(...params);
    const url = response.url || String(params[0]);
    response.clone().text().then((text) => keep(url, text)).catch(() => {});
    return response;
  };
  const origOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url, ...rest) {
    this.addEventListener('load', () => keep(url, this.responseText));
    return origOpen.call(this, method, url, ...rest);
  };
}
return { value: true };"#;
        self.run::<bool>(body, json!({ "fragment": url_fragment }))
            .await
            .map(drop)
    }

    async fn await_response(&self, timeout: Duration) -> PageResult<Option<Value>> {
        let deadline = Instant::now() + timeout;
        loop {
            let captured: Value = self
                .run(
                    "return { value: { body: window.__sfCaptured ?? null } };",
                    json!({}),
                )
                .await?;
            if let Some(body) = captured.get("body").filter(|b| !b.is_null()) {
                return Ok(Some(body.clone()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

fn lock(traffic: &Mutex<Traffic>) -> MutexGuard<'_, Traffic> {
    match traffic.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
