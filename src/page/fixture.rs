//! In-memory [`Page`] over static HTML, for exercising the engine without a browser.
//!
//! Clicks and fills can be wired to swap the document, which is how the
//! fixtures model dropdowns opening, search narrowing and result pages.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{Page, PageResult, normalize_text};
use crate::error::PageError;

type Rewrite = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixtureElement {
    generation: u64,
    ordinal: usize,
}

enum Trigger {
    Click { css: String, text: Option<String> },
    Fill { css: String },
}

enum Effect {
    Swap(String),
    Rewrite(Rewrite),
    Respond(serde_json::Value),
}

struct Rule {
    trigger: Trigger,
    effect: Effect,
}

struct State {
    url: String,
    html: String,
    generation: u64,
    hidden: HashSet<usize>,
    queries: usize,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    armed: Option<String>,
    pending_response: Option<serde_json::Value>,
    failing_clicks: u32,
    network_busy: bool,
    dom_stalled: bool,
}

pub struct FixturePage {
    state: Mutex<State>,
    rules: Vec<Rule>,
}

impl FixturePage {
    pub fn new(url: &str, html: &str) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                html: html.to_string(),
                generation: 0,
                hidden: HashSet::new(),
                queries: 0,
                clicks: Vec::new(),
                fills: Vec::new(),
                armed: None,
                pending_response: None,
                failing_clicks: 0,
                network_busy: false,
                dom_stalled: false,
            }),
            rules: Vec::new(),
        }
    }

    /// Clicking any element matching `css` replaces the document with `html`.
    pub fn on_click(mut self, css: &str, html: &str) -> Self {
        self.rules.push(Rule {
            trigger: Trigger::Click {
                css: css.to_string(),
                text: None,
            },
            effect: Effect::Swap(html.to_string()),
        });
        self
    }

    /// Like [`FixturePage::on_click`], restricted to elements whose text contains `text`.
    pub fn on_click_text(mut self, css: &str, text: &str, html: &str) -> Self {
        self.rules.push(Rule {
            trigger: Trigger::Click {
                css: css.to_string(),
                text: Some(text.to_lowercase()),
            },
            effect: Effect::Swap(html.to_string()),
        });
        self
    }

    /// Clicking a matching element queues `body` for the armed response listener.
    pub fn on_click_respond(mut self, css: &str, text: &str, body: serde_json::Value) -> Self {
        self.rules.push(Rule {
            trigger: Trigger::Click {
                css: css.to_string(),
                text: Some(text.to_lowercase()),
            },
            effect: Effect::Respond(body),
        });
        self
    }

    /// Filling a matching input rewrites the document from the typed value.
    pub fn on_fill(mut self, css: &str, rewrite: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.rules.push(Rule {
            trigger: Trigger::Fill {
                css: css.to_string(),
            },
            effect: Effect::Rewrite(Arc::new(rewrite)),
        });
        self
    }

    /// The next `count` clicks fail as if intercepted.
    pub fn failing_clicks(self, count: u32) -> Self {
        self.lock().failing_clicks = count;
        self
    }

    /// Network idle is never reached; every wait for it times out.
    pub fn network_never_idle(self) -> Self {
        self.lock().network_busy = true;
        self
    }

    /// The document never reports ready; every wait for it times out.
    pub fn dom_never_ready(self) -> Self {
        self.lock().dom_stalled = true;
        self
    }

    /// Last URL passed to `goto`, or the construction URL.
    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    /// Number of selector queries issued so far.
    pub fn queries(&self) -> usize {
        self.lock().queries
    }

    /// Text of every successfully clicked element, in order.
    pub fn clicked(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.lock().fills.clone()
    }

    pub fn hidden_count(&self) -> usize {
        self.lock().hidden.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn query(&self, scope: Option<&FixtureElement>, css: &str) -> PageResult<Vec<FixtureElement>> {
        let selector = parse(css)?;
        let mut state = self.lock();
        state.queries += 1;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let matches: Vec<ElementRef<'_>> = match scope {
            Some(scope) => {
                let root = resolve(&all, state.generation, scope)?;
                root.select(&selector)
                    .filter(|m| m.id() != root.id())
                    .collect()
            }
            None => doc.select(&selector).collect(),
        };
        Ok(matches
            .iter()
            .filter_map(|m| all.iter().position(|e| e.id() == m.id()))
            .map(|ordinal| FixtureElement {
                generation: state.generation,
                ordinal,
            })
            .collect())
    }

    fn inspect<T>(
        &self,
        element: &FixtureElement,
        f: impl FnOnce(ElementRef<'_>, &State) -> T,
    ) -> PageResult<T> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let el = resolve(&all, state.generation, element)?;
        Ok(f(el, &*state))
    }

    fn fire(&self, element: &FixtureElement, is_click: bool, value: &str) -> PageResult<()> {
        let mut state = self.lock();
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let el = resolve(&all, state.generation, element)?;
        let text = normalize_text(&el.text().collect::<String>());

        let mut swap = None;
        let mut response = None;
        for rule in &self.rules {
            let hit = match (&rule.trigger, is_click) {
                (Trigger::Click { css, text: wanted }, true) => {
                    matches_css(&doc, css, el)?
                        && wanted
                            .as_ref()
                            .is_none_or(|w| text.to_lowercase().contains(w))
                }
                (Trigger::Fill { css }, false) => matches_css(&doc, css, el)?,
                _ => false,
            };
            if !hit {
                continue;
            }
            match &rule.effect {
                Effect::Swap(html) if swap.is_none() => swap = Some(html.clone()),
                Effect::Rewrite(rewrite) if swap.is_none() => swap = Some(rewrite(value)),
                Effect::Respond(body) if response.is_none() => response = Some(body.clone()),
                _ => {}
            }
        }

        if is_click {
            state.clicks.push(text);
        } else {
            state.fills.push((text, value.to_string()));
        }
        if let Some(body) = response
            && state.armed.is_some()
        {
            state.pending_response = Some(body);
        }
        if let Some(html) = swap {
            state.html = html;
            state.generation += 1;
            state.hidden.clear();
        }
        Ok(())
    }
}

fn parse(css: &str) -> PageResult<Selector> {
    Selector::parse(css).map_err(|e| PageError::InvalidSelector {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

fn resolve<'a>(
    all: &[ElementRef<'a>],
    generation: u64,
    element: &FixtureElement,
) -> PageResult<ElementRef<'a>> {
    if element.generation != generation {
        return Err(PageError::Detached);
    }
    all.get(element.ordinal).copied().ok_or(PageError::Detached)
}

fn matches_css(doc: &Html, css: &str, el: ElementRef<'_>) -> PageResult<bool> {
    let selector = parse(css)?;
    Ok(doc.select(&selector).any(|m| m.id() == el.id()))
}

fn hidden_by_markup(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    value
        .attr("style")
        .is_some_and(|s| s.replace(' ', "").contains("display:none"))
}

#[async_trait]
impl Page for FixturePage {
    type Element = FixtureElement;

    async fn goto(&self, url: &str, _timeout: Duration) -> PageResult<()> {
        self.lock().url = url.to_string();
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> PageResult<()> {
        if self.lock().network_busy {
            return Err(PageError::Timeout {
                what: "network idle".to_string(),
                after: timeout,
            });
        }
        Ok(())
    }

    async fn wait_for_dom_ready(&self, timeout: Duration) -> PageResult<()> {
        if self.lock().dom_stalled {
            return Err(PageError::Timeout {
                what: "DOM ready".to_string(),
                after: timeout,
            });
        }
        Ok(())
    }

    async fn query_all(&self, css: &str) -> PageResult<Vec<FixtureElement>> {
        self.query(None, css)
    }

    async fn wait_for_selector(
        &self,
        css: &str,
        _timeout: Duration,
    ) -> PageResult<Vec<FixtureElement>> {
        self.query(None, css)
    }

    async fn query_within(
        &self,
        scope: &FixtureElement,
        css: &str,
    ) -> PageResult<Vec<FixtureElement>> {
        self.query(Some(scope), css)
    }

    async fn inner_text(&self, element: &FixtureElement) -> PageResult<String> {
        self.inspect(element, |el, _| normalize_text(&el.text().collect::<String>()))
    }

    async fn attribute(&self, element: &FixtureElement, name: &str) -> PageResult<Option<String>> {
        self.inspect(element, |el, _| el.value().attr(name).map(str::to_string))
    }

    async fn is_visible(&self, element: &FixtureElement) -> PageResult<bool> {
        let ordinal = element.ordinal;
        self.inspect(element, |el, state| {
            if state.hidden.contains(&ordinal) || hidden_by_markup(el) {
                return false;
            }
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(hidden_by_markup)
        })
    }

    async fn is_attached(&self, element: &FixtureElement) -> PageResult<bool> {
        let state = self.lock();
        Ok(element.generation == state.generation)
    }

    async fn scroll_into_view(&self, element: &FixtureElement) -> PageResult<()> {
        self.inspect(element, |_, _| ())
    }

    async fn force_click(&self, element: &FixtureElement) -> PageResult<()> {
        {
            let mut state = self.lock();
            if state.failing_clicks > 0 {
                state.failing_clicks -= 1;
                return Err(PageError::Protocol("click intercepted".to_string()));
            }
        }
        self.fire(element, true, "")
    }

    async fn fill(&self, element: &FixtureElement, value: &str) -> PageResult<()> {
        self.fire(element, false, value)
    }

    async fn force_hide(&self, element: &FixtureElement) -> PageResult<()> {
        let mut state = self.lock();
        if element.generation != state.generation {
            return Err(PageError::Detached);
        }
        state.hidden.insert(element.ordinal);
        Ok(())
    }

    async fn pause(&self, _duration: Duration) {}

    async fn arm_response(&self, url_fragment: &str) -> PageResult<()> {
        let mut state = self.lock();
        state.armed = Some(url_fragment.to_string());
        state.pending_response = None;
        Ok(())
    }

    async fn await_response(&self, _timeout: Duration) -> PageResult<Option<serde_json::Value>> {
        let mut state = self.lock();
        state.armed = None;
        Ok(state.pending_response.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><body>
          <button class="open">Open</button>
          <ul class="menu" hidden><li>One</li></ul>
          <div style="display: none"><span class="ghost">Ghost</span></div>
        </body></html>"#;

    #[tokio::test]
    async fn click_rules_swap_the_document_and_detach_old_handles() {
        let page = FixturePage::new("https://example.test", HTML)
            .on_click("button.open", "<html><body><ul class='menu'><li>One</li></ul></body></html>");

        let button = page.query_all("button.open").await.unwrap().remove(0);
        let hidden_item = page.query_all("ul.menu li").await.unwrap().remove(0);
        assert!(!page.is_visible(&hidden_item).await.unwrap());

        page.force_click(&button).await.unwrap();
        assert!(!page.is_attached(&button).await.unwrap());

        let item = page.query_all("ul.menu li").await.unwrap().remove(0);
        assert!(page.is_visible(&item).await.unwrap());
        assert_eq!(page.clicked(), vec!["Open".to_string()]);
    }

    #[tokio::test]
    async fn inline_display_none_hides_descendants() {
        let page = FixturePage::new("https://example.test", HTML);
        let ghost = page.query_all(".ghost").await.unwrap().remove(0);
        assert!(!page.is_visible(&ghost).await.unwrap());
    }

    #[tokio::test]
    async fn force_hide_only_affects_the_current_document() {
        let page = FixturePage::new("https://example.test", HTML);
        let button = page.query_all("button.open").await.unwrap().remove(0);
        page.force_hide(&button).await.unwrap();
        assert!(!page.is_visible(&button).await.unwrap());
        assert_eq!(page.hidden_count(), 1);
    }
}
