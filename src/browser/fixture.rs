//! Static HTML page standing in for the browser in tests

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};

use crate::traits::{ElementHandle, ElementQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    Script(String),
    Click(Vec<(String, usize)>),
    Scroll(i64),
    Refresh,
    Back,
}

struct PageState {
    html: String,
    url: String,
    actions: Vec<Action>,
    failing: HashSet<String>,
    heights: VecDeque<u64>,
    last_height: u64,
    after_back: Option<String>,
    after_refresh: Option<String>,
    after_script: Option<(String, String)>,
}

/// `ElementQuery` over an HTML string. The markup is re-parsed on every read
/// so tests can swap it between calls.
pub struct HtmlPage {
    state: Mutex<PageState>,
}

impl HtmlPage {
    pub fn new(html: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                html: html.to_string(),
                url: "about:blank".to_string(),
                actions: Vec::new(),
                failing: HashSet::new(),
                heights: VecDeque::new(),
                last_height: 0,
                after_back: None,
                after_refresh: None,
                after_script: None,
            }),
        }
    }

    pub fn with_url(self, url: &str) -> Self {
        self.lock().url = url.to_string();
        self
    }

    /// Any read touching `selector` fails as if the node went stale
    pub fn failing(self, selector: &str) -> Self {
        self.lock().failing.insert(selector.to_string());
        self
    }

    /// Page heights handed out by successive height probes; the last one repeats
    pub fn with_heights(self, heights: &[u64]) -> Self {
        self.lock().heights = heights.iter().copied().collect();
        self
    }

    pub fn set_html(&self, html: &str) {
        self.lock().html = html.to_string();
    }

    pub fn on_back(&self, html: &str) {
        self.lock().after_back = Some(html.to_string());
    }

    pub fn on_refresh(&self, html: &str) {
        self.lock().after_refresh = Some(html.to_string());
    }

    /// Swaps in `html` the first time a script containing `needle` runs
    pub fn on_script(&self, needle: &str, html: &str) {
        self.lock().after_script = Some((needle.to_string(), html.to_string()));
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Script(script) => Some(script),
                _ => None,
            })
            .collect()
    }

    pub fn count_of(&self, wanted: &Action) -> usize {
        self.lock().actions.iter().filter(|a| *a == wanted).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    fn record(&self, action: Action) {
        self.lock().actions.push(action);
    }

    fn check(&self, selector: &str) -> Result<()> {
        if self.lock().failing.contains(selector) {
            return Err(anyhow!("stale element reference: {selector}"));
        }
        Ok(())
    }

    /// Parses the current markup and runs `read` on it
    fn with_document<R>(&self, read: impl FnOnce(&Html) -> Result<R>) -> Result<R> {
        let html = self.lock().html.clone();
        let document = Html::parse_document(&html);
        read(&document)
    }

    fn check_steps(&self, handle: &ElementHandle) -> Result<()> {
        for (selector, _) in handle.steps() {
            self.check(selector)?;
        }
        Ok(())
    }
}

fn parse(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector}: {e:?}"))
}

fn resolve<'a>(document: &'a Html, handle: &ElementHandle) -> Result<Option<ElementRef<'a>>> {
    let mut current: Option<ElementRef<'a>> = None;
    for (selector, index) in handle.steps() {
        let selector = parse(selector)?;
        let next = match current {
            None => document.select(&selector).nth(*index),
            Some(element) => element.select(&selector).nth(*index),
        };
        match next {
            Some(element) => current = Some(element),
            None => return Ok(None),
        }
    }
    Ok(current)
}

fn detached(handle: &ElementHandle) -> anyhow::Error {
    anyhow!("element is no longer attached: {:?}", handle.steps())
}

#[async_trait]
impl ElementQuery for HtmlPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.url = url.to_string();
        state.actions.push(Action::Navigate(url.to_string()));
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        let mut state = self.lock();
        state.actions.push(Action::Script(script.to_string()));

        let swap = matches!(&state.after_script, Some((needle, _)) if script.contains(needle.as_str()));
        if swap && let Some((_, html)) = state.after_script.take() {
            state.html = html;
        }

        if script.contains("pageHeight") {
            if let Some(height) = state.heights.pop_front() {
                state.last_height = height;
            }
            return Ok(json!({ "pageHeight": state.last_height }));
        }
        Ok(Value::Null)
    }

    async fn count(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<usize> {
        self.check(selector)?;
        if let Some(handle) = scope {
            self.check_steps(handle)?;
        }
        let wanted = parse(selector)?;
        self.with_document(|document| match scope {
            None => Ok(document.select(&wanted).count()),
            Some(handle) => {
                let parent = resolve(document, handle)?.ok_or_else(|| detached(handle))?;
                Ok(parent.select(&wanted).count())
            }
        })
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        self.check_steps(element)?;
        self.with_document(|document| {
            let node = resolve(document, element)?.ok_or_else(|| detached(element))?;
            Ok(node.text().collect::<String>().trim().to_string())
        })
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.check_steps(element)?;
        self.with_document(|document| {
            let node = resolve(document, element)?.ok_or_else(|| detached(element))?;
            Ok(node.value().attr(name).map(String::from))
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.check_steps(element)?;
        self.with_document(|document| {
            resolve(document, element)?.ok_or_else(|| detached(element))?;
            Ok(())
        })?;
        self.record(Action::Click(element.steps().to_vec()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.lock().html.clone())
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.record(Action::Scroll(dy));
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::Refresh);
        if let Some(html) = state.after_refresh.take() {
            state.html = html;
        }
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::Back);
        if let Some(html) = state.after_back.take() {
            state.html = html;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="item"><a href="/@ana">ana</a><span class="n">3</span></div>
        <div class="item"><a href="/@bo">bo</a></div>
    "#;

    #[tokio::test]
    async fn handles_resolve_nested_steps() {
        let page = HtmlPage::new(PAGE);
        let items = page.find_all("div.item").await.unwrap();
        assert_eq!(items.len(), 2);

        let link = page.find_in(&items[1], "a").await.unwrap().unwrap();
        assert_eq!(page.text(&link).await.unwrap(), "bo");
        assert_eq!(page.attribute(&link, "href").await.unwrap().as_deref(), Some("/@bo"));
        assert!(page.find_in(&items[1], "span.n").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_selector_errors_instead_of_missing() {
        let page = HtmlPage::new(PAGE).failing("span.n");
        assert!(page.find_all("span.n").await.is_err());
        assert!(page.find("div.item").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn height_probe_repeats_last_value() {
        let page = HtmlPage::new(PAGE).with_heights(&[100, 200]);
        let probe = "return { pageHeight: 1 };";
        assert_eq!(page.execute_script(probe).await.unwrap()["pageHeight"], 100);
        assert_eq!(page.execute_script(probe).await.unwrap()["pageHeight"], 200);
        assert_eq!(page.execute_script(probe).await.unwrap()["pageHeight"], 200);
    }
}
