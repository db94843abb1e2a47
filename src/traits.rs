//! Traits and interfaces the scraping loops are written against

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::platform::PlatformTag;

/// Locator for one element of the live page.
///
/// A handle is a path of `(css selector, index)` steps: each step picks the
/// `index`-th match of `selector` below the element found by the previous
/// step. It is re-resolved on every read, so a handle never points at a
/// recycled node; if the page changed underneath it the read simply fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementHandle {
    steps: Vec<(String, usize)>,
}

impl ElementHandle {
    pub fn root(selector: &str, index: usize) -> Self {
        Self {
            steps: vec![(selector.to_string(), index)],
        }
    }

    /// The `index`-th match of `selector` below this element
    pub fn child(&self, selector: &str, index: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push((selector.to_string(), index));
        Self { steps }
    }

    pub fn steps(&self) -> &[(String, usize)] {
        &self.steps
    }
}

/// Read and drive access to the browser page.
///
/// `Ok(None)` / an empty list means "no such element"; `Err` is any other
/// failure (detached node, dead connection, script error).
#[async_trait]
pub trait ElementQuery: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Runs a script body (which may `return` a value) and hands back its
    /// JSON-serialisable result, `Null` when it returns nothing.
    async fn execute_script(&self, script: &str) -> Result<serde_json::Value>;

    /// Number of matches of `selector` below `scope` (the whole document when `None`)
    async fn count(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<usize>;

    /// Rendered text of the element
    async fn text(&self, element: &ElementHandle) -> Result<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn page_source(&self) -> Result<String>;

    async fn scroll_by(&self, dy: i64) -> Result<()>;

    async fn refresh(&self) -> Result<()>;

    async fn go_back(&self) -> Result<()>;

    async fn find(&self, selector: &str) -> Result<Option<ElementHandle>> {
        let found = self.count(None, selector).await? > 0;
        Ok(found.then(|| ElementHandle::root(selector, 0)))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let n = self.count(None, selector).await?;
        Ok((0..n).map(|i| ElementHandle::root(selector, i)).collect())
    }

    async fn find_in(&self, parent: &ElementHandle, selector: &str) -> Result<Option<ElementHandle>> {
        let found = self.count(Some(parent), selector).await? > 0;
        Ok(found.then(|| parent.child(selector, 0)))
    }

    async fn find_all_in(&self, parent: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        let n = self.count(Some(parent), selector).await?;
        Ok((0..n).map(|i| parent.child(selector, i)).collect())
    }
}

/// Channel used to wait for a human (captcha, login walls) and to ask
/// whether a session should go on.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Shows `prompt` and blocks until the human confirms
    async fn acknowledge(&self, prompt: &str) -> Result<()>;

    /// Shows `prompt` and returns the answer as typed
    async fn ask(&self, prompt: &str) -> Result<String>;
}

/// Why a tick was dropped without persisting anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Username and message lists had different lengths
    Misaligned { usernames: usize, comments: usize },
    /// More entries than the per-tick guard allows
    Oversized { usernames: usize, comments: usize },
}

/// Why a loop decided to stop on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Single-pass scrape finished
    Completed,
    /// The human asked to stop
    UserExit,
    /// The content went offline or is unavailable
    Unavailable,
}

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A snapshot was taken; `complete` reports whether mandatory fields were filled
    Snapshot { complete: bool },
    /// Chat rows were read; `admitted` of them were new
    Persisted { read: usize, admitted: usize },
    Skipped(SkipReason),
    /// Nothing to read, the page was reloaded
    Refreshed,
    Stop(StopReason),
}

/// One platform's scraping loop, driven tick by tick by the session runner.
#[async_trait]
pub trait PlatformScraper: Send + Sync {
    fn platform(&self) -> PlatformTag;

    async fn poll_tick(&mut self, page: &dyn ElementQuery) -> Result<TickOutcome>;

    fn is_terminal(&self, outcome: &TickOutcome) -> bool {
        matches!(outcome, TickOutcome::Stop(_))
    }

    /// Final flush of whatever the loop still holds. Called exactly once,
    /// whichever way the session ended.
    fn finish(&mut self) -> FinishSummary;
}

/// What the final flush left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinishSummary {
    /// Records written over the whole session
    pub written: usize,
    /// Records still in memory because the last flush failed
    pub retained: usize,
}
