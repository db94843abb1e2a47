//! Chrome-backed page access

#[cfg(test)]
pub mod fixture;

use std::ffi::OsStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::BrowserOptions;
use crate::traits::{ElementHandle, ElementQuery};

const LAUNCH_ARGS: [&str; 3] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-features=VizDisplayCompositor",
    "--lang=en-US",
];

/// One browser with a single tab, driven by one scraping loop at a time.
pub struct ChromeSession {
    // Dropping the browser kills the process, so it lives as long as the tab
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub fn launch(options: &BrowserOptions) -> Result<Self> {
        let launch = LaunchOptionsBuilder::default()
            .headless(options.headless)
            .window_size(Some(options.window_size))
            .user_data_dir(options.profile_dir.clone())
            .idle_browser_timeout(options.idle_timeout)
            .args(LAUNCH_ARGS.into_iter().map(OsStr::new).collect())
            .build()
            .context("Invalid Chrome launch options")?;

        let browser = Browser::new(launch).context("Failed to start browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        info!(headless = options.headless, "browser started");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Runs a blocking CDP call off the async workers.
    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || call(tab.as_ref()))
            .await
            .context("browser call panicked")?
    }

    /// Evaluates `body` as a function body and returns its result as JSON.
    async fn eval(&self, body: String) -> Result<Value> {
        self.blocking(move |tab| {
            let remote = tab.evaluate(&wrap_script(&body), false)?;
            let Some(Value::String(payload)) = remote.value else {
                return Err(anyhow!("script returned no payload"));
            };
            unwrap_payload(&payload)
        })
        .await
    }
}

/// Wraps a script body so its outcome comes back as one JSON string:
/// `{"ok": value}` or `{"err": message}`.
fn wrap_script(body: &str) -> String {
    format!(
        "(() => {{ try {{ const v = (() => {{ {body} }})(); \
         return JSON.stringify({{ ok: v === undefined ? null : v }}); }} \
         catch (e) {{ return JSON.stringify({{ err: String(e) }}); }} }})()"
    )
}

fn unwrap_payload(payload: &str) -> Result<Value> {
    let mut parsed: Value = serde_json::from_str(payload).context("Malformed script payload")?;
    if let Some(message) = parsed.get("err").and_then(Value::as_str) {
        return Err(anyhow!("script error: {message}"));
    }
    Ok(parsed.get_mut("ok").map(Value::take).unwrap_or(Value::Null))
}

/// Script expression resolving `handle` to a node, or `null`.
fn locate(handle: &ElementHandle) -> Result<String> {
    let steps = serde_json::to_string(handle.steps())?;
    Ok(format!(
        "(() => {{ let el = document; \
         for (const [sel, idx] of {steps}) {{ \
         if (!el) return null; el = el.querySelectorAll(sel)[idx] || null; }} \
         return el; }})()"
    ))
}

fn detached(handle: &ElementHandle) -> anyhow::Error {
    anyhow!("element is no longer attached: {:?}", handle.steps())
}

#[async_trait]
impl ElementQuery for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)
                .with_context(|| format!("Failed to navigate to {url}"))?
                .wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        self.eval(script.to_string()).await
    }

    async fn count(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<usize> {
        let selector = serde_json::to_string(selector)?;
        let root = match scope {
            Some(handle) => locate(handle)?,
            None => "document".to_string(),
        };
        let value = self
            .eval(format!(
                "const root = {root}; return root ? root.querySelectorAll({selector}).length : -1;"
            ))
            .await?;
        match value.as_i64() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(scope.map_or_else(|| anyhow!("bad count result {value}"), detached)),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .eval(format!(
                "const el = {}; return el ? (el.innerText ?? el.textContent ?? '') : null;",
                locate(element)?
            ))
            .await?;
        match value {
            Value::String(text) => Ok(text.trim().to_string()),
            _ => Err(detached(element)),
        }
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let name = serde_json::to_string(name)?;
        let value = self
            .eval(format!(
                "const el = {}; if (!el) return {{ detached: true }}; \
                 const n = {name}; \
                 if (n in el && typeof el[n] === 'string') return {{ value: el[n] }}; \
                 return {{ value: el.getAttribute(n) }};",
                locate(element)?
            ))
            .await?;
        if value.get("detached").is_some() {
            return Err(detached(element));
        }
        Ok(value.get("value").and_then(Value::as_str).map(String::from))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let clicked = self
            .eval(format!(
                "const el = {}; if (!el) return false; el.click(); return true;",
                locate(element)?
            ))
            .await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(detached(element))
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn page_source(&self) -> Result<String> {
        self.blocking(|tab| tab.get_content()).await
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.eval(format!("window.scrollBy(0, {dy});")).await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        debug!("reloading page");
        self.blocking(|tab| {
            tab.reload(false, None)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn go_back(&self) -> Result<()> {
        self.eval("history.back();".to_string()).await?;
        self.blocking(|tab| {
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }
}
