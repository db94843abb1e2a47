//! # Runtime Configuration
//!
//! Settings come from three places, in this order of precedence:
//!
//! 1. **Command line**: the page URL and where to save results ([`Cli`])
//! 2. **Environment**: tunables read by [`MonitorConfig::from_env`], after
//!    `dotenvy` has loaded an optional `.env` file
//! 3. **Defaults**: everything not set above
//!
//! ## Environment Configuration
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `MONITOR_FLUSH_THRESHOLD` | 1000 | chat rows kept in memory before saving |
//! | `MONITOR_SNAPSHOT_FLUSH_THRESHOLD` | 5 | page snapshots kept before saving |
//! | `MONITOR_CHAT_TICK_LIMIT` | 140 | largest chat read accepted in one tick |
//! | `MONITOR_EXTRACT_CONCURRENCY` | 6 | field extractors running at once |
//! | `MONITOR_PAGE_SETTLE_SECS` | 9 | wait after opening the page |
//! | `MONITOR_BROWSER_IDLE_SECS` | 86400 | browser connection idle timeout |
//! | `MONITOR_WINDOW_WIDTH` / `_HEIGHT` | 1280 / 800 | browser window size |
//! | `MONITOR_LOG_FORMAT` | text | `json` for JSON log lines |
//!
//! `RUST_LOG` controls log filtering (default `engagement_monitor=info`).
//!
//! The idle timeout is large on purpose: a session can sit on a captcha or
//! login prompt for as long as the person at the keyboard needs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::pacing::Pacing;

/// Scrape engagement data from a video, live channel or short clip page
#[derive(Debug, Parser)]
#[command(name = "engagement-monitor", version)]
pub struct Cli {
    /// Page to scrape
    pub url: String,

    /// Folder the results are written to
    #[arg(long, default_value = "out")]
    pub folder: PathBuf,

    /// File name inside the folder (defaults to youtube.json, twitch.csv or tiktok.json)
    #[arg(long)]
    pub file: Option<String>,

    /// Browser profile directory to reuse (keeps logins between runs)
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrowserOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub profile_dir: Option<PathBuf>,
    pub idle_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            window_size: (1280, 800),
            profile_dir: None,
            idle_timeout: Duration::from_secs(86_400),
        }
    }
}

/// Tunables shared by every scraping loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Chat rows buffered before a CSV flush
    pub flush_threshold: usize,
    /// Snapshots buffered before a JSON flush
    pub snapshot_flush_threshold: usize,
    /// Largest username/message count accepted from one chat read
    pub chat_tick_limit: usize,
    pub extract_concurrency: usize,
    /// Wait after the first navigation
    pub page_settle: Duration,
    pub browser: BrowserOptions,
    pub pacing: Pacing,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 1000,
            snapshot_flush_threshold: 5,
            chat_tick_limit: 140,
            extract_concurrency: 6,
            page_settle: Duration::from_secs(9),
            browser: BrowserOptions::default(),
            pacing: Pacing::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; unset names keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let width = parse_or(&lookup, "MONITOR_WINDOW_WIDTH", defaults.browser.window_size.0)?;
        let height = parse_or(&lookup, "MONITOR_WINDOW_HEIGHT", defaults.browser.window_size.1)?;
        let idle = parse_or(&lookup, "MONITOR_BROWSER_IDLE_SECS", defaults.browser.idle_timeout.as_secs())?;

        Ok(Self {
            flush_threshold: parse_or(&lookup, "MONITOR_FLUSH_THRESHOLD", defaults.flush_threshold)?,
            snapshot_flush_threshold: parse_or(
                &lookup,
                "MONITOR_SNAPSHOT_FLUSH_THRESHOLD",
                defaults.snapshot_flush_threshold,
            )?,
            chat_tick_limit: parse_or(&lookup, "MONITOR_CHAT_TICK_LIMIT", defaults.chat_tick_limit)?,
            extract_concurrency: parse_or(
                &lookup,
                "MONITOR_EXTRACT_CONCURRENCY",
                defaults.extract_concurrency,
            )?,
            page_settle: Duration::from_secs(parse_or(
                &lookup,
                "MONITOR_PAGE_SETTLE_SECS",
                defaults.page_settle.as_secs(),
            )?),
            browser: BrowserOptions {
                window_size: (width, height),
                idle_timeout: Duration::from_secs(idle),
                ..defaults.browser
            },
            pacing: defaults.pacing,
        })
    }

    /// Applies the browser flags given on the command line.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        self.browser.headless = cli.headless;
        self.browser.profile_dir.clone_from(&cli.profile);
        self
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(default),
    }
}

pub fn logs_are_json() -> bool {
    matches!(std::env::var("MONITOR_LOG_FORMAT").as_deref(), Ok("json"))
}

/// Initializes logging from `RUST_LOG` and `MONITOR_LOG_FORMAT`, writing to stderr.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("engagement_monitor=info"));
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    if logs_are_json() {
        let _ = registry.with(fmt_layer.json().flatten_event(true)).try_init();
    } else {
        let _ = registry.with(fmt_layer.compact()).try_init();
    }
}
