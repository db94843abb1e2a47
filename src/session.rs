use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::platform::PlatformTag;
use crate::traits::{ElementQuery, PlatformScraper, StopReason, TickOutcome};

/// How a session came to an end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped(StopReason),
    /// Interrupted from outside (Ctrl-C)
    Interrupted,
    /// A tick failed in a way the loop cannot recover from
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub platform: PlatformTag,
    pub ticks: usize,
    pub end: SessionEnd,
    pub written: usize,
    pub retained: usize,
}

impl SessionReport {
    pub fn log(&self) {
        match &self.end {
            SessionEnd::Stopped(reason) => info!(
                platform = %self.platform,
                ticks = self.ticks,
                written = self.written,
                "session stopped: {reason:?}"
            ),
            SessionEnd::Interrupted => warn!(
                platform = %self.platform,
                ticks = self.ticks,
                written = self.written,
                "session interrupted, data saved"
            ),
            SessionEnd::Fatal(cause) => error!(
                platform = %self.platform,
                ticks = self.ticks,
                written = self.written,
                "session failed: {cause}"
            ),
        }
        if self.retained > 0 {
            error!(retained = self.retained, "records could not be written");
        }
    }
}

/// Polls `scraper` until it stops, fails or `interrupt` resolves, then runs
/// its final flush exactly once.
pub async fn run_session(
    scraper: &mut dyn PlatformScraper,
    page: &dyn ElementQuery,
    interrupt: impl Future<Output = ()>,
) -> SessionReport {
    let platform = scraper.platform();
    info!(%platform, "session started");
    tokio::pin!(interrupt);

    let mut ticks = 0;
    let end = loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut interrupt => break SessionEnd::Interrupted,
            outcome = scraper.poll_tick(page) => outcome,
        };
        ticks += 1;

        match outcome {
            Ok(TickOutcome::Stop(reason)) => break SessionEnd::Stopped(reason),
            Ok(outcome) if scraper.is_terminal(&outcome) => break SessionEnd::Stopped(StopReason::Completed),
            Ok(TickOutcome::Skipped(reason)) => warn!(tick = ticks, "tick skipped: {reason:?}"),
            Ok(outcome) => debug!(tick = ticks, "{outcome:?}"),
            Err(e) => break SessionEnd::Fatal(format!("{e:#}")),
        }
    };

    let summary = scraper.finish();
    SessionReport {
        platform,
        ticks,
        end,
        written: summary.written,
        retained: summary.retained,
    }
}
