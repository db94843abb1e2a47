//! Live chat scraper: polls the chat column and appends new messages to a CSV file

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::dedup::DedupStore;
use crate::extract::{Read, first, settle};
use crate::gate::{GateMarkers, GateState, InteractionGate};
use crate::models::{ChatRow, scrape_timestamp};
use crate::pacing::{self, Pacing};
use crate::platform::PlatformTag;
use crate::sink::{CsvAppendWriter, IncrementalSink};
use crate::traits::{
    ElementQuery, FinishSummary, PlatformScraper, SkipReason, StopReason, TickOutcome,
};

/// CSS selectors for a channel page with its chat
#[derive(Debug, Clone)]
pub struct ChatSelectors {
    pub offline: String,
    pub chat_list: String,
    pub chat_line: String,
    pub author: String,
    pub message: String,
    pub live_time: String,
    pub viewers: String,
}

impl Default for ChatSelectors {
    fn default() -> Self {
        Self {
            offline: "div.channel-status-info--offline".to_string(),
            chat_list: "div.chat-list--default".to_string(),
            chat_line: ".chat-line__message".to_string(),
            author: "span.chat-author__display-name".to_string(),
            message: "span[data-a-target=\"chat-line-message-body\"]".to_string(),
            live_time: "span.live-time".to_string(),
            viewers: "p[data-a-target=\"animated-channel-viewers-count\"]".to_string(),
        }
    }
}

impl ChatSelectors {
    /// Removes every rendered chat line so the next read starts clean
    fn cleanup_script(&self) -> Result<String> {
        let selector = serde_json::to_string(&self.chat_line)?;
        Ok(format!(
            "document.querySelectorAll({selector}).forEach(function (element) {{ element.remove(); }});"
        ))
    }
}

/// One successful read of the chat column
struct ChatRead {
    date_scraping: String,
    time_live: String,
    views: String,
    pairs: Vec<(String, String)>,
}

pub struct LiveChatScraper {
    selectors: ChatSelectors,
    gate: InteractionGate,
    pacing: Pacing,
    tick_limit: usize,
    seen: DedupStore,
    sink: IncrementalSink<ChatRow, CsvAppendWriter<ChatRow>>,
}

impl LiveChatScraper {
    pub fn new(selectors: ChatSelectors, config: &MonitorConfig, writer: CsvAppendWriter<ChatRow>) -> Self {
        let markers = GateMarkers {
            unavailable: Some(selectors.offline.clone()),
            ..GateMarkers::default()
        };
        Self {
            gate: InteractionGate::new(markers, config.pacing.clone()),
            selectors,
            pacing: config.pacing.clone(),
            tick_limit: config.chat_tick_limit,
            seen: DedupStore::new(),
            sink: IncrementalSink::new(writer, config.flush_threshold),
        }
    }

    /// Buffers the pairs whose message was never seen before; returns how many.
    fn admit(&mut self, read: &ChatRead) -> usize {
        let mut admitted = 0;
        for (username, comment) in &read.pairs {
            if self.seen.admit(comment) {
                self.sink.append(ChatRow {
                    date_scraping: read.date_scraping.clone(),
                    time_live: read.time_live.clone(),
                    views: read.views.clone(),
                    username: username.clone(),
                    comment: comment.clone(),
                });
                admitted += 1;
            }
        }
        admitted
    }

    async fn chat_visible(&self, page: &dyn ElementQuery) -> bool {
        match page.find(&self.selectors.chat_list).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                debug!("chat list lookup failed: {e:#}");
                false
            }
        }
    }

    async fn clean_chat(&self, page: &dyn ElementQuery) -> Result<()> {
        page.execute_script(&self.selectors.cleanup_script()?).await?;
        Ok(())
    }
}

/// Usernames and message bodies in page order
fn parse_chat(html: &str, selectors: &ChatSelectors) -> Result<(Vec<String>, Vec<String>)> {
    let author = Selector::parse(&selectors.author)
        .map_err(|e| anyhow!("Failed to parse author selector: {e:?}"))?;
    let message = Selector::parse(&selectors.message)
        .map_err(|e| anyhow!("Failed to parse message selector: {e:?}"))?;

    let document = Html::parse_document(html);
    let text = |el: scraper::ElementRef| el.text().collect::<String>();
    let usernames = document.select(&author).map(text).collect();
    let comments = document.select(&message).map(text).collect();
    Ok((usernames, comments))
}

#[async_trait]
impl PlatformScraper for LiveChatScraper {
    fn platform(&self) -> PlatformTag {
        PlatformTag::LiveChat
    }

    async fn poll_tick(&mut self, page: &dyn ElementQuery) -> Result<TickOutcome> {
        if self.gate.detect(page).await == GateState::Unavailable {
            warn!("Offline channel");
            return Ok(TickOutcome::Stop(StopReason::Unavailable));
        }

        if !self.chat_visible(page).await {
            info!("chat not found, reloading page");
            page.refresh().await?;
            return Ok(TickOutcome::Refreshed);
        }

        pacing::settle(self.pacing.chat_read_settle).await;
        let html = page.page_source().await?;
        let s = &self.selectors;
        let time_live = settle("time_live", "elapsed stream time", first(page, &s.live_time, Read::Text).await);
        let views = settle("views", "current viewer count", first(page, &s.viewers, Read::Text).await);
        let (usernames, comments) = parse_chat(&html, s)?;

        let (n_users, n_comments) = (usernames.len(), comments.len());
        if n_users > self.tick_limit || n_comments > self.tick_limit {
            warn!(
                usernames = n_users,
                comments = n_comments,
                limit = self.tick_limit,
                "chat read too large, clearing rendered messages"
            );
            self.clean_chat(page).await?;
            return Ok(TickOutcome::Skipped(SkipReason::Oversized {
                usernames: n_users,
                comments: n_comments,
            }));
        }
        if n_users != n_comments {
            warn!(
                usernames = n_users,
                comments = n_comments,
                "usernames and messages do not line up, clearing rendered messages"
            );
            self.clean_chat(page).await?;
            return Ok(TickOutcome::Skipped(SkipReason::Misaligned {
                usernames: n_users,
                comments: n_comments,
            }));
        }

        let read = ChatRead {
            date_scraping: scrape_timestamp(),
            time_live: time_live.into_value(),
            views: views.into_value(),
            pairs: usernames.into_iter().zip(comments).collect(),
        };
        // admitted rows are in the sink before the first await below, so an
        // interrupted tick still has them in the final save
        let admitted = self.admit(&read);
        self.sink.maybe_flush_blocking().await;
        pacing::settle(self.pacing.chat_persist_settle).await;

        debug!(
            buffered = self.sink.len(),
            seen = self.seen.len(),
            read = n_users,
            admitted,
            "chat tick persisted"
        );
        Ok(TickOutcome::Persisted {
            read: n_users,
            admitted,
        })
    }

    fn finish(&mut self) -> FinishSummary {
        self.sink.flush_final();
        FinishSummary {
            written: self.sink.written(),
            retained: self.sink.len(),
        }
    }
}
