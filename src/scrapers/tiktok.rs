//! Short clip scraper: scrolls the comment panel and snapshots it each tick

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::extract::{Read, SnapshotAssembler, list_job, per_item, settle, text_job};
use crate::gate::{GateMarkers, InteractionGate};
use crate::models::{SENTINEL, ShortFormComments, ShortFormSnapshot, scrape_timestamp};
use crate::pacing::{self, Jitter, Pacing};
use crate::platform::PlatformTag;
use crate::sink::{IncrementalSink, JsonDocumentWriter};
use crate::traits::{Acknowledger, ElementQuery, FinishSummary, PlatformScraper, StopReason, TickOutcome};

const CONTINUE_PROMPT: &str = "Type 'exit' to stop or 'c' to keep going: ";

/// CSS selectors for a short clip page and its comment panel
#[derive(Debug, Clone)]
pub struct ShortFormSelectors {
    pub comment_item: String,
    pub author_link: String,
    pub comment_text: String,
    pub like_count: String,
    pub created_at: String,
    pub reply_action: String,
    pub captcha: String,
    pub login_wall: String,
    pub home_view: String,
    pub login_panel: String,
    pub channel_item: String,
}

impl Default for ShortFormSelectors {
    fn default() -> Self {
        Self {
            comment_item: "div[class*=\"DivCommentItemContainer\"]".to_string(),
            author_link: "a".to_string(),
            comment_text: "p[class*=\"PCommentText\"] > span".to_string(),
            like_count: "span[class*=\"SpanCount\"]".to_string(),
            created_at: "span[class*=\"SpanCreatedTime\"]".to_string(),
            reply_action: "p[class*=\"PReplyActionText\"]".to_string(),
            captcha: "a#verify-bar-close".to_string(),
            login_wall: "a#loginContainer".to_string(),
            home_view: "div#main-content-others_homepage".to_string(),
            login_panel: "div#loginContainer".to_string(),
            channel_item: "div[data-e2e=\"channel-item\"]".to_string(),
        }
    }
}

impl ShortFormSelectors {
    fn gate_markers(&self) -> GateMarkers {
        GateMarkers {
            captcha: Some(self.captcha.clone()),
            login: Some(self.login_wall.clone()),
            unavailable: None,
            default_view: Some(self.home_view.clone()),
            login_suggestion: Some(self.login_panel.clone()),
            suggestion_target: Some(self.channel_item.clone()),
        }
    }
}

pub struct ShortFormScraper {
    selectors: ShortFormSelectors,
    gate: InteractionGate,
    ack: Arc<dyn Acknowledger>,
    assembler: SnapshotAssembler,
    pacing: Pacing,
    scroll_wait: Jitter,
    tick_wait: Jitter,
    sink: IncrementalSink<ShortFormSnapshot, JsonDocumentWriter<ShortFormSnapshot>>,
}

impl ShortFormScraper {
    pub fn new(
        selectors: ShortFormSelectors,
        config: &MonitorConfig,
        writer: JsonDocumentWriter<ShortFormSnapshot>,
        ack: Arc<dyn Acknowledger>,
    ) -> Self {
        let pacing = config.pacing.clone();
        Self {
            gate: InteractionGate::new(selectors.gate_markers(), pacing.clone()),
            selectors,
            ack,
            assembler: SnapshotAssembler::new(config.extract_concurrency),
            scroll_wait: Jitter::new(pacing.scroll_wait, pacing.tolerance),
            tick_wait: Jitter::new(pacing.tick_wait, pacing.tolerance),
            pacing,
            sink: IncrementalSink::new(writer, config.snapshot_flush_threshold),
        }
    }

    async fn snapshot(&self, page: &dyn ElementQuery) -> ShortFormSnapshot {
        let s = &self.selectors;
        let item = s.comment_item.as_str();
        let date_scraping = scrape_timestamp();
        let jobs = vec![
            text_job("url_post", async move {
                settle("url_post", "address of the clip", page.current_url().await.map(Some))
            }),
            list_job("username", async move {
                settle(
                    "username",
                    "profile link of each commenter",
                    per_item(page, item, &s.author_link, Read::Attribute("href"), SENTINEL).await,
                )
            }),
            list_job("text", async move {
                settle(
                    "text",
                    "body of each comment",
                    per_item(page, item, &s.comment_text, Read::TextOr("href"), SENTINEL).await,
                )
            }),
            list_job("n_like", async move {
                settle(
                    "n_like",
                    "likes of each comment",
                    per_item(page, item, &s.like_count, Read::TextOr("href"), SENTINEL).await,
                )
            }),
            list_job("n_response", async move {
                settle(
                    "n_response",
                    "replies to each comment",
                    per_item(page, item, &s.reply_action, Read::Text, "0").await,
                )
            }),
            list_job("date", async move {
                settle(
                    "date",
                    "date of each comment",
                    per_item(page, item, &s.created_at, Read::Text, SENTINEL).await,
                )
            }),
        ];

        let mut fields = self.assembler.run(jobs).await;
        ShortFormSnapshot {
            date_scraping,
            url_post: fields.text("url_post"),
            comment: ShortFormComments {
                username: fields.list("username"),
                text: fields.list("text"),
                n_like: fields.list("n_like"),
                n_response: fields.list("n_response"),
                date: fields.list("date"),
            },
        }
    }
}

fn log_sizes(comment: &ShortFormComments) {
    info!("Size of \"username\": {}", comment.username.len());
    info!("Size of \"likes\": {}", comment.n_like.len());
    info!("Size of \"dates\": {}", comment.date.len());
    info!("Size of \"responses\": {}", comment.n_response.len());
}

#[async_trait]
impl PlatformScraper for ShortFormScraper {
    fn platform(&self) -> PlatformTag {
        PlatformTag::ShortForm
    }

    async fn poll_tick(&mut self, page: &dyn ElementQuery) -> Result<TickOutcome> {
        for _ in 0..self.pacing.inner_steps {
            self.gate.clear_blocking(page, self.ack.as_ref()).await?;
            let wait = self.scroll_wait.next_wait();
            page.scroll_by(self.pacing.scroll_step_px).await?;
            pacing::settle(wait).await;
        }

        let wait = self.tick_wait.next_wait();
        info!("Waiting for {:.2} seconds before the next iteration", wait.as_secs_f64());
        pacing::settle(wait).await;

        info!("Data extraction in progress");
        let snapshot = self.snapshot(page).await;
        let complete = snapshot.is_complete();
        log_sizes(&snapshot.comment);

        if complete {
            let c = &snapshot.comment;
            info!("Usernames count: {}", c.username.len());
            // the comments count mirrors the username list
            info!("Comments count: {}", c.username.len());
            info!("Likes count: {}", c.n_like.len());
            info!("Dates count: {}", c.date.len());
            info!("Responses count: {}", c.n_response.len());
        }
        self.sink.append(snapshot);
        self.sink.maybe_flush();

        if !complete {
            warn!("Some data was not extracted correctly");
            return Ok(TickOutcome::Snapshot { complete });
        }

        let answer = self.ack.ask(CONTINUE_PROMPT).await?;
        if answer.trim().eq_ignore_ascii_case("exit") {
            info!("Stop requested, saving data");
            return Ok(TickOutcome::Stop(StopReason::UserExit));
        }
        Ok(TickOutcome::Snapshot { complete })
    }

    fn finish(&mut self) -> FinishSummary {
        info!("Scroll operation finished");
        if let Some(latest) = self.sink.buffered().last() {
            log_sizes(&latest.comment);
        }
        self.sink.flush_final();
        FinishSummary {
            written: self.sink.written(),
            retained: self.sink.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::browser::fixture::{Action, HtmlPage};
    use crate::models::Field;
    use crate::prompt::ScriptedAcknowledger;

    fn item(user: &str, text: &str, likes: &str, when: &str, replies: Option<&str>) -> String {
        let reply = replies
            .map(|r| format!(r#"<p class="css-16xv7y2-PReplyActionText">{r}</p>"#))
            .unwrap_or_default();
        format!(
            r#"<div class="css-1i7ohvi-DivCommentItemContainer eo72wou0">
                <a href="/@{user}">{user}</a>
                <p class="css-xm2h10-PCommentText e1g2efjf6"><span>{text}</span></p>
                <span class="css-gb2mrc-SpanCount ezxoskx3">{likes}</span>
                <span class="css-1esugaz-SpanCreatedTime">{when}</span>
                {reply}
            </div>"#
        )
    }

    fn clip(items: &[String]) -> String {
        format!("<html><body>{}</body></html>", items.concat())
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            pacing: Pacing::immediate(),
            ..MonitorConfig::default()
        }
    }

    fn clip_scraper(dir: &Path, ack: Arc<dyn Acknowledger>) -> ShortFormScraper {
        ShortFormScraper::new(
            ShortFormSelectors::default(),
            &config(),
            JsonDocumentWriter::new(dir, "tiktok.json"),
            ack,
        )
    }

    const URL: &str = "https://www.tiktok.com/@user.name/video/1234567890";

    #[tokio::test]
    async fn complete_snapshot_asks_and_exit_stops() {
        let dir = tempfile::tempdir().unwrap();
        let page = HtmlPage::new(&clip(&[
            item("ana", "love it", "12", "1d ago", Some("View 3 replies")),
            item("bo", "meh", "0", "2d ago", None),
        ]))
        .with_url(URL);
        let ack = Arc::new(ScriptedAcknowledger::new(&["c", "exit"]));
        let mut scraper = clip_scraper(dir.path(), ack.clone());

        assert_eq!(
            scraper.poll_tick(&page).await.unwrap(),
            TickOutcome::Snapshot { complete: true }
        );
        assert_eq!(
            scraper.poll_tick(&page).await.unwrap(),
            TickOutcome::Stop(StopReason::UserExit)
        );
        assert_eq!(ack.prompts(), vec![CONTINUE_PROMPT.to_string(); 2]);
        assert_eq!(page.count_of(&Action::Scroll(420)), 6);

        let summary = scraper.finish();
        assert_eq!(summary, FinishSummary { written: 2, retained: 0 });

        let text = std::fs::read_to_string(dir.path().join("tiktok.json")).unwrap();
        let doc: ShortFormSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(doc.url_post, Field::Found(URL.to_string()));
        let c = doc.comment;
        assert_eq!(c.username, Field::Found(vec!["/@ana".to_string(), "/@bo".to_string()]));
        assert_eq!(c.text, Field::Found(vec!["love it".to_string(), "meh".to_string()]));
        assert_eq!(c.n_like, Field::Found(vec!["12".to_string(), "0".to_string()]));
        assert_eq!(c.n_response, Field::Found(vec!["View 3 replies".to_string(), "0".to_string()]));
        assert_eq!(c.date, Field::Found(vec!["1d ago".to_string(), "2d ago".to_string()]));
    }

    #[tokio::test]
    async fn incomplete_snapshot_keeps_polling_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let page = HtmlPage::new(&clip(&[])).with_url(URL);
        let ack = Arc::new(ScriptedAcknowledger::default());
        let mut scraper = clip_scraper(dir.path(), ack.clone());

        let outcome = scraper.poll_tick(&page).await.unwrap();

        assert_eq!(outcome, TickOutcome::Snapshot { complete: false });
        assert!(ack.prompts().is_empty());
        assert_eq!(scraper.finish().written, 1);
    }

    #[tokio::test]
    async fn captcha_mid_scroll_waits_for_acknowledgement() {
        let dir = tempfile::tempdir().unwrap();
        let ready = clip(&[item("ana", "hi", "1", "1d ago", None)]);
        let page = Arc::new(
            HtmlPage::new(r#"<html><body><a id="verify-bar-close">x</a></body></html>"#).with_url(URL),
        );
        let ack = Arc::new(ScriptedAcknowledger::new(&["exit"]).on_prompt({
            let page = Arc::clone(&page);
            move |n| {
                if n == 1 {
                    page.set_html(&ready);
                }
            }
        }));
        let mut scraper = clip_scraper(dir.path(), ack.clone());

        let outcome = scraper.poll_tick(page.as_ref()).await.unwrap();

        assert_eq!(outcome, TickOutcome::Stop(StopReason::UserExit));
        let prompts = ack.prompts();
        assert!(prompts[0].starts_with("Captcha detected"));
        assert_eq!(prompts.last().map(String::as_str), Some(CONTINUE_PROMPT));
    }

    #[tokio::test]
    async fn unreadable_author_links_make_the_snapshot_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let page = HtmlPage::new(&clip(&[
            item("ana", "love it", "12", "1d ago", None),
            item("bo", "meh", "0", "2d ago", None),
        ]))
        .with_url(URL)
        .failing("a");
        let ack = Arc::new(ScriptedAcknowledger::new(&["exit"]));
        let mut scraper = clip_scraper(dir.path(), ack.clone());

        let outcome = scraper.poll_tick(&page).await.unwrap();

        assert_eq!(outcome, TickOutcome::Snapshot { complete: false });
        assert!(ack.prompts().is_empty());
        scraper.finish();
        let text = std::fs::read_to_string(dir.path().join("tiktok.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        // a failed column is written as an empty list, not as placeholders
        assert_eq!(value["comment"]["username"], serde_json::json!([]));
        assert_eq!(value["comment"]["n_like"], serde_json::json!(["12", "0"]));
    }

    #[tokio::test]
    async fn closed_input_ends_the_tick_with_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let page = HtmlPage::new(&clip(&[item("ana", "hi", "1", "1d ago", None)])).with_url(URL);
        let mut scraper = clip_scraper(dir.path(), Arc::new(ScriptedAcknowledger::default()));

        assert!(scraper.poll_tick(&page).await.is_err());
        assert_eq!(scraper.finish().written, 1);
    }
}
