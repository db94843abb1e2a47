//! Video page scraper: one scroll-and-read pass over a watch page

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::extract::{
    Read, SnapshotAssembler, emoji_job, every, first, first_of, list_job, nth, per_item, read,
    settle, text_job,
};
use crate::models::{EmojiComment, SENTINEL, VideoComments, VideoSnapshot, scrape_timestamp};
use crate::pacing::{self, VideoScroll};
use crate::platform::PlatformTag;
use crate::sink::{IncrementalSink, JsonDocumentWriter};
use crate::traits::{ElementQuery, FinishSummary, PlatformScraper, StopReason, TickOutcome};

const PAGE_HEIGHT_SCRIPT: &str = "return { pageHeight: Math.max(document.body.scrollHeight, \
    document.body.offsetHeight, document.documentElement.clientHeight, \
    document.documentElement.scrollHeight, document.documentElement.offsetHeight) };";

/// CSS selectors for a watch page
#[derive(Debug, Clone)]
pub struct VideoSelectors {
    pub channel_link: String,
    pub subscribers: String,
    pub title: String,
    pub description_expand: String,
    /// Description once the expand button was clicked
    pub description_expanded: String,
    /// Description when there is no expand button
    pub description_inline: String,
    /// Bold spans of the info line: views first, upload date third
    pub info_bold: String,
    pub info_container: String,
    pub comment_count: String,
    pub likes: String,
    pub header_author: String,
    pub comment_body: String,
    pub emoji_image: String,
    pub comment_likes: String,
    pub comment_thread: String,
    pub reply_button: String,
    pub comment_date: String,
}

impl Default for VideoSelectors {
    fn default() -> Self {
        Self {
            channel_link: "ytd-channel-name yt-formatted-string.complex-string > a".to_string(),
            subscribers: "yt-formatted-string.ytd-video-owner-renderer".to_string(),
            title: "h1 > yt-formatted-string.ytd-watch-metadata".to_string(),
            description_expand: "tp-yt-paper-button#expand".to_string(),
            description_expanded: "yt-attributed-string.ytd-text-inline-expander".to_string(),
            description_inline: "ytd-text-inline-expander#description-inline-expander".to_string(),
            info_bold: "span.yt-formatted-string.bold".to_string(),
            info_container: "div#info-container".to_string(),
            comment_count: "yt-formatted-string.count-text.ytd-comments-header-renderer span.yt-formatted-string"
                .to_string(),
            likes: "button.yt-spec-button-shape-next--segmented-start \
                    div.yt-spec-button-shape-next__button-text-content"
                .to_string(),
            header_author: "div#header-author".to_string(),
            comment_body: "yt-attributed-string#content-text".to_string(),
            emoji_image: "img.yt-core-attributed-string__image-element".to_string(),
            comment_likes: "span#vote-count-middle".to_string(),
            comment_thread: "ytd-item-section-renderer ytd-comment-thread-renderer".to_string(),
            reply_button: "button.yt-spec-button-shape-next--call-to-action".to_string(),
            comment_date: "span#published-time-text > a".to_string(),
        }
    }
}

pub struct VideoScraper {
    selectors: VideoSelectors,
    assembler: SnapshotAssembler,
    scroll: VideoScroll,
    sink: IncrementalSink<VideoSnapshot, JsonDocumentWriter<VideoSnapshot>>,
    done: bool,
}

impl VideoScraper {
    pub fn new(
        selectors: VideoSelectors,
        config: &MonitorConfig,
        writer: JsonDocumentWriter<VideoSnapshot>,
    ) -> Self {
        Self {
            selectors,
            assembler: SnapshotAssembler::new(config.extract_concurrency),
            scroll: config.pacing.video.clone(),
            sink: IncrementalSink::new(writer, config.snapshot_flush_threshold),
            done: false,
        }
    }

    /// Scrolls until the page height stops growing, so lazily loaded comments render.
    async fn load_comments(&self, page: &dyn ElementQuery) -> Result<()> {
        let scroll = &self.scroll;
        let mut height = page_height(page).await?;
        info!("Initial total page height: {height}");

        let mut attempts = 0;
        while attempts < scroll.max_stable_attempts {
            for _ in 0..scroll.bursts {
                page.scroll_by(scroll.burst_px).await?;
                pacing::settle(scroll.pause).await;
            }
            page.scroll_by(-scroll.pullback_px).await?;
            pacing::settle(scroll.pause).await;

            let new_height = page_height(page).await?;
            info!("New total page height: {new_height}");
            if new_height == height {
                attempts += 1;
                info!("Attempt {attempts}: page height has not changed");
                page.scroll_by(scroll.burst_px).await?;
                pacing::settle(scroll.pause).await;
            } else {
                height = new_height;
                attempts = 0;
            }
        }
        info!("Scrolling complete or maximum attempts reached");
        Ok(())
    }

    /// Opens the collapsed description. Must run before assembly: it is the
    /// only extraction step that changes the page.
    async fn expand_description(&self, page: &dyn ElementQuery) -> bool {
        let selector = &self.selectors.description_expand;
        let clicked = match page.find(selector).await {
            Ok(Some(button)) => page.click(&button).await.map(|()| true),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        clicked.unwrap_or_else(|e| {
            warn!(field = "description", "expand button failed: {e:#}");
            false
        })
    }

    async fn snapshot(&self, page: &dyn ElementQuery, expanded: bool) -> VideoSnapshot {
        let s = &self.selectors;
        let date_scraping = scrape_timestamp();
        let jobs = vec![
            text_job("url_post", async move {
                settle("url_post", "address of the video", page.current_url().await.map(Some))
            }),
            text_job("channel_name", async move {
                settle("channel_name", "name of the channel", first(page, &s.channel_link, Read::Text).await)
            }),
            text_job("count_subscribers", async move {
                settle(
                    "count_subscribers",
                    "subscriber count of the channel",
                    first(page, &s.subscribers, Read::Text).await,
                )
            }),
            text_job("id_channel", async move {
                settle(
                    "id_channel",
                    "link to the channel",
                    first(page, &s.channel_link, Read::Attribute("href")).await,
                )
            }),
            text_job("title", async move {
                settle("title", "title of the video", first(page, &s.title, Read::Text).await)
            }),
            text_job("description", async move {
                settle("description", "description of the video", description(page, s, expanded).await)
            }),
            text_job("views", async move {
                settle("views", "view count of the video", views(page, s).await)
            }),
            text_job("count_comment", async move {
                settle("count_comment", "comment count of the video", comment_count(page, s).await)
            }),
            text_job("count_likes", async move {
                settle("count_likes", "like count of the video", first(page, &s.likes, Read::Text).await)
            }),
            text_job("upload", async move {
                settle("upload", "upload date of the video", upload(page, s).await)
            }),
            list_job("username", async move {
                settle("username", "usernames of the commenters", usernames(page, s).await)
            }),
            emoji_job("emoji", async move {
                settle("emoji", "comment text with its emoji", emoji_comments(page, s).await)
            }),
            list_job("n_like", async move {
                settle("n_like", "likes of each comment", every(page, &s.comment_likes, Read::Text).await)
            }),
            list_job("n_response", async move {
                settle(
                    "n_response",
                    "replies to each comment",
                    per_item(
                        page,
                        &s.comment_thread,
                        &s.reply_button,
                        Read::Attribute("aria-label"),
                        SENTINEL,
                    )
                    .await,
                )
            }),
            list_job("date", async move {
                settle("date", "date of each comment", every(page, &s.comment_date, Read::Text).await)
            }),
        ];

        let mut fields = self.assembler.run(jobs).await;
        VideoSnapshot {
            date_scraping,
            url_post: fields.text("url_post"),
            channel_name: fields.text("channel_name"),
            count_subscribers: fields.text("count_subscribers"),
            id_channel: fields.text("id_channel"),
            title: fields.text("title"),
            description: fields.text("description"),
            views: fields.text("views"),
            count_comment: fields.text("count_comment"),
            count_likes: fields.text("count_likes"),
            upload: fields.text("upload"),
            comment: VideoComments {
                username: fields.list("username"),
                emoji: fields.emoji("emoji"),
                n_like: fields.list("n_like"),
                n_response: fields.list("n_response"),
                date: fields.list("date"),
            },
        }
    }
}

async fn page_height(page: &dyn ElementQuery) -> Result<u64> {
    let dimensions = page.execute_script(PAGE_HEIGHT_SCRIPT).await?;
    dimensions["pageHeight"]
        .as_u64()
        .ok_or_else(|| anyhow!("page height probe returned {dimensions}"))
}

fn single_line(text: &str) -> String {
    text.replace('\n', "").trim().to_string()
}

async fn description(page: &dyn ElementQuery, s: &VideoSelectors, expanded: bool) -> Result<Option<String>> {
    let selector = if expanded {
        &s.description_expanded
    } else {
        &s.description_inline
    };
    first(page, selector, Read::Text).await
}

async fn views(page: &dyn ElementQuery, s: &VideoSelectors) -> Result<Option<String>> {
    let value = first_of(
        page,
        &[(s.info_bold.as_str(), Read::Text), (s.info_container.as_str(), Read::Text)],
    )
    .await?;
    Ok(value.map(|v| single_line(&v)))
}

async fn upload(page: &dyn ElementQuery, s: &VideoSelectors) -> Result<Option<String>> {
    if let Some(date) = nth(page, &s.info_bold, 2, Read::Text).await? {
        return Ok(Some(date));
    }
    Ok(first(page, &s.info_container, Read::Text)
        .await?
        .map(|v| single_line(&v)))
}

async fn comment_count(page: &dyn ElementQuery, s: &VideoSelectors) -> Result<Option<String>> {
    let parts = every(page, &s.comment_count, Read::Text).await?;
    Ok(parts.map(|parts| parts.join(" ")))
}

/// Author of each comment header. The header's first class also tags the
/// link (or plain span) carrying the name.
async fn usernames(page: &dyn ElementQuery, s: &VideoSelectors) -> Result<Option<Vec<String>>> {
    let mut names = Vec::new();
    for header in page.find_all(&s.header_author).await? {
        let class = page.attribute(&header, "class").await?.unwrap_or_default();
        let (link, label) = match class.split_whitespace().next() {
            Some(tag) => (format!("a[class*=\"{tag}\"]"), format!("span[class*=\"{tag}\"]")),
            None => ("a".to_string(), "span".to_string()),
        };

        let mut name = match page.find_in(&header, &link).await? {
            Some(anchor) => read(page, &anchor, Read::TextOr("href")).await?,
            None => None,
        };
        if name.is_none()
            && let Some(span) = page.find_in(&header, &label).await?
        {
            name = Some(page.text(&span).await?);
        }
        names.push(name.unwrap_or_else(|| SENTINEL.to_string()));
    }
    Ok(Some(names))
}

/// Text of each comment paired with the emoji images inside it. Entries with
/// neither are dropped.
async fn emoji_comments(page: &dyn ElementQuery, s: &VideoSelectors) -> Result<Option<Vec<EmojiComment>>> {
    let mut comments = Vec::new();
    for body in page.find_all(&s.comment_body).await? {
        let text = page.text(&body).await?;
        let mut sources = Vec::new();
        for image in page.find_all_in(&body, &s.emoji_image).await? {
            if let Some(src) = page.attribute(&image, "src").await? {
                sources.push(src);
            }
        }
        let comment = EmojiComment(text, sources);
        if !comment.is_blank() {
            comments.push(comment);
        }
    }
    Ok(Some(comments))
}

#[async_trait]
impl PlatformScraper for VideoScraper {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Video
    }

    async fn poll_tick(&mut self, page: &dyn ElementQuery) -> Result<TickOutcome> {
        if self.done {
            return Ok(TickOutcome::Stop(StopReason::Completed));
        }
        self.done = true;

        info!("Scrolling process to load comments has started");
        if let Err(e) = self.load_comments(page).await {
            warn!("comment loading stopped early: {e:#}");
        }

        info!("Data extraction process has started");
        let expanded = self.expand_description(page).await;
        let snapshot = self.snapshot(page, expanded).await;
        let complete = snapshot.is_complete();

        let comment = &snapshot.comment;
        info!("Size of \"username\": {}", comment.username.len());
        info!("Size of \"emoji\": {}", comment.emoji.len());
        info!("Size of \"n_like\": {}", comment.n_like.len());
        info!("Size of \"n_response\": {}", comment.n_response.len());
        info!("Size of \"date\": {}", comment.date.len());
        if !complete {
            warn!("Some data was not extracted correctly");
        }

        self.sink.append(snapshot);
        self.sink.maybe_flush();
        Ok(TickOutcome::Snapshot { complete })
    }

    fn finish(&mut self) -> FinishSummary {
        self.sink.flush_final();
        FinishSummary {
            written: self.sink.written(),
            retained: self.sink.len(),
        }
    }
}
