pub mod tiktok;
pub mod twitch;
pub mod youtube;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::MonitorConfig;
use crate::platform::PlatformTag;
use crate::sink::{CsvAppendWriter, JsonDocumentWriter};
use crate::traits::{Acknowledger, PlatformScraper};

use tiktok::{ShortFormScraper, ShortFormSelectors};
use twitch::{ChatSelectors, LiveChatScraper};
use youtube::{VideoScraper, VideoSelectors};

/// Builds the scraping loop for `platform`, writing into `folder/file_name`.
/// Without a file name the platform's default one is used.
pub fn build(
    platform: PlatformTag,
    config: &MonitorConfig,
    folder: &Path,
    file_name: Option<&str>,
    ack: Arc<dyn Acknowledger>,
) -> Result<Box<dyn PlatformScraper>> {
    let Some(default_name) = platform.default_file_name() else {
        bail!("No scraper for an unrecognized page");
    };
    let file_name = file_name.unwrap_or(default_name);

    let scraper: Box<dyn PlatformScraper> = match platform {
        PlatformTag::Video => Box::new(VideoScraper::new(
            VideoSelectors::default(),
            config,
            JsonDocumentWriter::new(folder, file_name),
        )),
        PlatformTag::LiveChat => Box::new(LiveChatScraper::new(
            ChatSelectors::default(),
            config,
            CsvAppendWriter::new(folder, file_name),
        )),
        PlatformTag::ShortForm => Box::new(ShortFormScraper::new(
            ShortFormSelectors::default(),
            config,
            JsonDocumentWriter::new(folder, file_name),
            ack,
        )),
        PlatformTag::Invalid => bail!("No scraper for an unrecognized page"),
    };
    Ok(scraper)
}
