use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

mod browser;
mod config;
mod dedup;
mod extract;
mod gate;
mod models;
mod pacing;
mod platform;
mod prompt;
mod scrapers;
mod session;
mod sink;
mod traits;

use browser::ChromeSession;
use config::{Cli, MonitorConfig};
use platform::PlatformTag;
use prompt::ConsolePrompt;
use session::SessionEnd;
use traits::ElementQuery;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let cli = Cli::parse();
    let platform = platform::classify(&cli.url);
    if platform == PlatformTag::Invalid {
        error!(url = %cli.url, "Unsupported URL, expected a YouTube video, a Twitch channel or a TikTok video");
        process::exit(2);
    }
    let config = MonitorConfig::from_env()?.with_cli(&cli);

    info!(%platform, url = %cli.url, "Starting engagement monitor");

    let options = config.browser.clone();
    let page = tokio::task::spawn_blocking(move || ChromeSession::launch(&options))
        .await
        .context("Browser launch panicked")??;
    page.navigate(&cli.url).await?;
    pacing::settle(config.page_settle).await;

    let mut scraper = scrapers::build(
        platform,
        &config,
        &cli.folder,
        cli.file.as_deref(),
        Arc::new(ConsolePrompt),
    )?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let report = session::run_session(scraper.as_mut(), &page, interrupt).await;
    report.log();
    drop(scraper);
    // closes Chrome and removes its temporary profile
    drop(page);

    match report.end {
        // A prompt may still hold stdin on a blocking thread
        SessionEnd::Interrupted => process::exit(130),
        SessionEnd::Fatal(cause) => anyhow::bail!("Scraping stopped: {cause}"),
        SessionEnd::Stopped(_) => Ok(()),
    }
}
