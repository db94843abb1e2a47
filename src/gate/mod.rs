//! Blocking page states: captcha, login walls, offline content
//!
//! Detection never fails. A marker lookup that errors counts as "marker
//! absent", so a flaky page can only make the gate look clear, never blocked.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::pacing::{Pacing, settle};
use crate::traits::{Acknowledger, ElementQuery};

const CAPTCHA_PROMPT: &str = "Captcha detected. Please close the captcha window manually. \
                              Press Enter after you have closed the captcha window to continue...";
const CAPTCHA_AGAIN_PROMPT: &str = "Captcha still present. Please close it. \
                                    Press Enter after you have closed the captcha window to continue...";
const LOGIN_PROMPT: &str = "Press Enter after you have closed the login window to continue...";
const LOGIN_AGAIN_PROMPT: &str = "Login still present. Please close it. \
                                  Press Enter after you have closed the login window to continue...";

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Clear,
    CaptchaBlocked,
    LoginBlocked,
    Unavailable,
}

/// CSS selectors whose presence signals each gate. `None` means the
/// platform never shows that state.
#[derive(Debug, Clone, Default)]
pub struct GateMarkers {
    pub captcha: Option<String>,
    pub login: Option<String>,
    pub unavailable: Option<String>,
    /// Unrelated landing view the site sometimes jumps to
    pub default_view: Option<String>,
    /// Panel suggesting to log in, shown without blocking
    pub login_suggestion: Option<String>,
    /// Clicked to get past the login suggestion
    pub suggestion_target: Option<String>,
}

pub struct InteractionGate {
    markers: GateMarkers,
    pacing: Pacing,
}

impl InteractionGate {
    pub fn new(markers: GateMarkers, pacing: Pacing) -> Self {
        Self { markers, pacing }
    }

    /// Current gate state, most severe first.
    pub async fn detect(&self, page: &dyn ElementQuery) -> GateState {
        if self.present(page, self.markers.unavailable.as_deref()).await {
            GateState::Unavailable
        } else if self.present(page, self.markers.captcha.as_deref()).await {
            GateState::CaptchaBlocked
        } else if self.present(page, self.markers.login.as_deref()).await {
            GateState::LoginBlocked
        } else {
            GateState::Clear
        }
    }

    async fn present(&self, page: &dyn ElementQuery, marker: Option<&str>) -> bool {
        let Some(selector) = marker else {
            return false;
        };
        match page.find(selector).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                debug!(selector, "gate marker lookup failed, treating as absent: {e:#}");
                false
            }
        }
    }

    /// Waits out every blocking state the page shows right now, then undoes
    /// the side effects gates leave behind (jump to the landing view, login
    /// suggestion panel). Only fails when the acknowledgement channel or a
    /// corrective navigation does.
    pub async fn clear_blocking(&self, page: &dyn ElementQuery, ack: &dyn Acknowledger) -> Result<()> {
        let captcha = self.markers.captcha.as_deref();
        if self.present(page, captcha).await {
            warn!("captcha detected, waiting for manual resolution");
            ack.acknowledge(CAPTCHA_PROMPT).await?;
            while self.present(page, captcha).await {
                ack.acknowledge(CAPTCHA_AGAIN_PROMPT).await?;
            }
            info!("captcha cleared");
        }

        let login = self.markers.login.as_deref();
        if self.present(page, login).await {
            warn!("login wall detected, waiting for manual resolution");
            ack.acknowledge(LOGIN_PROMPT).await?;
            while self.present(page, login).await {
                ack.acknowledge(LOGIN_AGAIN_PROMPT).await?;
            }
            info!("login wall cleared");
            if self.on_default_view(page).await {
                self.restore(page, self.pacing.login_back_settle).await?;
            }
        }

        if self.on_default_view(page).await {
            self.restore(page, self.pacing.back_settle).await?;
        }

        if self.present(page, self.markers.login_suggestion.as_deref()).await {
            settle(self.pacing.suggestion_settle).await;
            self.dismiss_suggestion(page).await;
        }
        Ok(())
    }

    async fn on_default_view(&self, page: &dyn ElementQuery) -> bool {
        self.present(page, self.markers.default_view.as_deref()).await
    }

    /// Goes back from the landing view and returns to the bottom of the page.
    async fn restore(&self, page: &dyn ElementQuery, wait: std::time::Duration) -> Result<()> {
        info!("page left for the landing view, going back");
        page.go_back().await?;
        settle(wait).await;
        page.execute_script(SCROLL_TO_BOTTOM).await?;
        settle(self.pacing.bottom_settle).await;
        Ok(())
    }

    async fn dismiss_suggestion(&self, page: &dyn ElementQuery) {
        let Some(selector) = self.markers.suggestion_target.as_deref() else {
            return;
        };
        match page.find(selector).await {
            Ok(Some(target)) => {
                if let Err(e) = page.click(&target).await {
                    debug!(selector, "login suggestion click failed: {e:#}");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(selector, "login suggestion lookup failed: {e:#}"),
        }
    }
}
