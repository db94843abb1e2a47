//! Waits between scrolls and polls
//!
//! Every wait is a plain cooperative sleep. Randomised waits avoid repeating
//! the previous one: a roll landing within `tolerance` of the last wait is
//! thrown away and re-rolled from a wider range.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Ranges, in seconds, for one kind of randomised wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterRange {
    pub first: (f64, f64),
    pub reroll: (f64, f64),
}

impl JitterRange {
    pub const fn fixed(secs: f64) -> Self {
        Self {
            first: (secs, secs),
            reroll: (secs, secs),
        }
    }
}

/// Timing knobs for the scraping loops
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    /// Pixels scrolled per inner step of the short clip loop
    pub scroll_step_px: i64,
    /// Inner scroll steps per short clip tick
    pub inner_steps: usize,
    pub scroll_wait: JitterRange,
    pub tick_wait: JitterRange,
    pub tolerance: f64,
    /// Settle after going back from the home view once a login wall cleared
    pub login_back_settle: Duration,
    /// Settle after going back from the home view otherwise
    pub back_settle: Duration,
    /// Settle after jumping to the bottom of the page
    pub bottom_settle: Duration,
    /// Wait before dismissing the login suggestion panel
    pub suggestion_settle: Duration,
    /// Wait before reading the chat column
    pub chat_read_settle: Duration,
    /// Wait after persisting a chat tick
    pub chat_persist_settle: Duration,
    pub video: VideoScroll,
}

/// Scroll pattern used to load video comments
#[derive(Debug, Clone, PartialEq)]
pub struct VideoScroll {
    pub bursts: usize,
    pub burst_px: i64,
    pub pullback_px: i64,
    pub pause: Duration,
    /// Consecutive unchanged page heights before giving up
    pub max_stable_attempts: usize,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            scroll_step_px: 420,
            inner_steps: 3,
            scroll_wait: JitterRange {
                first: (0.8, 1.0),
                reroll: (0.8, 2.0),
            },
            tick_wait: JitterRange {
                first: (1.5, 2.0),
                reroll: (2.0, 3.0),
            },
            tolerance: 0.01,
            login_back_settle: Duration::from_secs(10),
            back_settle: Duration::from_secs(4),
            bottom_settle: Duration::from_secs(1),
            suggestion_settle: Duration::from_secs(1),
            chat_read_settle: Duration::from_millis(100),
            chat_persist_settle: Duration::from_millis(300),
            video: VideoScroll {
                bursts: 5,
                burst_px: 449,
                pullback_px: 169,
                pause: Duration::from_millis(500),
                max_stable_attempts: 3,
            },
        }
    }
}

impl Pacing {
    /// Same shape as the defaults with every wait set to zero
    pub fn immediate() -> Self {
        let zero = Duration::ZERO;
        Self {
            scroll_wait: JitterRange::fixed(0.0),
            tick_wait: JitterRange::fixed(0.0),
            login_back_settle: zero,
            back_settle: zero,
            bottom_settle: zero,
            suggestion_settle: zero,
            chat_read_settle: zero,
            chat_persist_settle: zero,
            video: VideoScroll {
                pause: zero,
                ..Self::default().video
            },
            ..Self::default()
        }
    }
}

const MAX_REROLLS: usize = 32;

/// Produces randomised waits that never repeat the previous one within tolerance.
pub struct Jitter {
    range: JitterRange,
    tolerance: f64,
    previous: Option<f64>,
    rng: StdRng,
}

impl Jitter {
    pub fn new(range: JitterRange, tolerance: f64) -> Self {
        Self::with_rng(range, tolerance, StdRng::from_os_rng())
    }

    pub fn with_rng(range: JitterRange, tolerance: f64, rng: StdRng) -> Self {
        Self {
            range,
            tolerance,
            previous: None,
            rng,
        }
    }

    /// Next wait in seconds
    pub fn next_secs(&mut self) -> f64 {
        let mut secs = roll(&mut self.rng, self.range.first);
        if let Some(previous) = self.previous {
            let mut rerolls = 0;
            while (secs - previous).abs() < self.tolerance && rerolls < MAX_REROLLS {
                secs = roll(&mut self.rng, self.range.reroll);
                rerolls += 1;
            }
        }
        self.previous = Some(secs);
        secs
    }

    pub fn next_wait(&mut self) -> Duration {
        Duration::from_secs_f64(self.next_secs())
    }
}

fn roll(rng: &mut StdRng, (low, high): (f64, f64)) -> f64 {
    if high <= low {
        return low.max(0.0);
    }
    rng.random_range(low..=high)
}

pub async fn settle(wait: Duration) {
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}
