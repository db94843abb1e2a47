//! URL to platform classification

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static VIDEO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?(youtube\.com/watch\?v=|youtu\.be/)[\w-]+")
        .expect("video pattern is valid")
});

static LIVE_CHAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?twitch\.tv/[\w-]+")
        .expect("live chat pattern is valid")
});

static SHORT_FORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?tiktok\.com/@[\w.]+/video/\d+")
        .expect("short form pattern is valid")
});

/// The kind of page a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformTag {
    /// A long-form video watch page (YouTube).
    Video,
    /// A channel live page with a chat column (Twitch).
    LiveChat,
    /// A short clip page with a numeric id (TikTok).
    ShortForm,
    Invalid,
}

impl PlatformTag {
    /// Default output file name for a session on this platform
    pub fn default_file_name(self) -> Option<&'static str> {
        match self {
            Self::Video => Some("youtube.json"),
            Self::LiveChat => Some("twitch.csv"),
            Self::ShortForm => Some("tiktok.json"),
            Self::Invalid => None,
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "youtube",
            Self::LiveChat => "twitch",
            Self::ShortForm => "tiktok",
            Self::Invalid => "INVALIDURL",
        };
        f.write_str(name)
    }
}

/// Maps a URL to its platform. Patterns are tried in a fixed order and anchored
/// at the start of the string; anything else is `Invalid`.
pub fn classify(url: &str) -> PlatformTag {
    if VIDEO_PATTERN.is_match(url) {
        PlatformTag::Video
    } else if LIVE_CHAT_PATTERN.is_match(url) {
        PlatformTag::LiveChat
    } else if SHORT_FORM_PATTERN.is_match(url) {
        PlatformTag::ShortForm
    } else {
        PlatformTag::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_video_urls() {
        for url in [
            "https://www.youtube.com/watch?v=abc123",
            "http://youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/abc-_123",
        ] {
            assert_eq!(classify(url), PlatformTag::Video, "{url}");
        }
    }

    #[test]
    fn classifies_live_chat_urls() {
        for url in ["https://twitch.tv/somechannel", "https://www.twitch.tv/some_channel-2"] {
            assert_eq!(classify(url), PlatformTag::LiveChat, "{url}");
        }
    }

    #[test]
    fn classifies_short_form_urls() {
        for url in [
            "https://www.tiktok.com/@user.name/video/1234567890",
            "http://tiktok.com/@u/video/1?lang=en",
        ] {
            assert_eq!(classify(url), PlatformTag::ShortForm, "{url}");
        }
    }

    #[test]
    fn everything_else_is_invalid() {
        for url in [
            "https://example.com/",
            "",
            "youtube.com/watch?v=abc",
            "https://www.youtube.com/channel/abc",
            "https://www.tiktok.com/@user/video/notanumber",
            "https://twitch.tv/",
            "see https://twitch.tv/somechannel",
        ] {
            assert_eq!(classify(url), PlatformTag::Invalid, "{url}");
        }
    }

    #[test]
    fn classification_is_idempotent() {
        let url = "https://www.tiktok.com/@user.name/video/1234567890";
        assert_eq!(classify(url), classify(url));
    }

    #[test]
    fn default_file_names_follow_output_format() {
        assert_eq!(PlatformTag::LiveChat.default_file_name(), Some("twitch.csv"));
        assert_eq!(PlatformTag::Video.default_file_name(), Some("youtube.json"));
        assert_eq!(PlatformTag::Invalid.default_file_name(), None);
        assert_eq!(PlatformTag::Invalid.to_string(), "INVALIDURL");
    }
}
