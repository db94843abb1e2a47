//! Records produced by a scraping session: field results, per-tick snapshots
//! and chat rows

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholder written for a scalar field that could not be extracted.
pub const SENTINEL: &str = "None";

/// Value a field takes on when its extraction failed.
pub trait Sentinel {
    fn sentinel() -> Self;

    /// Whether a deserialized value is the failure placeholder
    fn is_sentinel(&self) -> bool {
        false
    }

    /// Whether the value carries anything (non-empty text or at least one item)
    fn has_content(&self) -> bool;
}

impl Sentinel for String {
    fn sentinel() -> Self {
        SENTINEL.to_string()
    }

    fn is_sentinel(&self) -> bool {
        self == SENTINEL
    }

    fn has_content(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Sentinel for Vec<T> {
    fn sentinel() -> Self {
        Vec::new()
    }

    fn has_content(&self) -> bool {
        !self.is_empty()
    }
}

/// Outcome of one field extractor.
///
/// `Missing` means the extraction failed and is distinct from a list that was
/// read successfully but holds no items. On disk a missing field is written as
/// its sentinel (`"None"` for text, `[]` for lists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Found(T),
    Missing,
}

impl<T: Sentinel> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Present and holding at least one character or item
    pub fn has_content(&self) -> bool {
        match self {
            Self::Found(value) => value.has_content(),
            Self::Missing => false,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Found(value) => value,
            Self::Missing => T::sentinel(),
        }
    }
}

impl<T> Field<Vec<T>> {
    /// Item count, zero for a missing list
    pub fn len(&self) -> usize {
        match self {
            Self::Found(items) => items.len(),
            Self::Missing => 0,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Self::Found)
    }
}

impl<T: Serialize + Sentinel> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Found(value) => value.serialize(serializer),
            Self::Missing => T::sentinel().serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned + Sentinel> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = T::deserialize(deserializer)?;
        if value.is_sentinel() {
            Ok(Self::Missing)
        } else {
            Ok(Self::Found(value))
        }
    }
}

/// A comment body paired with the image sources (emoji) rendered inside it.
/// Serialized as `[text, [src, ...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiComment(pub String, pub Vec<String>);

impl EmojiComment {
    pub fn is_blank(&self) -> bool {
        self.0.is_empty() && self.1.is_empty()
    }
}

/// Parallel comment columns of a video page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoComments {
    pub username: Field<Vec<String>>,
    pub emoji: Field<Vec<EmojiComment>>,
    pub n_like: Field<Vec<String>>,
    pub n_response: Field<Vec<String>>,
    pub date: Field<Vec<String>>,
}

/// Everything read from a video page in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub date_scraping: String,
    pub url_post: Field<String>,
    pub channel_name: Field<String>,
    pub count_subscribers: Field<String>,
    pub id_channel: Field<String>,
    pub title: Field<String>,
    pub description: Field<String>,
    pub views: Field<String>,
    pub count_comment: Field<String>,
    pub count_likes: Field<String>,
    pub upload: Field<String>,
    pub comment: VideoComments,
}

impl VideoSnapshot {
    pub fn is_complete(&self) -> bool {
        self.url_post.has_content() && self.title.is_present() && self.comment.username.is_present()
    }
}

/// Parallel comment columns of a short clip page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortFormComments {
    pub username: Field<Vec<String>>,
    pub text: Field<Vec<String>>,
    pub n_like: Field<Vec<String>>,
    pub n_response: Field<Vec<String>>,
    pub date: Field<Vec<String>>,
}

/// State of a short clip page at one tick; later snapshots supersede earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortFormSnapshot {
    pub date_scraping: String,
    pub url_post: Field<String>,
    pub comment: ShortFormComments,
}

impl ShortFormSnapshot {
    pub fn is_complete(&self) -> bool {
        self.url_post.has_content()
            && self.comment.username.has_content()
            && self.comment.n_like.has_content()
            && self.comment.n_response.has_content()
            && self.comment.date.has_content()
    }
}

/// One admitted chat message. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRow {
    pub date_scraping: String,
    pub time_live: String,
    pub views: String,
    pub username: String,
    pub comment: String,
}

/// Local wall-clock timestamp used for `date_scraping`
pub fn scrape_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_serialize_as_sentinels() {
        let text: Field<String> = Field::Missing;
        let list: Field<Vec<String>> = Field::Missing;

        assert_eq!(serde_json::to_value(&text).unwrap(), serde_json::json!("None"));
        assert_eq!(serde_json::to_value(&list).unwrap(), serde_json::json!([]));
    }

    #[test]
    fn sentinel_text_reads_back_as_missing() {
        let field: Field<String> = serde_json::from_str("\"None\"").unwrap();
        assert_eq!(field, Field::Missing);

        let field: Field<String> = serde_json::from_str("\"12K\"").unwrap();
        assert_eq!(field, Field::Found("12K".to_string()));
    }

    #[test]
    fn empty_list_is_present_but_without_content() {
        let field = Field::Found(Vec::<String>::new());
        assert!(field.is_present());
        assert!(!field.has_content());
        assert_eq!(field.len(), 0);
    }

    #[test]
    fn emoji_comment_uses_pair_layout() {
        let comment = EmojiComment("nice".to_string(), vec!["https://img/1.png".to_string()]);
        assert_eq!(
            serde_json::to_value(&comment).unwrap(),
            serde_json::json!(["nice", ["https://img/1.png"]])
        );
    }

    #[test]
    fn short_form_completeness_needs_every_comment_column() {
        let column = |items: &[&str]| Field::Found(items.iter().map(|s| s.to_string()).collect());
        let mut snapshot = ShortFormSnapshot {
            date_scraping: scrape_timestamp(),
            url_post: Field::Found("https://www.tiktok.com/@a/video/1".to_string()),
            comment: ShortFormComments {
                username: column(&["/@a"]),
                text: column(&["hi"]),
                n_like: column(&["3"]),
                n_response: column(&["0"]),
                date: column(&["1d ago"]),
            },
        };
        assert!(snapshot.is_complete());

        snapshot.comment.date = Field::Missing;
        assert!(!snapshot.is_complete());

        snapshot.comment.date = column(&[]);
        assert!(!snapshot.is_complete());
    }
}
