use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of advanced-search results.
///
/// The API paginates with an opaque continuation cursor: pass `next_cursor`
/// back verbatim while `has_next_page` is true.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub tweets: Vec<Tweet>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A single tweet from the advanced-search dataset.
///
/// Serialize is derived as well because tweets are archived verbatim and
/// replayed later by the migration routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub text: String,
    /// Twitter legacy timestamp, e.g. "Tue Dec 10 07:00:30 +0000 2024".
    /// Kept as a string on the wire; use [`Tweet::created_at`].
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub author: Option<TweetAuthor>,
    #[serde(rename = "isReply", default)]
    pub is_reply: bool,
    /// Present (non-null) when this tweet is a retweet of another.
    #[serde(default)]
    pub retweeted_tweet: Option<serde_json::Value>,
    #[serde(default)]
    pub lang: Option<String>,
    /// Rich link-preview attachment, present when the tweet carries a card.
    #[serde(default)]
    pub card: Option<serde_json::Value>,
    #[serde(rename = "extendedEntities", default)]
    pub extended_entities: Option<ExtendedEntities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "profilePicture")]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

/// An attached media item. `media_type` is "photo", "video" or "animated_gif".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntity {
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub media_url_https: Option<String>,
    #[serde(default)]
    pub video_info: Option<VideoInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub variants: Vec<VideoVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoVariant {
    pub content_type: String,
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Tweet {
    /// Creation time parsed from the legacy Twitter format, falling back to
    /// RFC 3339 for sources that already return ISO timestamps.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Screen name of the tweet's author, when the API included one.
    pub fn author_handle(&self) -> Option<&str> {
        self.author.as_ref()?.user_name.as_deref()
    }
}
