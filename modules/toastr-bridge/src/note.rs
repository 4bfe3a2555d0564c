//! Tweet-to-Nostr event transformation and signing.

use anyhow::{Context, Result};
use chrono::Utc;
use nostr::{Event, EventBuilder, EventId, Keys, Kind, Tag, Timestamp};

use toastr_store::SigningIdentity;
use twitterapi_client::Tweet;

/// Tweets whose creation time is more than this many seconds in the past at
/// publish time get their note timestamp clamped to "now", so backdated or
/// clock-skewed items are not rejected by recency-sensitive consumers.
pub const STALE_CLAMP_SECS: i64 = 600;

const RETRACTION_CONTENT: &str = "Deleting outdated tweet version";

/// Resolve at most one media URL from the tweet's attachments.
///
/// Only the first media entry is considered: photos use their direct URL,
/// videos and animated gifs the highest-bitrate mp4 variant.
pub fn resolve_media_url(tweet: &Tweet) -> Option<String> {
    let media = tweet.extended_entities.as_ref()?.media.first()?;

    match media.media_type.as_str() {
        "photo" => media.media_url_https.clone(),
        "video" | "animated_gif" => media
            .video_info
            .as_ref()?
            .variants
            .iter()
            .filter(|v| v.content_type == "video/mp4")
            .max_by_key(|v| v.bitrate.unwrap_or(0))?
            .url
            .clone(),
        _ => None,
    }
}

/// Note body: the original text, the resolved media URL when there is one,
/// and the canonical link back to the tweet.
pub fn note_content(tweet: &Tweet) -> String {
    let media = resolve_media_url(tweet)
        .map(|url| format!("\n\n {url}"))
        .unwrap_or_default();
    format!("{}{}\n\n {}", tweet.text, media, tweet.url)
}

/// Build and sign the kind-1 note for a tweet.
pub fn build_post_event(tweet: &Tweet, keys: &Keys) -> Result<Event> {
    let now = Utc::now().timestamp();
    let tweet_ts = tweet.created_at().map(|dt| dt.timestamp()).unwrap_or(now);
    let created_at = if tweet_ts < now - STALE_CLAMP_SECS {
        now
    } else {
        tweet_ts
    };

    let tags = vec![
        Tag::reference(tweet.url.clone()),
        Tag::hashtag("toastr"),
        Tag::parse(["client", "twitter"]).context("Invalid client tag")?,
    ];

    let event = EventBuilder::new(Kind::TextNote, note_content(tweet))
        .tags(tags)
        .custom_created_at(Timestamp::from_secs(created_at.max(0) as u64))
        .sign_with_keys(keys)
        .context("Failed to sign note")?;
    Ok(event)
}

/// Build and sign the kind-0 profile metadata event for an identity.
pub fn build_profile_event(identity: &SigningIdentity, keys: &Keys) -> Result<Event> {
    let content = serde_json::json!({
        "name": identity.name,
        "display_name": identity.display_name,
        "picture": identity.picture,
    });

    let event = EventBuilder::new(Kind::Metadata, content.to_string())
        .sign_with_keys(keys)
        .context("Failed to sign profile")?;
    Ok(event)
}

/// Build and sign the kind-5 retraction referencing a previously published
/// note.
pub fn build_retraction_event(old_event_id: &str, keys: &Keys) -> Result<Event> {
    let old = EventId::from_hex(old_event_id).context("Invalid event id in record")?;

    let event = EventBuilder::new(Kind::EventDeletion, RETRACTION_CONTENT)
        .tag(Tag::event(old))
        .sign_with_keys(keys)
        .context("Failed to sign retraction")?;
    Ok(event)
}
