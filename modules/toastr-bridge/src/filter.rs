//! Pure accept/skip decision, applied once per fetched tweet before any
//! identity or network side effect.

use std::fmt;

use twitterapi_client::Tweet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Reply,
    Repost,
    Language,
    Card,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Reply => write!(f, "reply"),
            SkipReason::Repost => write!(f, "repost"),
            SkipReason::Language => write!(f, "language"),
            SkipReason::Card => write!(f, "card"),
        }
    }
}

/// Returns the reason to skip this tweet, or None to accept it.
///
/// Media presence is deliberately not a rejection reason: tweets with media
/// are accepted and the transform surfaces a single best media URL instead.
pub fn evaluate(tweet: &Tweet, target_lang: &str) -> Option<SkipReason> {
    if tweet.is_reply {
        return Some(SkipReason::Reply);
    }
    if tweet.retweeted_tweet.is_some() {
        return Some(SkipReason::Repost);
    }
    if tweet.lang.as_deref() != Some(target_lang) {
        return Some(SkipReason::Language);
    }
    if tweet.card.is_some() {
        return Some(SkipReason::Card);
    }
    None
}
