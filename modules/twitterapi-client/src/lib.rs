pub mod error;
pub mod types;

pub use error::{Result, TwitterApiError};
pub use types::{
    ExtendedEntities, MediaEntity, SearchPage, Tweet, TweetAuthor, VideoInfo, VideoVariant,
};

use chrono::{DateTime, Utc};

const BASE_URL: &str = "https://api.twitterapi.io/twitter/tweet/advanced_search";

pub struct TwitterApiClient {
    client: reqwest::Client,
    api_key: String,
}

impl TwitterApiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Fetch one page of advanced-search results, optionally resuming from a
    /// continuation cursor returned by the previous page.
    pub async fn search_page(&self, query: &str, cursor: Option<&str>) -> Result<SearchPage> {
        let mut params = vec![("queryType", "Latest"), ("query", query)];
        if let Some(c) = cursor {
            params.push(("cursor", c));
        }

        let resp = self
            .client
            .get(BASE_URL)
            .header("X-API-Key", &self.api_key)
            .query(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitterApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let page: SearchPage = resp.json().await?;
        tracing::debug!(
            query,
            tweets = page.tweets.len(),
            has_next_page = page.has_next_page,
            "Fetched search page"
        );
        Ok(page)
    }
}

/// Build the search query for one handle: tweets from that account since the
/// watermark, with replies and retweets excluded server-side.
pub fn source_query(handle: &str, since: DateTime<Utc>) -> String {
    format!(
        "from:{} since:{} -filter:replies -filter:retweets",
        handle,
        search_timestamp(since)
    )
}

/// Render a timestamp in the `YYYY-MM-DD_HH:MM:SS_UTC` form the search
/// endpoint expects for `since:` operators.
pub fn search_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d_%H:%M:%S_UTC").to_string()
}
