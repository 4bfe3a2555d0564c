//! Bounded-concurrency multi-source fetch.
//!
//! One pagination loop per followed handle, at most `concurrency` in flight;
//! a finishing source immediately admits the next queued one, so a fast
//! source never waits on a slow sibling in the same batch.

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use toastr_store::WatermarkStore;
use twitterapi_client::{source_query, SearchPage, Tweet, TwitterApiClient};

/// How far back a never-seen source is fetched: one hour, so adding a
/// source backfills a bounded recent window instead of its whole history.
pub const BACKFILL_WINDOW_SECS: i64 = 3600;

/// Seam over the search API so the fetcher and pipeline can run against a
/// scripted source in tests.
#[async_trait::async_trait]
pub trait TweetSource: Send + Sync {
    async fn search_page(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> twitterapi_client::Result<SearchPage>;
}

#[async_trait::async_trait]
impl TweetSource for TwitterApiClient {
    async fn search_page(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> twitterapi_client::Result<SearchPage> {
        TwitterApiClient::search_page(self, query, cursor).await
    }
}

/// Fetch the unordered union of new tweets across all sources.
///
/// A failing source contributes whatever pages it managed before the
/// failure and never cancels its siblings.
pub async fn fetch_new_tweets(
    source: &dyn TweetSource,
    watermarks: &WatermarkStore,
    handles: &[String],
    concurrency: usize,
) -> Vec<Tweet> {
    // Built eagerly into a Vec (futures are inert until polled) to keep the
    // borrowing closure's type out of the outer future, which otherwise trips
    // rustc's higher-ranked lifetime inference when that future is spawned.
    let fetches: Vec<_> = handles
        .iter()
        .map(|handle| fetch_source(source, watermarks, handle))
        .collect();
    let results: Vec<Vec<Tweet>> = stream::iter(fetches)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let tweets: Vec<Tweet> = results.into_iter().flatten().collect();
    info!(total = tweets.len(), sources = handles.len(), "Fetch cycle complete");
    tweets
}

/// Paginate one source from its watermark until the API reports no further
/// pages or a page fails.
///
/// The watermark advances to "now" on every successful page, even an empty
/// or non-final one. A mid-pagination failure therefore still advances it:
/// the narrow risk of skipping undelivered pages is traded for never
/// re-scanning a source from the same watermark indefinitely.
async fn fetch_source(
    source: &dyn TweetSource,
    watermarks: &WatermarkStore,
    handle: &str,
) -> Vec<Tweet> {
    let since = watermarks
        .get(handle)
        .unwrap_or_else(|| Utc::now() - Duration::seconds(BACKFILL_WINDOW_SECS));
    let query = source_query(handle, since);

    let mut tweets = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        match source.search_page(&query, cursor.as_deref()).await {
            Ok(page) => {
                if let Err(e) = watermarks.advance_to_now(handle) {
                    warn!(handle, error = %e, "Failed to advance watermark");
                }
                tweets.extend(page.tweets);

                match (page.has_next_page, page.next_cursor) {
                    (true, Some(next)) => cursor = Some(next),
                    _ => break,
                }
            }
            Err(e) => {
                warn!(handle, error = %e, "Page fetch failed, keeping pages collected so far");
                break;
            }
        }
    }

    info!(handle, count = tweets.len(), "Fetched source");
    tweets
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use chrono::NaiveDateTime;
    use toastr_store::MemoryDocument;
    use twitterapi_client::TwitterApiError;

    /// Scripted source: a queue of page results per handle, plus a call log.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pages: Mutex<HashMap<String, VecDeque<twitterapi_client::Result<SearchPage>>>>,
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) queries: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push_page(&self, handle: &str, page: twitterapi_client::Result<SearchPage>) {
            self.pages
                .lock()
                .unwrap()
                .entry(handle.to_string())
                .or_default()
                .push_back(page);
        }

        fn handle_of(query: &str) -> String {
            query
                .split_whitespace()
                .next()
                .and_then(|t| t.strip_prefix("from:"))
                .unwrap_or(query)
                .to_string()
        }
    }

    #[async_trait::async_trait]
    impl TweetSource for ScriptedSource {
        async fn search_page(
            &self,
            query: &str,
            _cursor: Option<&str>,
        ) -> twitterapi_client::Result<SearchPage> {
            let handle = Self::handle_of(query);
            self.calls.lock().unwrap().push(handle.clone());
            self.queries.lock().unwrap().push(query.to_string());
            self.pages
                .lock()
                .unwrap()
                .get_mut(&handle)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| {
                    Ok(SearchPage {
                        tweets: vec![],
                        has_next_page: false,
                        next_cursor: None,
                    })
                })
        }
    }

    pub(crate) fn tweet(id: &str, handle: &str) -> Tweet {
        serde_json::from_str(&format!(
            r#"{{
                "id": "{id}",
                "url": "https://x.com/{handle}/status/{id}",
                "text": "tweet {id}",
                "createdAt": "Tue Dec 10 07:00:30 +0000 2024",
                "author": {{"userName": "{handle}", "name": "Name {handle}", "profilePicture": "https://pbs.example/{handle}.jpg"}},
                "lang": "en"
            }}"#
        ))
        .unwrap()
    }

    fn page(tweets: Vec<Tweet>, next: Option<&str>) -> SearchPage {
        SearchPage {
            tweets,
            has_next_page: next.is_some(),
            next_cursor: next.map(String::from),
        }
    }

    fn memory_watermarks() -> WatermarkStore {
        WatermarkStore::new(Box::new(MemoryDocument::new()))
    }

    #[tokio::test]
    async fn paginates_until_exhausted() {
        let source = ScriptedSource::new();
        source.push_page("a", Ok(page(vec![tweet("1", "a")], Some("c1"))));
        source.push_page("a", Ok(page(vec![tweet("2", "a"), tweet("3", "a")], None)));

        let watermarks = memory_watermarks();
        let tweets =
            fetch_new_tweets(&source, &watermarks, &["a".to_string()], 5).await;

        assert_eq!(tweets.len(), 3);
        assert_eq!(source.calls.lock().unwrap().len(), 2);
        assert!(watermarks.get("a").is_some());
    }

    #[tokio::test]
    async fn concurrency_one_finishes_a_source_before_the_next() {
        let source = ScriptedSource::new();
        source.push_page("a", Ok(page(vec![tweet("1", "a")], Some("c1"))));
        source.push_page("a", Ok(page(vec![tweet("2", "a")], None)));
        source.push_page("b", Ok(page(vec![tweet("3", "b")], None)));

        let watermarks = memory_watermarks();
        fetch_new_tweets(
            &source,
            &watermarks,
            &["a".to_string(), "b".to_string()],
            1,
        )
        .await;

        let calls = source.calls.lock().unwrap();
        assert_eq!(*calls, vec!["a", "a", "b"]);
    }

    #[tokio::test]
    async fn one_failing_source_does_not_cancel_siblings() {
        let source = ScriptedSource::new();
        source.push_page(
            "bad",
            Err(TwitterApiError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        );
        source.push_page("good", Ok(page(vec![tweet("1", "good")], None)));

        let watermarks = memory_watermarks();
        let tweets = fetch_new_tweets(
            &source,
            &watermarks,
            &["bad".to_string(), "good".to_string()],
            5,
        )
        .await;

        assert_eq!(tweets.len(), 1);
        assert_eq!(tweets[0].id, "1");
    }

    #[tokio::test]
    async fn partial_pages_survive_a_mid_pagination_failure() {
        let source = ScriptedSource::new();
        source.push_page("a", Ok(page(vec![tweet("1", "a")], Some("c1"))));
        source.push_page(
            "a",
            Err(TwitterApiError::Network("reset".to_string())),
        );

        let watermarks = memory_watermarks();
        let tweets =
            fetch_new_tweets(&source, &watermarks, &["a".to_string()], 5).await;

        assert_eq!(tweets.len(), 1);
        // The successful first page still advanced the watermark.
        assert!(watermarks.get("a").is_some());
    }

    #[tokio::test]
    async fn absent_watermark_backfills_one_hour() {
        let source = ScriptedSource::new();
        let watermarks = memory_watermarks();
        let before = Utc::now();

        fetch_new_tweets(&source, &watermarks, &["a".to_string()], 5).await;

        let queries = source.queries.lock().unwrap();
        let since_raw = queries[0]
            .split_whitespace()
            .find_map(|t| t.strip_prefix("since:"))
            .expect("query has since:");
        let since = NaiveDateTime::parse_from_str(since_raw, "%Y-%m-%d_%H:%M:%S_UTC")
            .expect("parseable since")
            .and_utc();

        let expected = before - Duration::seconds(BACKFILL_WINDOW_SECS);
        let drift = (since - expected).num_seconds().abs();
        assert!(drift <= 5, "since drifted {drift}s from the 1h window");
    }

    #[tokio::test]
    async fn first_page_failure_leaves_watermark_unset() {
        // A source whose very first page fails gets no watermark advance.
        let source = ScriptedSource::new();
        source.push_page(
            "a",
            Err(TwitterApiError::Network("down".to_string())),
        );

        let watermarks = memory_watermarks();
        fetch_new_tweets(&source, &watermarks, &["a".to_string()], 5).await;
        assert!(watermarks.get("a").is_none());
    }
}
