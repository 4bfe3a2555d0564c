//! Per-cycle orchestration: fetch → filter → identity → profile → publish →
//! ledger commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use toastr_common::{DEFAULT_FLAG, SCHEMA_VERSION};
use toastr_store::{
    Document, IdentityRepo, PostedLedger, ProfileData, ProfileLog, PublicationRecord,
    SigningIdentity, TweetArchive, WatermarkStore,
};
use twitterapi_client::Tweet;

use crate::fetcher::{self, TweetSource};
use crate::filter;
use crate::note;
use crate::publisher::RelayPublisher;

/// Stats from one publish cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub fetched: usize,
    pub skipped: usize,
    pub already_posted: usize,
    pub published: usize,
    pub failed: usize,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Cycle Complete ===")?;
        writeln!(f, "Tweets fetched:   {}", self.fetched)?;
        writeln!(f, "Filtered out:     {}", self.skipped)?;
        writeln!(f, "Already posted:   {}", self.already_posted)?;
        writeln!(f, "Published:        {}", self.published)?;
        writeln!(f, "Failed:           {}", self.failed)?;
        Ok(())
    }
}

pub struct Bridge {
    source: Arc<dyn TweetSource>,
    publisher: Arc<dyn RelayPublisher>,
    identities: Arc<dyn IdentityRepo>,
    watermarks: WatermarkStore,
    profiles: ProfileLog,
    archive: TweetArchive,
    ledger_doc: Arc<dyn Document>,
    sources: Vec<String>,
    target_lang: String,
    concurrency: usize,
    /// Single-slot admission gate: at most one cycle in flight.
    running: AtomicBool,
}

impl Bridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn TweetSource>,
        publisher: Arc<dyn RelayPublisher>,
        identities: Arc<dyn IdentityRepo>,
        watermarks: WatermarkStore,
        profiles: ProfileLog,
        archive: TweetArchive,
        ledger_doc: Arc<dyn Document>,
        sources: Vec<String>,
        target_lang: String,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            publisher,
            identities,
            watermarks,
            profiles,
            archive,
            ledger_doc,
            sources,
            target_lang,
            concurrency,
            running: AtomicBool::new(false),
        }
    }

    /// Run one full cycle. A call while a cycle is already in flight is a
    /// no-op returning `Ok(None)` — reentrant starts neither queue nor fail.
    ///
    /// Errors surface only for unusable persisted dedup state; everything
    /// else is logged and skipped per item or per source.
    pub async fn run_cycle(&self) -> Result<Option<CycleStats>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Cycle already running, skipping");
            return Ok(None);
        }

        let result = self.run_cycle_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn run_cycle_inner(&self) -> Result<CycleStats> {
        let mut ledger = PostedLedger::load(Box::new(self.ledger_doc.clone()))
            .context("Publication ledger is unreadable")?;

        let mut stats = CycleStats::default();

        let mut tweets = fetcher::fetch_new_tweets(
            self.source.as_ref(),
            &self.watermarks,
            &self.sources,
            self.concurrency,
        )
        .await;
        stats.fetched = tweets.len();

        // Newest first. Soft prioritization only, nothing depends on it.
        tweets.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        for tweet in &tweets {
            if let Some(reason) = filter::evaluate(tweet, &self.target_lang) {
                info!(tweet_id = %tweet.id, %reason, "Skipping tweet");
                stats.skipped += 1;
                continue;
            }

            if ledger.contains(&tweet.id) {
                debug!(tweet_id = %tweet.id, "Already published");
                stats.already_posted += 1;
                continue;
            }

            match self.publish_one(tweet, &mut ledger).await {
                Ok(()) => stats.published += 1,
                Err(e) => {
                    warn!(tweet_id = %tweet.id, error = %e, "Failed to publish tweet");
                    stats.failed += 1;
                }
            }
        }

        // One durable rewrite per cycle, not per item.
        ledger
            .save()
            .context("Failed to persist publication ledger")?;

        Ok(stats)
    }

    /// Publish a single accepted tweet end to end. A ledger record is
    /// committed only after the relay accepted the note; on any failure the
    /// tweet stays eligible for the next cycle.
    async fn publish_one(&self, tweet: &Tweet, ledger: &mut PostedLedger) -> Result<()> {
        let handle = tweet
            .author_handle()
            .context("Tweet has no author handle")?;

        let identity = self.lookup_or_create_identity(handle, tweet)?;
        let keys = identity.keys()?;

        self.broadcast_profile_once(&identity, &keys).await;

        let event = note::build_post_event(tweet, &keys)?;
        self.publisher.publish(&event).await?;

        ledger.upsert(PublicationRecord {
            tweet_id: tweet.id.clone(),
            event_id: event.id.to_hex(),
            pubkey: identity.pubkey.clone(),
            seckey: identity.seckey.clone(),
            version: SCHEMA_VERSION,
            flag: DEFAULT_FLAG,
            pending: false,
        });

        // Archive after the publish succeeded: the archive is the migration
        // routine's replay source and must only contain published tweets.
        if let Err(e) = self.archive.append(tweet) {
            warn!(tweet_id = %tweet.id, error = %e, "Failed to archive tweet");
        }

        Ok(())
    }

    fn lookup_or_create_identity(&self, handle: &str, tweet: &Tweet) -> Result<SigningIdentity> {
        if let Some(identity) = self.identities.get(handle)? {
            return Ok(identity);
        }

        let author = tweet.author.as_ref();
        let profile = ProfileData {
            name: author.and_then(|a| a.name.clone()),
            display_name: None,
            picture: author.and_then(|a| a.profile_picture.clone()),
        };
        self.identities
            .create(handle, &profile)
            .with_context(|| format!("Identity creation failed for @{handle}"))
    }

    /// Broadcast the kind-0 profile for an identity exactly once per pubkey.
    /// Failures are logged and swallowed; a missing profile never blocks the
    /// note itself.
    async fn broadcast_profile_once(&self, identity: &SigningIdentity, keys: &nostr::Keys) {
        if self.profiles.contains(&identity.pubkey) {
            return;
        }

        let event = match note::build_profile_event(identity, keys) {
            Ok(event) => event,
            Err(e) => {
                warn!(handle = %identity.handle, error = %e, "Failed to build profile event");
                return;
            }
        };

        match self.publisher.publish(&event).await {
            Ok(()) => {
                if let Err(e) = self.profiles.mark(&identity.pubkey) {
                    warn!(handle = %identity.handle, error = %e, "Failed to record profile broadcast");
                }
                info!(handle = %identity.handle, "Published profile");
            }
            Err(e) => {
                warn!(handle = %identity.handle, error = %e, "Profile broadcast failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use nostr::{Event, Kind};
    use toastr_store::{MemoryDocument, MemoryIdentityRepo};

    use crate::fetcher::tests::{tweet, ScriptedSource};

    /// Publisher that records every event; can be told to fail.
    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<Event>>,
        fail: std::sync::atomic::AtomicBool,
        gate: Option<Arc<tokio::sync::Semaphore>>,
    }

    impl RecordingPublisher {
        fn new() -> Self {
            Self::default()
        }

        fn kind_count(&self, kind: Kind) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind == kind)
                .count()
        }
    }

    #[async_trait::async_trait]
    impl RelayPublisher for RecordingPublisher {
        async fn publish(&self, event: &Event) -> Result<()> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("relay unavailable");
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Harness {
        bridge: Bridge,
        publisher: Arc<RecordingPublisher>,
        ledger_doc: Arc<MemoryDocument>,
    }

    fn harness(source: ScriptedSource, publisher: RecordingPublisher) -> Harness {
        let publisher = Arc::new(publisher);
        let ledger_doc = Arc::new(MemoryDocument::new());
        let bridge = Bridge::new(
            Arc::new(source),
            publisher.clone(),
            Arc::new(MemoryIdentityRepo::new()),
            WatermarkStore::new(Box::new(MemoryDocument::new())),
            ProfileLog::new(Box::new(MemoryDocument::new())),
            TweetArchive::open(tempfile::tempdir().unwrap().keep()),
            ledger_doc.clone(),
            vec!["a".to_string()],
            "en".to_string(),
            2,
        );
        Harness {
            bridge,
            publisher,
            ledger_doc,
        }
    }

    fn ledger_records(doc: &Arc<MemoryDocument>) -> Vec<PublicationRecord> {
        match doc.read().unwrap() {
            Some(raw) => serde_json::from_str(&raw).unwrap(),
            None => Vec::new(),
        }
    }

    fn single_tweet_source() -> ScriptedSource {
        let source = ScriptedSource::new();
        source.push_page(
            "a",
            Ok(twitterapi_client::SearchPage {
                tweets: vec![tweet("T1", "a")],
                has_next_page: false,
                next_cursor: None,
            }),
        );
        source
    }

    #[tokio::test]
    async fn publishes_accepted_tweet_and_commits_record() {
        let h = harness(single_tweet_source(), RecordingPublisher::new());

        let stats = h.bridge.run_cycle().await.unwrap().expect("cycle ran");
        assert_eq!(stats.published, 1);
        assert_eq!(stats.failed, 0);

        // One profile broadcast plus one note.
        assert_eq!(h.publisher.kind_count(Kind::Metadata), 1);
        assert_eq!(h.publisher.kind_count(Kind::TextNote), 1);

        let records = ledger_records(&h.ledger_doc);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tweet_id, "T1");
        assert_eq!(records[0].version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn second_cycle_over_same_tweet_publishes_nothing() {
        let source = single_tweet_source();
        // Same tweet visible again on the next cycle.
        source.push_page(
            "a",
            Ok(twitterapi_client::SearchPage {
                tweets: vec![tweet("T1", "a")],
                has_next_page: false,
                next_cursor: None,
            }),
        );
        let h = harness(source, RecordingPublisher::new());

        h.bridge.run_cycle().await.unwrap();
        let stats = h.bridge.run_cycle().await.unwrap().expect("second cycle");

        assert_eq!(stats.already_posted, 1);
        assert_eq!(stats.published, 0);
        assert_eq!(h.publisher.kind_count(Kind::TextNote), 1);
    }

    #[tokio::test]
    async fn rejected_tweet_touches_neither_relay_nor_ledger() {
        let source = ScriptedSource::new();
        let mut reply = tweet("T2", "a");
        reply.is_reply = true;
        source.push_page(
            "a",
            Ok(twitterapi_client::SearchPage {
                tweets: vec![reply],
                has_next_page: false,
                next_cursor: None,
            }),
        );
        let h = harness(source, RecordingPublisher::new());

        let stats = h.bridge.run_cycle().await.unwrap().unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(h.publisher.events.lock().unwrap().is_empty());
        assert!(ledger_records(&h.ledger_doc).is_empty());
    }

    #[tokio::test]
    async fn publish_failure_leaves_tweet_eligible_for_retry() {
        let source = single_tweet_source();
        source.push_page(
            "a",
            Ok(twitterapi_client::SearchPage {
                tweets: vec![tweet("T1", "a")],
                has_next_page: false,
                next_cursor: None,
            }),
        );
        let publisher = RecordingPublisher::new();
        publisher.fail.store(true, Ordering::SeqCst);
        let h = harness(source, publisher);

        let stats = h.bridge.run_cycle().await.unwrap().unwrap();
        assert_eq!(stats.failed, 1);
        assert!(ledger_records(&h.ledger_doc).is_empty());

        // Relay recovers; the same tweet publishes on the next cycle.
        h.publisher.fail.store(false, Ordering::SeqCst);
        let stats = h.bridge.run_cycle().await.unwrap().unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(ledger_records(&h.ledger_doc).len(), 1);
    }

    #[tokio::test]
    async fn profile_broadcast_failure_does_not_block_the_note() {
        // Fail only the first publish call (the profile), then recover.
        struct FlakyFirst {
            inner: RecordingPublisher,
            remaining_failures: std::sync::atomic::AtomicUsize,
        }

        #[async_trait::async_trait]
        impl RelayPublisher for FlakyFirst {
            async fn publish(&self, event: &Event) -> Result<()> {
                if self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    anyhow::bail!("relay hiccup");
                }
                self.inner.publish(event).await
            }
        }

        let publisher = Arc::new(FlakyFirst {
            inner: RecordingPublisher::new(),
            remaining_failures: std::sync::atomic::AtomicUsize::new(1),
        });
        let ledger_doc = Arc::new(MemoryDocument::new());
        let bridge = Bridge::new(
            Arc::new(single_tweet_source()),
            publisher.clone(),
            Arc::new(MemoryIdentityRepo::new()),
            WatermarkStore::new(Box::new(MemoryDocument::new())),
            ProfileLog::new(Box::new(MemoryDocument::new())),
            TweetArchive::open(tempfile::tempdir().unwrap().keep()),
            ledger_doc.clone(),
            vec!["a".to_string()],
            "en".to_string(),
            2,
        );

        let stats = bridge.run_cycle().await.unwrap().unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(publisher.inner.kind_count(Kind::TextNote), 1);
        assert_eq!(publisher.inner.kind_count(Kind::Metadata), 0);
    }

    #[tokio::test]
    async fn reentrant_cycle_is_a_no_op() {
        let source = single_tweet_source();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let publisher = RecordingPublisher {
            gate: Some(gate.clone()),
            ..RecordingPublisher::new()
        };
        let h = harness(source, publisher);
        let bridge = Arc::new(h.bridge);

        let first = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.run_cycle().await })
        };

        // Wait until the first cycle is blocked inside a publish call.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = bridge.run_cycle().await.unwrap();
        assert!(second.is_none(), "reentrant call must be a no-op");

        gate.add_permits(10);
        let first = first.await.unwrap().unwrap();
        assert!(first.is_some(), "original cycle completes normally");
    }

    #[tokio::test]
    async fn corrupt_ledger_is_fatal_to_the_cycle() {
        let publisher = Arc::new(RecordingPublisher::new());
        let bridge = Bridge::new(
            Arc::new(ScriptedSource::new()),
            publisher,
            Arc::new(MemoryIdentityRepo::new()),
            WatermarkStore::new(Box::new(MemoryDocument::new())),
            ProfileLog::new(Box::new(MemoryDocument::new())),
            TweetArchive::open(tempfile::tempdir().unwrap().keep()),
            Arc::new(MemoryDocument::with_contents("{corrupt")),
            vec!["a".to_string()],
            "en".to_string(),
            2,
        );

        // The error must reach the caller so the daemon can exit instead of
        // ticking on without dedup state; the corrupt-store root cause stays
        // visible through the context chain.
        let err = bridge.run_cycle().await.err().expect("cycle must fail");
        assert!(matches!(
            err.downcast_ref::<toastr_store::StoreError>(),
            Some(toastr_store::StoreError::Corrupt { .. })
        ));
    }
}
