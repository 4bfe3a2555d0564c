//! Schema-version migration: retract and republish notes whose records were
//! written under an older transformation version.
//!
//! For each outdated record the original tweet is replayed from the archive,
//! a kind-5 retraction of the old note goes out first, then the tweet is
//! re-transformed and republished under the same keypair. The record is
//! rewritten in place, so a migrated tweet still has exactly one active
//! event id.

use anyhow::{Context, Result};
use nostr::Keys;
use tracing::{info, warn};

use toastr_common::DEFAULT_FLAG;
use toastr_store::{PostedLedger, PublicationRecord, TweetArchive};

use crate::note;
use crate::publisher::RelayPublisher;

/// Stats from one migration run.
#[derive(Debug, Default)]
pub struct MigrationStats {
    pub outdated: usize,
    pub migrated: usize,
    pub missing: usize,
    pub failed: usize,
}

impl std::fmt::Display for MigrationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Migration Complete ===")?;
        writeln!(f, "Outdated records: {}", self.outdated)?;
        writeln!(f, "Migrated:         {}", self.migrated)?;
        writeln!(f, "Missing archive:  {}", self.missing)?;
        writeln!(f, "Failed:           {}", self.failed)?;
        Ok(())
    }
}

/// Migrate every record older than `current_version`, optionally restricted
/// to records carrying one flag value. Records are processed in tweet-id
/// order, so an interrupted run resumes deterministically.
///
/// Per-record failures are logged and leave that record untouched for a
/// rerun; the ledger is saved after every successful migration so a crash
/// mid-run never forgets an already-republished note.
pub async fn run_migration(
    current_version: u32,
    flag_filter: Option<u32>,
    ledger: &mut PostedLedger,
    archive: &TweetArchive,
    publisher: &dyn RelayPublisher,
) -> Result<MigrationStats> {
    let archived = archive.load_all().context("Failed to load tweet archive")?;
    let outdated = ledger.outdated(current_version, flag_filter);

    let mut stats = MigrationStats {
        outdated: outdated.len(),
        ..MigrationStats::default()
    };
    info!(
        count = outdated.len(),
        current_version, "Starting migration"
    );

    for record in outdated {
        let Some(tweet) = archived.get(&record.tweet_id) else {
            warn!(tweet_id = %record.tweet_id, "Tweet absent from archive, cannot migrate");
            stats.missing += 1;
            continue;
        };

        match migrate_record(&record, tweet, publisher).await {
            Ok(new_event_id) => {
                ledger.upsert(PublicationRecord {
                    event_id: new_event_id,
                    version: current_version,
                    flag: flag_filter.unwrap_or(DEFAULT_FLAG),
                    ..record.clone()
                });
                ledger
                    .save()
                    .context("Failed to persist ledger after migration")?;
                info!(tweet_id = %record.tweet_id, "Migrated record");
                stats.migrated += 1;
            }
            Err(e) => {
                warn!(tweet_id = %record.tweet_id, error = %e, "Migration failed, record kept as-is");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

/// Retract the old note and republish the tweet. Returns the new event id.
async fn migrate_record(
    record: &PublicationRecord,
    tweet: &twitterapi_client::Tweet,
    publisher: &dyn RelayPublisher,
) -> Result<String> {
    let keys = Keys::parse(&record.seckey).context("Record holds an unparseable secret key")?;

    let retraction = note::build_retraction_event(&record.event_id, &keys)?;
    publisher
        .publish(&retraction)
        .await
        .context("Retraction publish failed")?;

    let replacement = note::build_post_event(tweet, &keys)?;
    publisher
        .publish(&replacement)
        .await
        .context("Replacement publish failed")?;

    Ok(replacement.id.to_hex())
}
