//! Idempotency ledger: one publication record per tweet id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::{Document, FileDocument};
use crate::error::{Result, StoreError};

const LEDGER_FILE: &str = "posted-log.json";

/// The ledger's backing document under the data directory, for callers that
/// reload the ledger per cycle instead of holding it open.
pub fn ledger_document(data_dir: impl AsRef<Path>) -> FileDocument {
    FileDocument::new(data_dir.as_ref().join(LEDGER_FILE))
}

/// Record of one published tweet. Overwritten in place on migration; at most
/// one active event id per tweet id at any time.
///
/// The signing keys are stored inline so the migration routine can retract
/// and republish without resolving the author's identity file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationRecord {
    #[serde(rename = "tweetId")]
    pub tweet_id: String,
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub pubkey: String,
    #[serde(rename = "privkey")]
    pub seckey: String,
    /// Transformation schema version this record was published under.
    pub version: u32,
    /// Operator-assigned migration flag, used to select record subsets.
    pub flag: u32,
    /// Retry marker slot; currently always false.
    #[serde(default)]
    pub pending: bool,
}

/// The full publication-record set, loaded once per cycle and rewritten as a
/// whole. An unreadable or unparseable document is fatal: running with a
/// partial ledger would republish everything it lost.
pub struct PostedLedger {
    doc: Box<dyn Document>,
    records: BTreeMap<String, PublicationRecord>,
}

impl PostedLedger {
    pub fn load(doc: Box<dyn Document>) -> Result<Self> {
        let records = match doc.read()? {
            None => BTreeMap::new(),
            Some(raw) => {
                let list: Vec<PublicationRecord> =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                        name: LEDGER_FILE.to_string(),
                        message: e.to_string(),
                    })?;
                list.into_iter().map(|r| (r.tweet_id.clone(), r)).collect()
            }
        };
        Ok(Self { doc, records })
    }

    /// Production ledger under the data directory.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(Box::new(FileDocument::new(
            data_dir.as_ref().join(LEDGER_FILE),
        )))
    }

    pub fn contains(&self, tweet_id: &str) -> bool {
        self.records.contains_key(tweet_id)
    }

    pub fn get(&self, tweet_id: &str) -> Option<&PublicationRecord> {
        self.records.get(tweet_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or overwrite the record for its tweet id.
    pub fn upsert(&mut self, record: PublicationRecord) {
        self.records.insert(record.tweet_id.clone(), record);
    }

    /// Records published under a schema version older than `current`,
    /// optionally restricted to one migration flag value.
    pub fn outdated(&self, current: u32, flag_filter: Option<u32>) -> Vec<PublicationRecord> {
        self.records
            .values()
            .filter(|r| r.version < current)
            .filter(|r| flag_filter.is_none_or(|f| r.flag == f))
            .cloned()
            .collect()
    }

    /// Rewrite the full record set to durable storage.
    pub fn save(&self) -> Result<()> {
        let list: Vec<&PublicationRecord> = self.records.values().collect();
        let raw = serde_json::to_string_pretty(&list).expect("records serialize");
        self.doc.write(&raw)
    }
}
