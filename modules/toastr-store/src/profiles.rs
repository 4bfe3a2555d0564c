//! Profile-broadcast log: which pubkeys have had their kind-0 metadata
//! published to the relay. Checked before every broadcast attempt, so a
//! lost log only costs a harmless re-broadcast.

use std::path::Path;

use tracing::warn;

use crate::document::{Document, FileDocument};
use crate::error::Result;

const PROFILES_FILE: &str = "published-profiles.json";

pub struct ProfileLog {
    doc: Box<dyn Document>,
}

impl ProfileLog {
    pub fn new(doc: Box<dyn Document>) -> Self {
        Self { doc }
    }

    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::new(Box::new(FileDocument::new(
            data_dir.as_ref().join(PROFILES_FILE),
        )))
    }

    pub fn contains(&self, pubkey: &str) -> bool {
        self.load().iter().any(|p| p == pubkey)
    }

    /// Record a successful broadcast. Idempotent.
    pub fn mark(&self, pubkey: &str) -> Result<()> {
        let mut published = self.load();
        if published.iter().any(|p| p == pubkey) {
            return Ok(());
        }
        published.push(pubkey.to_string());
        let raw = serde_json::to_string_pretty(&published).expect("pubkey list serializes");
        self.doc.write(&raw)
    }

    fn load(&self) -> Vec<String> {
        let raw = match self.doc.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read profile log, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(published) => published,
            Err(e) => {
                warn!(error = %e, "Corrupt profile log, treating as empty");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;

    #[test]
    fn mark_then_contains() {
        let log = ProfileLog::new(Box::new(MemoryDocument::new()));
        assert!(!log.contains("pk1"));

        log.mark("pk1").unwrap();
        assert!(log.contains("pk1"));
        assert!(!log.contains("pk2"));
    }

    #[test]
    fn mark_is_idempotent() {
        let log = ProfileLog::new(Box::new(MemoryDocument::new()));
        log.mark("pk1").unwrap();
        log.mark("pk1").unwrap();

        let raw = log.doc.read().unwrap().unwrap();
        let list: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(list, vec!["pk1"]);
    }

    #[test]
    fn corrupt_log_reads_empty() {
        let log = ProfileLog::new(Box::new(MemoryDocument::with_contents("][")));
        assert!(!log.contains("pk1"));
        log.mark("pk1").unwrap();
        assert!(log.contains("pk1"));
    }
}
