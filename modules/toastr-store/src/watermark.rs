//! Per-source "last observed time" cursor map.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::document::{Document, FileDocument};
use crate::error::Result;

const WATERMARK_FILE: &str = "latest-fetched-times.json";

/// Durable map of source handle to last-observed time. A corrupt or missing
/// document reads as empty: losing the watermark only widens the next fetch
/// back to the bounded default window, never breaks dedup.
pub struct WatermarkStore {
    doc: Box<dyn Document>,
}

impl WatermarkStore {
    pub fn new(doc: Box<dyn Document>) -> Self {
        Self { doc }
    }

    /// Production store under the data directory.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::new(Box::new(FileDocument::new(
            data_dir.as_ref().join(WATERMARK_FILE),
        )))
    }

    pub fn get(&self, source: &str) -> Option<DateTime<Utc>> {
        self.load().get(source).copied()
    }

    /// Advance the watermark for one source to now. Never moves backwards.
    pub fn advance_to_now(&self, source: &str) -> Result<()> {
        let now = Utc::now();
        let mut times = self.load();
        match times.get(source) {
            Some(current) if *current >= now => return Ok(()),
            _ => {}
        }
        times.insert(source.to_string(), now);
        self.save(&times)
    }

    fn load(&self) -> BTreeMap<String, DateTime<Utc>> {
        let raw = match self.doc.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read watermark store, treating as empty");
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(times) => times,
            Err(e) => {
                warn!(error = %e, "Corrupt watermark store, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn save(&self, times: &BTreeMap<String, DateTime<Utc>>) -> Result<()> {
        let raw = serde_json::to_string_pretty(times).expect("watermark map serializes");
        self.doc.write(&raw)
    }
}
