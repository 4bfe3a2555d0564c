//! Append-only raw tweet archive, partitioned by calendar day.
//!
//! One JSONL file per day (`tweet_logs/log-YYYY-MM-DD.json`), appended after
//! each successful publish. This is the source of truth the migration
//! routine replays from: a tweet missing here cannot be republished.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;
use twitterapi_client::Tweet;

use crate::error::Result;

const ARCHIVE_DIR: &str = "tweet_logs";

pub struct TweetArchive {
    dir: PathBuf,
}

impl TweetArchive {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(ARCHIVE_DIR),
        }
    }

    /// Append one tweet, verbatim, to today's partition.
    pub fn append(&self, tweet: &Tweet) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let day = Utc::now().format("%Y-%m-%d");
        let path = self.dir.join(format!("log-{day}.json"));

        let line = serde_json::to_string(tweet).expect("tweet serializes");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Load every archived tweet across all day partitions into an id-keyed
    /// map. Unparseable lines are warned about and skipped; they only make
    /// the affected tweets unmigratable, not the whole archive.
    pub fn load_all(&self) -> Result<std::collections::HashMap<String, Tweet>> {
        let mut tweets = std::collections::HashMap::new();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tweets),
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let contents = std::fs::read_to_string(&path)?;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<Tweet>(line) {
                    Ok(tweet) => {
                        tweets.insert(tweet.id.clone(), tweet);
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping unparseable archive line");
                    }
                }
            }
        }

        Ok(tweets)
    }
}
