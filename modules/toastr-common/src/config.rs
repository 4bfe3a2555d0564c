use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source API
    pub twitter_api_key: String,
    /// Handles to follow, from the comma-separated SOURCES var.
    pub sources: Vec<String>,

    // Nostr
    pub relay_url: String,

    // Pipeline
    pub target_lang: String,
    pub fetch_concurrency: usize,
    pub run_interval_secs: u64,

    // Storage
    pub data_dir: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let sources: Vec<String> = required_env("SOURCES")
            .split(',')
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if sources.is_empty() {
            panic!("SOURCES must list at least one handle");
        }

        Self {
            twitter_api_key: required_env("TWITTER_API_KEY"),
            sources,
            relay_url: required_env("RELAY_URL"),
            target_lang: env::var("TARGET_LANG").unwrap_or_else(|_| "en".to_string()),
            fetch_concurrency: env::var("FETCH_CONCURRENCY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("FETCH_CONCURRENCY must be a number"),
            run_interval_secs: env::var("RUN_INTERVAL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .expect("RUN_INTERVAL_SECS must be a number"),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        }
    }

    /// Log the non-secret configuration at startup.
    pub fn log_redacted(&self) {
        tracing::info!(
            sources = self.sources.len(),
            relay_url = %self.relay_url,
            target_lang = %self.target_lang,
            fetch_concurrency = self.fetch_concurrency,
            run_interval_secs = self.run_interval_secs,
            data_dir = %self.data_dir,
            "Configuration loaded"
        );
    }
}

/// Configuration for the offline migration binary. Only the relay and the
/// data directory are needed; no source API access is involved.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub relay_url: String,
    pub data_dir: String,
}

impl MigrateConfig {
    pub fn from_env() -> Self {
        Self {
            relay_url: required_env("RELAY_URL"),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
