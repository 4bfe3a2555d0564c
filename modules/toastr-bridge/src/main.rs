use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toastr_bridge::publisher::NostrPublisher;
use toastr_bridge::Bridge;
use toastr_common::Config;
use toastr_store::{FileIdentityRepo, ProfileLog, TweetArchive, WatermarkStore};
use twitterapi_client::TwitterApiClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toastr=info".parse()?))
        .init();

    info!("Toastr bridge starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    let bridge = Arc::new(Bridge::new(
        Arc::new(TwitterApiClient::new(config.twitter_api_key.clone())),
        Arc::new(NostrPublisher::new(config.relay_url.clone())),
        Arc::new(FileIdentityRepo::open(&config.data_dir)),
        WatermarkStore::open(&config.data_dir),
        ProfileLog::open(&config.data_dir),
        TweetArchive::open(&config.data_dir),
        Arc::new(toastr_store::ledger_document(&config.data_dir)),
        config.sources.clone(),
        config.target_lang.clone(),
        config.fetch_concurrency,
    ));

    // First tick fires immediately, so the first cycle runs at startup.
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(config.run_interval_secs));
    loop {
        ticker.tick().await;
        match bridge.run_cycle().await {
            Ok(Some(stats)) => info!("Cycle finished. {stats}"),
            Ok(None) => {}
            // The only cycle error is an unusable ledger, and running
            // without dedup state would republish history. Exit instead of
            // ticking against the same document.
            Err(e) => {
                error!(error = %e, "Cycle aborted, shutting down");
                return Err(e);
            }
        }
    }
}
