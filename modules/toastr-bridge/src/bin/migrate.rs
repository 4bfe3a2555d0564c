//! Offline migration entrypoint: retracts and republishes every note whose
//! publication record predates the current transformation schema version.
//! Run while the bridge daemon is stopped; both rewrite the same ledger.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toastr_bridge::migrate::run_migration;
use toastr_bridge::publisher::NostrPublisher;
use toastr_common::{MigrateConfig, SCHEMA_VERSION};
use toastr_store::{PostedLedger, TweetArchive};

#[derive(Parser, Debug)]
#[command(name = "toastr-migrate", about = "Republish notes under the current schema version")]
struct Args {
    /// Only migrate records carrying this migration flag value.
    #[arg(long)]
    flag: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toastr=info".parse()?))
        .init();

    let args = Args::parse();
    let config = MigrateConfig::from_env();

    info!(
        data_dir = %config.data_dir,
        relay_url = %config.relay_url,
        version = SCHEMA_VERSION,
        flag = ?args.flag,
        "Toastr migration starting..."
    );

    let mut ledger = PostedLedger::open(&config.data_dir)?;
    let archive = TweetArchive::open(&config.data_dir);
    let publisher = NostrPublisher::new(config.relay_url.clone());

    let stats = run_migration(SCHEMA_VERSION, args.flag, &mut ledger, &archive, &publisher).await?;
    info!("Migration finished. {stats}");

    Ok(())
}
