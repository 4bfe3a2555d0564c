//! Relay transport: one connection per publish attempt, bounded in time.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use nostr::Event;
use nostr_sdk::Client;
use tracing::{debug, info};

/// Fixed budget for connect + publish + acknowledgement.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace delay before closing, letting in-flight acknowledgements land.
const CLOSE_GRACE: Duration = Duration::from_millis(1500);

#[async_trait::async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Publish one signed event. No automatic retry at this layer: a failure
    /// surfaces to the caller and the natural retry is the next cycle.
    async fn publish(&self, event: &Event) -> Result<()>;
}

/// nostr-sdk backed publisher. Opens the relay connection, sends, waits for
/// the acknowledgement (or the timeout) and closes again.
pub struct NostrPublisher {
    relay_url: String,
}

impl NostrPublisher {
    pub fn new(relay_url: String) -> Self {
        Self { relay_url }
    }
}

#[async_trait::async_trait]
impl RelayPublisher for NostrPublisher {
    async fn publish(&self, event: &Event) -> Result<()> {
        let client = Client::default();
        client
            .add_relay(&self.relay_url)
            .await
            .context("Failed to add relay")?;
        client.connect().await;
        debug!(relay = %self.relay_url, "Connected to relay");

        let sent = tokio::time::timeout(PUBLISH_TIMEOUT, client.send_event(event)).await;

        let result = match sent {
            Err(_) => Err(anyhow!(
                "Relay publish timed out after {}s",
                PUBLISH_TIMEOUT.as_secs()
            )),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Relay rejected event")),
            Ok(Ok(output)) => {
                if output.success.is_empty() {
                    Err(anyhow!("Relay did not accept event: {:?}", output.failed))
                } else {
                    info!(
                        relay = %self.relay_url,
                        event_id = %event.id,
                        "Published event"
                    );
                    tokio::time::sleep(CLOSE_GRACE).await;
                    Ok(())
                }
            }
        };

        client.disconnect().await;
        result
    }
}
