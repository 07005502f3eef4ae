//! One-shot poll: fetch stored notifications without streaming state.
//!
//! Reuses the filter builder and rule engine; a throwaway client fetches
//! whatever the relays currently hold for the filter set, dedups by id,
//! and returns the classified notifications oldest-first.

use nostr_sdk::prelude::*;

use crate::config::InboxConfig;
use crate::constants::{DEFAULT_LOOKBACK_SECS, QUERY_TIMEOUT};
use crate::dedup::DedupWindow;
use crate::error::InboxError;
use crate::filters::build_filters;
use crate::models::Notification;

pub async fn poll(config: &InboxConfig) -> Result<Vec<Notification>, InboxError> {
    if config.pubkey.trim().is_empty() {
        return Err(InboxError::Config(
            "watcher pubkey is required (set `pubkey` or $NOSTR_PUBKEY)".to_string(),
        ));
    }
    let watcher = PublicKey::parse(config.pubkey.trim())
        .map_err(|e| InboxError::Config(format!("invalid watcher pubkey: {e}")))?;

    let since = Timestamp::from(
        config
            .since
            .unwrap_or_else(|| Timestamp::now().as_u64() - DEFAULT_LOOKBACK_SECS),
    );

    let client = Client::builder().build();
    for url in &config.relays {
        client.add_relay(url).await.map_err(|e| InboxError::Connect {
            relay: url.clone(),
            reason: e.to_string(),
        })?;
    }
    client.connect().await;

    let mut dedup = DedupWindow::new();
    let mut notifications = Vec::new();
    for filter in build_filters(&watcher, &config.channels, Some(since)) {
        let events = client
            .fetch_events(filter, QUERY_TIMEOUT)
            .await
            .map_err(|e| InboxError::Timeout(format!("stored-event query failed: {e}")))?;
        for event in events {
            if dedup.insert(event.id.to_hex()) {
                notifications.push(Notification::from_event(&event, &watcher));
            }
        }
    }
    client.disconnect().await;

    notifications.sort_by_key(|n| n.created_at);
    Ok(notifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_requires_identity() {
        let result = poll(&InboxConfig::default()).await;
        assert!(matches!(result, Err(InboxError::Config(_))));
    }
}
