//! The relay transport boundary.
//!
//! Everything the inbox needs from a relay is connect / subscribe / a
//! stream of incoming messages / close. The traits here keep the peer
//! state machine independent of the wire protocol: production uses
//! [`SdkConnector`] (one `nostr-sdk` client per relay), tests script a
//! fake.

use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast;

use crate::error::InboxError;

/// One message from a subscribed relay.
#[derive(Debug)]
pub enum RelayIncoming {
    /// A raw event. Signature validation already happened in the
    /// transport layer.
    Event(Box<Event>),
    /// The relay finished replaying stored events for the subscription.
    EndOfStored,
}

#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Open a connection to `url`, bounded by `timeout`.
    async fn connect(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RelayConnection>, InboxError>;
}

#[async_trait]
pub trait RelayConnection: Send {
    /// Issue the filter set. Filters OR together on the relay side.
    async fn subscribe(&mut self, filters: Vec<Filter>) -> Result<(), InboxError>;

    /// Next incoming message; `None` means the connection is gone and the
    /// caller should reconnect.
    async fn next_incoming(&mut self) -> Option<RelayIncoming>;

    /// Best-effort close.
    async fn close(&mut self);
}

/// Production connector: a single-relay `nostr-sdk` client per peer, so
/// the inbox owns reconnect policy instead of the pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SdkConnector;

#[async_trait]
impl RelayConnector for SdkConnector {
    async fn connect(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RelayConnection>, InboxError> {
        let client = Client::builder().build();
        client
            .add_relay(url)
            .await
            .map_err(|e| InboxError::Connect {
                relay: url.to_string(),
                reason: e.to_string(),
            })?;

        // `connect` returns once attempts are spawned; poll until the
        // relay actually reports connected or the bound elapses.
        let connected = tokio::time::timeout(timeout, async {
            client.connect().await;
            loop {
                let relays = client.relays().await;
                if relays
                    .values()
                    .any(|r| r.status() == nostr_sdk::RelayStatus::Connected)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        if connected.is_err() {
            client.disconnect().await;
            return Err(InboxError::Connect {
                relay: url.to_string(),
                reason: format!("no connection within {timeout:?}"),
            });
        }

        let notifications = client.notifications();
        Ok(Box::new(SdkConnection {
            url: url.to_string(),
            client,
            notifications,
        }))
    }
}

struct SdkConnection {
    url: String,
    client: Client,
    notifications: broadcast::Receiver<RelayPoolNotification>,
}

#[async_trait]
impl RelayConnection for SdkConnection {
    async fn subscribe(&mut self, filters: Vec<Filter>) -> Result<(), InboxError> {
        for filter in filters {
            self.client
                .subscribe(filter, None)
                .await
                .map_err(|e| InboxError::Connect {
                    relay: self.url.clone(),
                    reason: format!("subscribe failed: {e}"),
                })?;
        }
        Ok(())
    }

    async fn next_incoming(&mut self) -> Option<RelayIncoming> {
        loop {
            match self.notifications.recv().await {
                Ok(RelayPoolNotification::Event { event, .. }) => {
                    return Some(RelayIncoming::Event(event));
                }
                Ok(RelayPoolNotification::Message { message, .. }) => {
                    if let RelayMessage::EndOfStoredEvents(_) = message {
                        return Some(RelayIncoming::EndOfStored);
                    }
                }
                Ok(RelayPoolNotification::Shutdown) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(relay = %self.url, skipped, "notification stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) {
        self.client.disconnect().await;
    }
}
