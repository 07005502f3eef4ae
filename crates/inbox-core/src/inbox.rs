//! The inbox façade: wires peers, ingestion, the bus, and optional
//! webhook delivery together.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusEvent, LifecycleEvent, NotificationBus, Subscription, Topic};
use crate::config::{InboxConfig, WebhookConfig};
use crate::constants::{DEFAULT_LOOKBACK_SECS, DEFAULT_RELAYS};
use crate::error::InboxError;
use crate::ingest::Ingestor;
use crate::models::{Notification, NotificationType};
use crate::relay::peer::{run_peer, PeerContext};
use crate::relay::{RelayConnector, SdkConnector};
use crate::webhook::WebhookSink;

/// A running (or startable) notification inbox for one watcher identity.
///
/// Create with [`Inbox::new`], call [`Inbox::start`] to begin streaming,
/// observe through the bus (`subscribe`, `wait_for`, `collect`, a config
/// callback, or an attached webhook), and [`Inbox::stop`] to tear down.
/// Nothing is persisted across stop.
pub struct Inbox {
    config: InboxConfig,
    watcher: PublicKey,
    bus: NotificationBus,
    ingest: Ingestor,
    connector: Arc<dyn RelayConnector>,
    running: watch::Sender<bool>,
    peers: Mutex<Vec<JoinHandle<()>>>,
}

impl Inbox {
    /// Validate the configuration and build an inbox. The watcher pubkey
    /// is the only required field; a missing or unparseable identity is
    /// the one fatal error in the system.
    pub fn new(config: InboxConfig) -> Result<Self, InboxError> {
        Self::with_connector(config, Arc::new(SdkConnector))
    }

    pub(crate) fn with_connector(
        mut config: InboxConfig,
        connector: Arc<dyn RelayConnector>,
    ) -> Result<Self, InboxError> {
        if config.pubkey.trim().is_empty() {
            return Err(InboxError::Config(
                "watcher pubkey is required (set `pubkey` or $NOSTR_PUBKEY)".to_string(),
            ));
        }
        let watcher = PublicKey::parse(config.pubkey.trim())
            .map_err(|e| InboxError::Config(format!("invalid watcher pubkey: {e}")))?;

        if config.relays.is_empty() {
            config.relays = DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect();
        }

        let watermark = match config.since {
            Some(since) => Timestamp::from(since),
            None => Timestamp::now() - DEFAULT_LOOKBACK_SECS,
        };

        let bus = NotificationBus::new();
        let ingest = Ingestor::new(
            bus.clone(),
            watcher,
            watermark,
            config.dedup,
            config.on_notification.clone(),
        );
        let (running, _) = watch::channel(false);

        Ok(Self {
            config,
            watcher,
            bus,
            ingest,
            connector,
            running,
            peers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn one connection task per relay and begin streaming. Calling
    /// start on a running inbox is a no-op.
    pub fn start(&self) {
        {
            let mut peers = self.peers.lock();
            if !peers.is_empty() {
                return;
            }
            self.running.send_replace(true);

            for url in &self.config.relays {
                let ctx = PeerContext {
                    url: url.clone(),
                    connector: self.connector.clone(),
                    ingest: self.ingest.clone(),
                    bus: self.bus.clone(),
                    watcher: self.watcher,
                    channels: self.config.channels.clone(),
                    connect_timeout: self.config.connect_timeout,
                    reconnect_delay: self.config.reconnect_delay,
                };
                peers.push(tokio::spawn(run_peer(ctx, self.running.subscribe())));
            }
        }
        tracing::info!(relays = self.config.relays.len(), "inbox started");
        self.bus.publish_lifecycle(LifecycleEvent::Started);
    }

    /// Stop streaming: suppress reconnects, close connections best-effort,
    /// and wait for the peer tasks to wind down. State is discarded.
    pub async fn stop(&self) {
        self.running.send_replace(false);
        let peers: Vec<JoinHandle<()>> = {
            let mut guard = self.peers.lock();
            guard.drain(..).collect()
        };
        if peers.is_empty() {
            return;
        }
        join_all(peers).await;
        tracing::info!("inbox stopped");
        self.bus.publish_lifecycle(LifecycleEvent::Stopped);
    }

    /// Clone of the underlying bus, for wiring into other components.
    pub fn bus(&self) -> NotificationBus {
        self.bus.clone()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    /// Next notification of `notification_type`, or a timeout error.
    pub async fn wait_for(
        &self,
        notification_type: NotificationType,
        timeout: Duration,
    ) -> Result<Notification, InboxError> {
        self.bus.wait_for(notification_type, timeout).await
    }

    /// Accumulate notifications matching `predicate` for a fixed window.
    pub async fn collect<F>(&self, window: Duration, predicate: F) -> Vec<Notification>
    where
        F: Fn(&Notification) -> bool,
    {
        self.bus.collect(window, predicate).await
    }

    /// Watermark the next reconnect will resume from.
    pub fn watermark(&self) -> Timestamp {
        self.ingest.watermark()
    }

    /// Forward every notification into a webhook sink. The returned
    /// handle must be `close()`d for a final flush; delivery failures
    /// surface only through the sink's outcome callback.
    pub fn attach_webhook(&self, config: WebhookConfig) -> WebhookSink {
        let sink = WebhookSink::new(config);
        let forward = sink.clone();
        let mut sub = self.bus.subscribe(Topic::All);
        tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                if let BusEvent::Notification(n) = event {
                    if !forward.submit(n) {
                        break;
                    }
                }
            }
        });
        sink
    }
}
