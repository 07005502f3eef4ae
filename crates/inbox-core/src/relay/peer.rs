//! Per-relay connection management.
//!
//! One task per configured relay URL drives the state machine
//! disconnected -> connecting -> subscribed <-> error -> (fixed delay) ->
//! connecting. Retry is unconditional while the inbox runs: fixed delay,
//! no growth, no attempt cap. The watch-channel running flag is checked at
//! every suspension point; an in-flight connect attempt is dropped rather
//! than interrupted when the inbox stops.

use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use tokio::sync::watch;

use crate::bus::{LifecycleEvent, NotificationBus};
use crate::config::ChannelConfig;
use crate::filters::build_filters;
use crate::ingest::Ingestor;
use crate::relay::{RelayConnector, RelayIncoming};

pub(crate) struct PeerContext {
    pub url: String,
    pub connector: Arc<dyn RelayConnector>,
    pub ingest: Ingestor,
    pub bus: NotificationBus,
    pub watcher: PublicKey,
    pub channels: ChannelConfig,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

/// Resolves once the running flag goes down (or its sender is gone).
async fn stopped(running: &mut watch::Receiver<bool>) {
    while *running.borrow() {
        if running.changed().await.is_err() {
            break;
        }
    }
}

pub(crate) async fn run_peer(ctx: PeerContext, mut running: watch::Receiver<bool>) {
    while *running.borrow() {
        ctx.bus.publish_lifecycle(LifecycleEvent::Connecting {
            relay: ctx.url.clone(),
        });

        let attempt = tokio::select! {
            result = ctx.connector.connect(&ctx.url, ctx.connect_timeout) => result,
            // Stop requested mid-connect: drop the attempt, outcome
            // discarded.
            _ = stopped(&mut running) => return,
        };

        match attempt {
            Ok(mut conn) => {
                ctx.bus.publish_lifecycle(LifecycleEvent::Connected {
                    relay: ctx.url.clone(),
                });

                // Resume from the live watermark, not the original
                // `since`.
                let filters =
                    build_filters(&ctx.watcher, &ctx.channels, Some(ctx.ingest.watermark()));

                match conn.subscribe(filters).await {
                    Ok(()) => loop {
                        tokio::select! {
                            incoming = conn.next_incoming() => match incoming {
                                Some(RelayIncoming::Event(event)) => {
                                    ctx.ingest.handle_event(&event);
                                }
                                Some(RelayIncoming::EndOfStored) => {
                                    ctx.bus.publish_lifecycle(LifecycleEvent::Synced {
                                        relay: ctx.url.clone(),
                                    });
                                }
                                None => {
                                    ctx.bus.publish_lifecycle(LifecycleEvent::Error {
                                        relay: ctx.url.clone(),
                                        message: "connection closed".to_string(),
                                    });
                                    break;
                                }
                            },
                            _ = stopped(&mut running) => {
                                conn.close().await;
                                return;
                            }
                        }
                    },
                    Err(e) => {
                        ctx.bus.publish_lifecycle(LifecycleEvent::Error {
                            relay: ctx.url.clone(),
                            message: e.to_string(),
                        });
                        conn.close().await;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(relay = %ctx.url, error = %e, "connect failed");
                ctx.bus.publish_lifecycle(LifecycleEvent::Error {
                    relay: ctx.url.clone(),
                    message: e.to_string(),
                });
            }
        }

        if !*running.borrow() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(ctx.reconnect_delay) => {}
            _ = stopped(&mut running) => return,
        }
    }
}
