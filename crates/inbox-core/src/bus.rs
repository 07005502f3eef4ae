//! In-process publish/subscribe bus for notifications and lifecycle
//! signals.
//!
//! Topics form a closed enum instead of free-form strings: the fixed
//! `All`/`Urgent` topics, one topic per notification type, and one per
//! lifecycle signal. Subscribers receive events over unbounded channels,
//! so publishing never blocks and never runs user code while the
//! subscriber table lock is held. Subscribing or unsubscribing from
//! inside a handler is always safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::InboxError;
use crate::models::{Notification, NotificationType};

/// Connection lifecycle signals emitted by the inbox and its peer tasks.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Connecting { relay: String },
    Connected { relay: String },
    Started,
    Stopped,
    /// A relay reported end of stored events.
    Synced { relay: String },
    Error { relay: String, message: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleKind {
        match self {
            LifecycleEvent::Connecting { .. } => LifecycleKind::Connecting,
            LifecycleEvent::Connected { .. } => LifecycleKind::Connected,
            LifecycleEvent::Started => LifecycleKind::Started,
            LifecycleEvent::Stopped => LifecycleKind::Stopped,
            LifecycleEvent::Synced { .. } => LifecycleKind::Synced,
            LifecycleEvent::Error { .. } => LifecycleKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Connecting,
    Connected,
    Started,
    Stopped,
    Synced,
    Error,
}

/// Everything that can be observed on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Notification(Notification),
    Lifecycle(LifecycleEvent),
}

/// Subscription key. Lifecycle events are also mirrored onto `All` so a
/// single subscription can drive a UI or log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Urgent,
    Type(NotificationType),
    Lifecycle(LifecycleKind),
}

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<BusEvent>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<Topic, Vec<Listener>>>,
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .entry(topic)
            .or_default()
            .push(Listener { id, tx });
        Subscription {
            topic,
            id,
            rx,
            inner: self.inner.clone(),
        }
    }

    /// Resolve with the next event on `topic`, then deregister.
    pub async fn once(&self, topic: Topic) -> Option<BusEvent> {
        let mut sub = self.subscribe(topic);
        sub.recv().await
    }

    /// Resolve with the next notification of `notification_type`, or fail
    /// with a timeout. The listener is deregistered on either outcome.
    pub async fn wait_for(
        &self,
        notification_type: NotificationType,
        timeout: Duration,
    ) -> Result<Notification, InboxError> {
        let mut sub = self.subscribe(Topic::Type(notification_type));
        let next = async {
            while let Some(event) = sub.recv().await {
                if let BusEvent::Notification(n) = event {
                    return Some(n);
                }
            }
            None
        };
        match tokio::time::timeout(timeout, next).await {
            Ok(Some(n)) => Ok(n),
            Ok(None) | Err(_) => Err(InboxError::Timeout(format!(
                "no {notification_type} notification within {timeout:?}"
            ))),
        }
    }

    /// Accumulate notifications satisfying `predicate` for a fixed
    /// wall-clock window, in arrival order. Never fails.
    pub async fn collect<F>(&self, window: Duration, predicate: F) -> Vec<Notification>
    where
        F: Fn(&Notification) -> bool,
    {
        let mut sub = self.subscribe(Topic::All);
        let deadline = tokio::time::Instant::now() + window;
        let mut collected = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, sub.recv()).await {
                Ok(Some(BusEvent::Notification(n))) => {
                    if predicate(&n) {
                        collected.push(n);
                    }
                }
                Ok(Some(BusEvent::Lifecycle(_))) => {}
                Ok(None) | Err(_) => break,
            }
        }
        collected
    }

    /// Accumulate every notification for a fixed window.
    pub async fn collect_all(&self, window: Duration) -> Vec<Notification> {
        self.collect(window, |_| true).await
    }

    pub fn publish_notification(&self, notification: &Notification) {
        let event = BusEvent::Notification(notification.clone());
        self.send(Topic::All, &event);
        self.send(Topic::Type(notification.notification_type), &event);
        if notification.is_urgent() {
            self.send(Topic::Urgent, &event);
        }
    }

    pub fn publish_lifecycle(&self, lifecycle: LifecycleEvent) {
        let kind = lifecycle.kind();
        let event = BusEvent::Lifecycle(lifecycle);
        self.send(Topic::Lifecycle(kind), &event);
        self.send(Topic::All, &event);
    }

    fn send(&self, topic: Topic, event: &BusEvent) {
        let mut table = self.inner.listeners.lock();
        if let Some(list) = table.get_mut(&topic) {
            // Dropped receivers fail the send and are pruned here.
            list.retain(|l| l.tx.send(event.clone()).is_ok());
            if list.is_empty() {
                table.remove(&topic);
            }
        }
    }

    #[cfg(test)]
    fn listener_count(&self, topic: Topic) -> usize {
        self.inner
            .listeners
            .lock()
            .get(&topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// A live bus subscription. Deregisters itself on drop.
pub struct Subscription {
    topic: Topic,
    id: u64,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    inner: Arc<BusInner>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut table = self.inner.listeners.lock();
        if let Some(list) = table.get_mut(&self.topic) {
            list.retain(|l| l.id != self.id);
            if list.is_empty() {
                table.remove(&self.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use nostr_sdk::prelude::*;

    fn notification(kind: u16) -> Notification {
        let keys = Keys::generate();
        let watcher = Keys::generate().public_key();
        let event = EventBuilder::new(Kind::Custom(kind), "test")
            .tag(Tag::public_key(watcher))
            .sign_with_keys(&keys)
            .unwrap();
        Notification::from_event(&event, &watcher)
    }

    #[tokio::test]
    async fn test_publish_routes_to_all_and_type_topics() {
        let bus = NotificationBus::new();
        let mut all = bus.subscribe(Topic::All);
        let mut dms = bus.subscribe(Topic::Type(NotificationType::Dm));
        let mut zaps = bus.subscribe(Topic::Type(NotificationType::Zap));

        bus.publish_notification(&notification(4));

        assert!(matches!(all.recv().await, Some(BusEvent::Notification(_))));
        assert!(matches!(dms.recv().await, Some(BusEvent::Notification(_))));
        assert_eq!(bus.listener_count(Topic::Type(NotificationType::Zap)), 1);
        drop(zaps);
    }

    #[tokio::test]
    async fn test_urgent_topic_sees_only_high_priority() {
        let bus = NotificationBus::new();
        let mut urgent = bus.subscribe(Topic::Urgent);

        bus.publish_notification(&notification(7)); // reaction, low
        bus.publish_notification(&notification(4)); // dm, high

        match urgent.recv().await {
            Some(BusEvent::Notification(n)) => {
                assert_eq!(n.priority, Priority::High);
                assert_eq!(n.notification_type, NotificationType::Dm);
            }
            other => panic!("expected a notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_resolves_with_matching_type() {
        let bus = NotificationBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.wait_for(NotificationType::Zap, Duration::from_secs(5)).await
            })
        };
        // Give the waiter a chance to register its listener.
        tokio::task::yield_now().await;
        while bus.listener_count(Topic::Type(NotificationType::Zap)) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        bus.publish_notification(&notification(9735));

        let n = waiter.await.unwrap().unwrap();
        assert_eq!(n.notification_type, NotificationType::Zap);
    }

    #[tokio::test]
    async fn test_wait_for_times_out_and_deregisters() {
        let bus = NotificationBus::new();
        let result = bus
            .wait_for(NotificationType::Dm, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(InboxError::Timeout(_))));
        assert_eq!(bus.listener_count(Topic::Type(NotificationType::Dm)), 0);
    }

    #[tokio::test]
    async fn test_collect_filters_and_preserves_arrival_order() {
        let bus = NotificationBus::new();
        let collector = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.collect(Duration::from_millis(100), |n| {
                    n.notification_type != NotificationType::Reaction
                })
                .await
            })
        };
        while bus.listener_count(Topic::All) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        bus.publish_notification(&notification(4));
        bus.publish_notification(&notification(7)); // filtered out
        bus.publish_notification(&notification(9735));

        let collected = collector.await.unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].notification_type, NotificationType::Dm);
        assert_eq!(collected[1].notification_type, NotificationType::Zap);
    }

    #[tokio::test]
    async fn test_dropped_subscription_deregisters() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Topic::All);
        assert_eq!(bus.listener_count(Topic::All), 1);
        drop(sub);
        assert_eq!(bus.listener_count(Topic::All), 0);
        // Publishing into an empty table is a no-op, not an error.
        bus.publish_notification(&notification(1));
    }

    #[tokio::test]
    async fn test_lifecycle_events_reach_kind_topic_and_all() {
        let bus = NotificationBus::new();
        let mut synced = bus.subscribe(Topic::Lifecycle(LifecycleKind::Synced));
        let mut all = bus.subscribe(Topic::All);

        bus.publish_lifecycle(LifecycleEvent::Synced {
            relay: "wss://example".to_string(),
        });

        assert!(matches!(
            synced.recv().await,
            Some(BusEvent::Lifecycle(LifecycleEvent::Synced { .. }))
        ));
        assert!(matches!(all.recv().await, Some(BusEvent::Lifecycle(_))));
    }
}
