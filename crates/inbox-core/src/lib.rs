//! Unified notification inbox over heterogeneous nostr relays.
//!
//! Fans in event streams from any number of relays, deduplicates and
//! classifies them into a single priority-tagged notification feed, and
//! optionally forwards that feed to an HTTP webhook with batching, HMAC
//! signing, and retrying delivery.

pub mod bus;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod error;
pub mod filters;
pub mod inbox;
pub mod ingest;
pub mod models;
pub mod poll;
pub mod relay;
pub mod rules;
pub mod webhook;

pub use bus::{BusEvent, LifecycleEvent, LifecycleKind, NotificationBus, Subscription, Topic};
pub use config::{ChannelConfig, InboxConfig, WebhookConfig};
pub use error::InboxError;
pub use inbox::Inbox;
pub use models::{Notification, NotificationType, Priority};
pub use webhook::{DeliveryOutcome, WebhookSink};
