//! Inbox, channel, and webhook configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{CONNECT_TIMEOUT, DEFAULT_RELAYS, RECONNECT_DELAY};
use crate::models::{Notification, NotificationType};
use crate::webhook::DeliveryOutcome;

/// Synchronous observer invoked for every accepted notification. Runs
/// inside a protective boundary; a panic is swallowed and logged.
pub type NotificationCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Observer for webhook delivery outcomes (success or exhausted retries).
pub type DeliveryCallback = Arc<dyn Fn(&DeliveryOutcome) + Send + Sync>;

/// Top-level inbox configuration.
#[derive(Clone)]
pub struct InboxConfig {
    /// Watcher public key (hex or bech32). Required.
    pub pubkey: String,
    /// Relay URLs to fan in from. Defaults to [`DEFAULT_RELAYS`].
    pub relays: Vec<String>,
    /// Lower time bound in unix seconds; defaults to "now - 60s".
    pub since: Option<u64>,
    /// Drop events whose id was already seen.
    pub dedup: bool,
    pub channels: ChannelConfig,
    pub connect_timeout: Duration,
    /// Fixed delay between reconnect attempts. No growth, no cap; `stop()`
    /// is the only way to halt retries against a dead relay.
    pub reconnect_delay: Duration,
    pub on_notification: Option<NotificationCallback>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            pubkey: String::new(),
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            since: None,
            dedup: true,
            channels: ChannelConfig::default(),
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_delay: RECONNECT_DELAY,
            on_notification: None,
        }
    }
}

impl InboxConfig {
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            ..Self::default()
        }
    }
}

/// Per-channel toggles. Everything is on by default; unknown JSON keys are
/// ignored on parse, so a malformed config simply yields fewer channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    pub mentions: bool,
    pub dms: bool,
    pub work_requests: bool,
    pub work_results: bool,
    pub zaps: bool,
    pub reactions: bool,
    pub trust: bool,
    pub marketplace: bool,
    /// Explicit job request kinds; result kinds are derived by the fixed
    /// protocol offset. `None` selects the curated default set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_kinds: Option<Vec<u16>>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mentions: true,
            dms: true,
            work_requests: true,
            work_results: true,
            zaps: true,
            reactions: true,
            trust: true,
            marketplace: true,
            job_kinds: None,
        }
    }
}

impl ChannelConfig {
    /// All channels off; enable individually from here.
    pub fn none() -> Self {
        Self {
            mentions: false,
            dms: false,
            work_requests: false,
            work_results: false,
            zaps: false,
            reactions: false,
            trust: false,
            marketplace: false,
            job_kinds: None,
        }
    }

    /// Enable one channel by its config name. Unknown names are ignored.
    pub fn enable(&mut self, name: &str) {
        match name {
            "mentions" => self.mentions = true,
            "dms" => self.dms = true,
            "work_requests" | "workRequests" => self.work_requests = true,
            "work_results" | "workResults" => self.work_results = true,
            "zaps" => self.zaps = true,
            "reactions" => self.reactions = true,
            "trust" => self.trust = true,
            "marketplace" => self.marketplace = true,
            _ => {}
        }
    }
}

/// Outbound webhook delivery configuration.
#[derive(Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// HMAC-SHA256 signing secret; when set, every request carries
    /// `X-Signature-256: sha256=<hex>` over the exact body bytes.
    pub secret: Option<String>,
    /// Deliver only these notification types. `None` delivers everything.
    pub allowed_types: Option<Vec<NotificationType>>,
    /// Deliver only high-priority notifications.
    pub urgent_only: bool,
    /// Batch window in milliseconds. 0 delivers each notification
    /// immediately in a single-notification envelope.
    pub batch_ms: u64,
    /// Flush the batch early once it reaches this size.
    pub max_batch_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the initial attempt before the envelope is dropped.
    pub max_retries: u32,
    /// Unit for the `2^attempt` retry backoff. One second on the wire;
    /// tests shrink it.
    pub backoff_unit: Duration,
    pub on_outcome: Option<DeliveryCallback>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
            allowed_types: None,
            urgent_only: false,
            batch_ms: 0,
            max_batch_size: 10,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            on_outcome: None,
        }
    }
}
