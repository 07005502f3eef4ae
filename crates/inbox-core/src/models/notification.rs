//! The normalized notification model published on the bus and delivered
//! to webhooks.

use std::fmt;
use std::str::FromStr;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rules;

/// What a raw event was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Dm,
    WorkRequest,
    WorkResult,
    WorkFeedback,
    Zap,
    Trust,
    TrustNetwork,
    MarketplaceBid,
    MarketplaceDelivery,
    MarketplaceResolution,
    Reaction,
    Mention,
    Unknown,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Dm => "dm",
            NotificationType::WorkRequest => "work_request",
            NotificationType::WorkResult => "work_result",
            NotificationType::WorkFeedback => "work_feedback",
            NotificationType::Zap => "zap",
            NotificationType::Trust => "trust",
            NotificationType::TrustNetwork => "trust_network",
            NotificationType::MarketplaceBid => "marketplace_bid",
            NotificationType::MarketplaceDelivery => "marketplace_delivery",
            NotificationType::MarketplaceResolution => "marketplace_resolution",
            NotificationType::Reaction => "reaction",
            NotificationType::Mention => "mention",
            NotificationType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(NotificationType::Dm),
            "work_request" => Ok(NotificationType::WorkRequest),
            "work_result" => Ok(NotificationType::WorkResult),
            "work_feedback" => Ok(NotificationType::WorkFeedback),
            "zap" => Ok(NotificationType::Zap),
            "trust" => Ok(NotificationType::Trust),
            "trust_network" => Ok(NotificationType::TrustNetwork),
            "marketplace_bid" => Ok(NotificationType::MarketplaceBid),
            "marketplace_delivery" => Ok(NotificationType::MarketplaceDelivery),
            "marketplace_resolution" => Ok(NotificationType::MarketplaceResolution),
            "reaction" => Ok(NotificationType::Reaction),
            "mention" => Ok(NotificationType::Mention),
            "unknown" => Ok(NotificationType::Unknown),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// Coarse urgency signal for downstream filtering (urgent topic,
/// urgent-only webhooks). Not a scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

/// A classified, priority-tagged notification derived from one raw event.
/// Immutable once constructed; classification is a pure function of
/// (kind, tags, watcher), so reprocessing the same event always yields the
/// same notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Event id, hex.
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    /// Sender pubkey, hex.
    pub from: String,
    pub content: String,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    /// Creation time in milliseconds.
    pub created_at: u64,
    /// Request kind this notification pairs with (job request/result only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_kind: Option<u16>,
    /// The originating raw event. Not part of the wire format.
    #[serde(skip)]
    pub event: Event,
}

impl Notification {
    /// Classify a raw event into a notification for `watcher`.
    pub fn from_event(event: &Event, watcher: &PublicKey) -> Self {
        let tags: Vec<Vec<String>> = event
            .tags
            .iter()
            .map(|t| t.as_slice().to_vec())
            .collect();
        let class = rules::classify(event.kind.as_u16(), &tags, &watcher.to_hex());

        Self {
            id: event.id.to_hex(),
            notification_type: class.notification_type,
            priority: class.priority,
            from: event.pubkey.to_hex(),
            content: event.content.clone(),
            kind: event.kind.as_u16(),
            tags,
            created_at: event.created_at.as_u64() * 1000,
            related_kind: class.related_kind,
            event: event.clone(),
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::High
    }
}
