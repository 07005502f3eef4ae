//! Classification rule engine: raw event kind + tags -> notification type,
//! priority, and pairing info.
//!
//! `classify` is a total, deterministic function. Rules are evaluated in
//! order, first match wins; anything unrecognized falls through to
//! `unknown`/low. Keeping this pure lets the tests enumerate the whole
//! table.

use crate::constants::kinds;
use crate::models::{NotificationType, Priority};

/// Result of classifying one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub notification_type: NotificationType,
    pub priority: Priority,
    /// For job results this is the request kind (`kind - 1000`); for job
    /// requests it is the kind itself. `None` for everything else.
    pub related_kind: Option<u16>,
}

impl Classification {
    fn new(notification_type: NotificationType, priority: Priority) -> Self {
        Self {
            notification_type,
            priority,
            related_kind: None,
        }
    }

    fn with_related(mut self, related_kind: u16) -> Self {
        self.related_kind = Some(related_kind);
        self
    }
}

/// Classify an event by kind and tags, from the point of view of
/// `watcher` (hex pubkey). Never fails.
pub fn classify(kind: u16, tags: &[Vec<String>], watcher: &str) -> Classification {
    match kind {
        kinds::ENCRYPTED_DM | kinds::GIFT_WRAP => {
            Classification::new(NotificationType::Dm, Priority::High)
        }
        kinds::JOB_REQUEST_MIN..=kinds::JOB_REQUEST_MAX => {
            Classification::new(NotificationType::WorkRequest, Priority::High).with_related(kind)
        }
        kinds::JOB_RESULT_MIN..=kinds::JOB_RESULT_MAX => {
            Classification::new(NotificationType::WorkResult, Priority::Medium)
                .with_related(kind - kinds::JOB_RESULT_OFFSET)
        }
        kinds::JOB_FEEDBACK => Classification::new(NotificationType::WorkFeedback, Priority::Low),
        kinds::ZAP_RECEIPT => Classification::new(NotificationType::Zap, Priority::Medium),
        kinds::LABEL => {
            if has_p_tag(tags, watcher) {
                Classification::new(NotificationType::Trust, Priority::Medium)
            } else {
                Classification::new(NotificationType::TrustNetwork, Priority::Low)
            }
        }
        kinds::MARKETPLACE_BID => {
            Classification::new(NotificationType::MarketplaceBid, Priority::High)
        }
        kinds::MARKETPLACE_DELIVERY => {
            Classification::new(NotificationType::MarketplaceDelivery, Priority::High)
        }
        kinds::MARKETPLACE_RESOLUTION => {
            Classification::new(NotificationType::MarketplaceResolution, Priority::High)
        }
        kinds::REACTION => Classification::new(NotificationType::Reaction, Priority::Low),
        kinds::TEXT_NOTE | kinds::COMMENT => {
            Classification::new(NotificationType::Mention, Priority::Medium)
        }
        _ => Classification::new(NotificationType::Unknown, Priority::Low),
    }
}

fn has_p_tag(tags: &[Vec<String>], watcher: &str) -> bool {
    tags.iter().any(|row| {
        row.first().map(String::as_str) == Some("p")
            && row.get(1).map(String::as_str) == Some(watcher)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCHER: &str = "09d48a1a5dbe13404a729634f1d6ba722d40513468dd713c8ea38ca9b7b6f2c7";

    fn p_tag(value: &str) -> Vec<Vec<String>> {
        vec![vec!["p".to_string(), value.to_string()]]
    }

    #[test]
    fn test_dm_kinds_are_high_priority() {
        for kind in [kinds::ENCRYPTED_DM, kinds::GIFT_WRAP] {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, NotificationType::Dm);
            assert_eq!(c.priority, Priority::High);
            assert_eq!(c.related_kind, None);
        }
    }

    #[test]
    fn test_entire_job_request_range() {
        for kind in kinds::JOB_REQUEST_MIN..=kinds::JOB_REQUEST_MAX {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, NotificationType::WorkRequest);
            assert_eq!(c.priority, Priority::High);
            assert_eq!(c.related_kind, Some(kind));
        }
    }

    #[test]
    fn test_entire_job_result_range() {
        for kind in kinds::JOB_RESULT_MIN..=kinds::JOB_RESULT_MAX {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, NotificationType::WorkResult);
            assert_eq!(c.priority, Priority::Medium);
            assert_eq!(c.related_kind, Some(kind - 1000));
        }
    }

    #[test]
    fn test_job_feedback() {
        let c = classify(kinds::JOB_FEEDBACK, &[], WATCHER);
        assert_eq!(c.notification_type, NotificationType::WorkFeedback);
        assert_eq!(c.priority, Priority::Low);
    }

    #[test]
    fn test_zap_receipt() {
        let c = classify(kinds::ZAP_RECEIPT, &[], WATCHER);
        assert_eq!(c.notification_type, NotificationType::Zap);
        assert_eq!(c.priority, Priority::Medium);
    }

    #[test]
    fn test_label_about_watcher_is_trust() {
        let c = classify(kinds::LABEL, &p_tag(WATCHER), WATCHER);
        assert_eq!(c.notification_type, NotificationType::Trust);
        assert_eq!(c.priority, Priority::Medium);
    }

    #[test]
    fn test_label_about_other_is_trust_network() {
        let c = classify(kinds::LABEL, &p_tag("someone-else"), WATCHER);
        assert_eq!(c.notification_type, NotificationType::TrustNetwork);
        assert_eq!(c.priority, Priority::Low);
    }

    #[test]
    fn test_marketplace_kinds_are_high_priority() {
        for (kind, expected) in [
            (kinds::MARKETPLACE_BID, NotificationType::MarketplaceBid),
            (kinds::MARKETPLACE_DELIVERY, NotificationType::MarketplaceDelivery),
            (kinds::MARKETPLACE_RESOLUTION, NotificationType::MarketplaceResolution),
        ] {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, expected);
            assert_eq!(c.priority, Priority::High);
        }
    }

    #[test]
    fn test_reaction_is_low_priority() {
        let c = classify(kinds::REACTION, &[], WATCHER);
        assert_eq!(c.notification_type, NotificationType::Reaction);
        assert_eq!(c.priority, Priority::Low);
    }

    #[test]
    fn test_mention_kinds() {
        for kind in [kinds::TEXT_NOTE, kinds::COMMENT] {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, NotificationType::Mention);
            assert_eq!(c.priority, Priority::Medium);
        }
    }

    #[test]
    fn test_unrecognized_kind_is_unknown_low() {
        for kind in [2, 3, 30023, 65535] {
            let c = classify(kind, &[], WATCHER);
            assert_eq!(c.notification_type, NotificationType::Unknown);
            assert_eq!(c.priority, Priority::Low);
            assert_eq!(c.related_kind, None);
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let tags = p_tag(WATCHER);
        for kind in [4, 1985, 5100, 6100, 9735, 1, 12345] {
            assert_eq!(classify(kind, &tags, WATCHER), classify(kind, &tags, WATCHER));
        }
    }
}
