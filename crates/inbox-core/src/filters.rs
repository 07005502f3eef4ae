//! Subscription filter construction: enabled channels -> relay query
//! filters.
//!
//! Pure and deterministic; filter order follows channel insertion order
//! (mentions, dms, job requests, job results, zaps, reactions, trust,
//! marketplace). Relays OR the filters of a subscription together, so each
//! channel stands alone.

use nostr_sdk::prelude::*;

use crate::config::ChannelConfig;
use crate::constants::{kinds, DEFAULT_JOB_REQUEST_KINDS, TRUST_LABEL_NAMESPACE};

/// Build the relay filter set for `watcher` from the enabled channels.
/// `since`, when given, is attached to every filter as the lower time
/// bound (the live watermark on reconnect).
pub fn build_filters(
    watcher: &PublicKey,
    channels: &ChannelConfig,
    since: Option<Timestamp>,
) -> Vec<Filter> {
    let mut filters = Vec::new();

    if channels.mentions {
        filters.push(Filter::new().kinds([
            Kind::Custom(kinds::TEXT_NOTE),
            Kind::Custom(kinds::COMMENT),
        ]));
    }

    if channels.dms {
        // Two filters: NIP-04 and gift-wrapped DMs are structurally
        // different encodings.
        filters.push(Filter::new().kind(Kind::Custom(kinds::ENCRYPTED_DM)));
        filters.push(Filter::new().kind(Kind::Custom(kinds::GIFT_WRAP)));
    }

    if channels.work_requests {
        filters.push(Filter::new().kinds(request_kinds(channels).into_iter().map(Kind::Custom)));
    }

    if channels.work_results {
        filters.push(Filter::new().kinds(result_kinds(channels).into_iter().map(Kind::Custom)));
    }

    if channels.zaps {
        filters.push(Filter::new().kind(Kind::Custom(kinds::ZAP_RECEIPT)));
    }

    if channels.reactions {
        filters.push(Filter::new().kind(Kind::Custom(kinds::REACTION)));
    }

    if channels.trust {
        filters.push(
            Filter::new()
                .kind(Kind::Custom(kinds::LABEL))
                .custom_tag(SingleLetterTag::uppercase(Alphabet::L), TRUST_LABEL_NAMESPACE),
        );
    }

    if channels.marketplace {
        filters.push(Filter::new().kinds([
            Kind::Custom(kinds::MARKETPLACE_BID),
            Kind::Custom(kinds::MARKETPLACE_DELIVERY),
            Kind::Custom(kinds::MARKETPLACE_RESOLUTION),
        ]));
    }

    filters
        .into_iter()
        .map(|f| {
            let f = f.pubkey(*watcher);
            match since {
                Some(ts) => f.since(ts),
                None => f,
            }
        })
        .collect()
}

/// Job request kinds to subscribe to: the explicit override verbatim, or
/// the curated default set.
pub fn request_kinds(channels: &ChannelConfig) -> Vec<u16> {
    match &channels.job_kinds {
        Some(kinds) => kinds.clone(),
        None => DEFAULT_JOB_REQUEST_KINDS.to_vec(),
    }
}

/// Job result kinds, derived from the request kinds by the fixed protocol
/// offset.
pub fn result_kinds(channels: &ChannelConfig) -> Vec<u16> {
    request_kinds(channels)
        .into_iter()
        .map(|k| k + kinds::JOB_RESULT_OFFSET)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn watcher() -> PublicKey {
        Keys::generate().public_key()
    }

    fn to_json(filters: &[Filter]) -> Vec<Value> {
        filters
            .iter()
            .map(|f| serde_json::to_value(f).unwrap())
            .collect()
    }

    #[test]
    fn test_all_channels_disabled_yields_no_filters() {
        let filters = build_filters(&watcher(), &ChannelConfig::none(), None);
        assert!(filters.is_empty());
    }

    #[test]
    fn test_mentions_only_yields_single_text_filter() {
        let channels = ChannelConfig {
            mentions: true,
            ..ChannelConfig::none()
        };
        let pk = watcher();
        let json = to_json(&build_filters(&pk, &channels, None));

        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["kinds"], serde_json::json!([1, 1111]));
        assert_eq!(json[0]["#p"], serde_json::json!([pk.to_hex()]));
    }

    #[test]
    fn test_dms_contribute_two_filters() {
        let channels = ChannelConfig {
            dms: true,
            ..ChannelConfig::none()
        };
        let json = to_json(&build_filters(&watcher(), &channels, None));

        assert_eq!(json.len(), 2);
        assert_eq!(json[0]["kinds"], serde_json::json!([4]));
        assert_eq!(json[1]["kinds"], serde_json::json!([1059]));
    }

    #[test]
    fn test_default_job_kind_set_is_curated() {
        assert!(DEFAULT_JOB_REQUEST_KINDS.len() < 30);
        assert!(DEFAULT_JOB_REQUEST_KINDS
            .iter()
            .all(|k| (kinds::JOB_REQUEST_MIN..=kinds::JOB_REQUEST_MAX).contains(k)));
    }

    #[test]
    fn test_explicit_job_kinds_used_verbatim_and_results_derived() {
        let channels = ChannelConfig {
            job_kinds: Some(vec![5100, 5999]),
            ..ChannelConfig::default()
        };
        assert_eq!(request_kinds(&channels), vec![5100, 5999]);
        assert_eq!(result_kinds(&channels), vec![6100, 6999]);
    }

    #[test]
    fn test_trust_filter_carries_label_namespace() {
        let channels = ChannelConfig {
            trust: true,
            ..ChannelConfig::none()
        };
        let json = to_json(&build_filters(&watcher(), &channels, None));

        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["kinds"], serde_json::json!([1985]));
        assert_eq!(json[0]["#L"], serde_json::json!([TRUST_LABEL_NAMESPACE]));
    }

    #[test]
    fn test_watermark_attached_to_every_filter() {
        let since = Timestamp::from(1_700_000_000u64);
        let json = to_json(&build_filters(&watcher(), &ChannelConfig::default(), Some(since)));

        assert!(!json.is_empty());
        for f in &json {
            assert_eq!(f["since"].as_u64(), Some(1_700_000_000));
        }
    }

    #[test]
    fn test_default_config_filter_order() {
        let json = to_json(&build_filters(&watcher(), &ChannelConfig::default(), None));

        // mentions, dm x2, requests, results, zaps, reactions, trust, marketplace
        assert_eq!(json.len(), 9);
        assert_eq!(json[0]["kinds"], serde_json::json!([1, 1111]));
        assert_eq!(json[1]["kinds"], serde_json::json!([4]));
        assert_eq!(json[2]["kinds"], serde_json::json!([1059]));
        assert_eq!(json[5]["kinds"], serde_json::json!([9735]));
        assert_eq!(json[6]["kinds"], serde_json::json!([7]));
        assert_eq!(json[7]["kinds"], serde_json::json!([1985]));
        assert_eq!(
            json[8]["kinds"],
            serde_json::json!([3400, 3401, 3402])
        );
    }
}
