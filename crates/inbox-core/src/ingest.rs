//! Streaming ingestion: raw events from all peers fan in here, get
//! deduplicated, classified, and published to the bus.
//!
//! The dedup window and watermark are the only shared mutable state in
//! the pipeline. One lock guards both and is held across the publish, so
//! notifications hit the bus in exactly the order their events were
//! accepted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use nostr_sdk::prelude::*;
use parking_lot::Mutex;

use crate::bus::NotificationBus;
use crate::config::NotificationCallback;
use crate::dedup::DedupWindow;
use crate::models::Notification;

struct IngestState {
    dedup: DedupWindow,
    /// Highest creation time observed; reconnects resume from here.
    watermark: Timestamp,
}

/// Shared handle to the ingestion pipeline; cloned into every peer task.
#[derive(Clone)]
pub struct Ingestor {
    state: Arc<Mutex<IngestState>>,
    bus: NotificationBus,
    watcher: PublicKey,
    dedup_enabled: bool,
    callback: Option<NotificationCallback>,
}

impl Ingestor {
    pub(crate) fn new(
        bus: NotificationBus,
        watcher: PublicKey,
        watermark: Timestamp,
        dedup_enabled: bool,
        callback: Option<NotificationCallback>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(IngestState {
                dedup: DedupWindow::new(),
                watermark,
            })),
            bus,
            watcher,
            dedup_enabled,
            callback,
        }
    }

    /// Current watermark; peers rebuild their filters from this on
    /// reconnect.
    pub fn watermark(&self) -> Timestamp {
        self.state.lock().watermark
    }

    /// Accept one raw event: dedup, watermark, classify, publish.
    /// Duplicate ids are dropped with no further side effects.
    pub fn handle_event(&self, event: &Event) {
        let notification = {
            let mut state = self.state.lock();

            if self.dedup_enabled && !state.dedup.insert(event.id.to_hex()) {
                tracing::trace!(id = %event.id, "duplicate event dropped");
                return;
            }
            if event.created_at > state.watermark {
                state.watermark = event.created_at;
            }

            let notification = Notification::from_event(event, &self.watcher);
            // Publish while still holding the lock: bus order must match
            // acceptance order across concurrently delivering peers.
            self.bus.publish_notification(&notification);
            notification
        };

        if let Some(callback) = &self.callback {
            // User code: contain panics so one bad observer cannot take
            // down the pipeline.
            if catch_unwind(AssertUnwindSafe(|| callback(&notification))).is_err() {
                tracing::warn!(id = %notification.id, "notification callback panicked");
            }
        }
    }
}
