use thiserror::Error;

/// Error taxonomy of the inbox.
///
/// Only [`InboxError::Config`] is fatal, and only at construction time.
/// Per-relay and per-delivery failures are contained: they surface as
/// lifecycle events or outcome callbacks, never as a crashed inbox.
#[derive(Debug, Error)]
pub enum InboxError {
    /// Missing or invalid required configuration. Raised synchronously by
    /// [`crate::Inbox::new`].
    #[error("invalid config: {0}")]
    Config(String),

    /// A relay connection attempt failed. Recoverable; the peer task
    /// schedules a reconnect.
    #[error("relay {relay}: {reason}")]
    Connect { relay: String, reason: String },

    /// An operation did not complete within its bound (`wait_for`, relay
    /// connect, stored-event query).
    #[error("timed out: {0}")]
    Timeout(String),

    /// Webhook delivery failed after exhausting retries. Reported through
    /// the delivery outcome callback; the envelope is dropped.
    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}
