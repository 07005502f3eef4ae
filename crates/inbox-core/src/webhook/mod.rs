//! Outbound webhook delivery: filter -> batch -> sign -> POST with retry.
//!
//! The sink is a pair of actor tasks. The batching worker owns the batch
//! and the flush timer; flushed envelopes go onto a delivery queue
//! consumed by a single delivery task, which posts them in order and
//! sleeps through retry backoffs. An envelope whose retries are exhausted
//! is dropped and reported through the outcome callback; failures never
//! reach the bus or ingestion.

pub mod signing;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{DeliveryCallback, WebhookConfig};
use crate::models::Notification;

/// Header carrying the HMAC of the body.
pub const SIGNATURE_HEADER: &str = "X-Signature-256";

/// Terminal result of delivering one envelope.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered {
        notifications: usize,
        status: u16,
    },
    /// Retries exhausted; the envelope was dropped.
    Failed {
        notifications: usize,
        attempts: u32,
        reason: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Envelope<'a> {
    Notification {
        timestamp: u64,
        notification: &'a Notification,
    },
    Batch {
        timestamp: u64,
        count: usize,
        notifications: &'a [Notification],
    },
}

/// A serialized, signed envelope waiting on the delivery queue.
struct PreparedEnvelope {
    body: Vec<u8>,
    signature: Option<String>,
    count: usize,
}

enum SinkCommand {
    Submit(Box<Notification>),
    Close(oneshot::Sender<()>),
}

/// Handle to a running webhook sink. Cheap to clone; `close` shuts the
/// worker down after a final flush.
#[derive(Clone)]
pub struct WebhookSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl WebhookSink {
    /// Spawn the sink tasks. Must be called from a tokio runtime.
    pub fn new(config: WebhookConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SinkWorker::new(config);
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Feed one notification through the pipeline. Returns false once the
    /// sink is closed.
    pub fn submit(&self, notification: Notification) -> bool {
        self.tx
            .send(SinkCommand::Submit(Box::new(notification)))
            .is_ok()
    }

    /// Flush whatever is pending and wait for every queued delivery to
    /// reach a terminal outcome (success or exhausted retries).
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SinkCommand::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

struct SinkWorker {
    config: WebhookConfig,
    batch: Vec<Notification>,
    deadline: Option<Instant>,
    queue: Option<mpsc::UnboundedSender<PreparedEnvelope>>,
    delivery_task: Option<JoinHandle<()>>,
}

impl SinkWorker {
    fn new(config: WebhookConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let delivery_task = tokio::spawn(run_deliveries(queue_rx, config.clone()));
        Self {
            config,
            batch: Vec::new(),
            deadline: None,
            queue: Some(queue_tx),
            delivery_task: Some(delivery_task),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SinkCommand>) {
        loop {
            let flush_at = self.deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SinkCommand::Submit(notification)) => self.accept(*notification),
                    Some(SinkCommand::Close(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    // Every handle dropped without close(); same cleanup.
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                _ = tokio::time::sleep_until(flush_at), if self.deadline.is_some() => {
                    self.flush();
                }
            }
        }
    }

    /// Final flush, then drain the delivery queue.
    async fn shutdown(&mut self) {
        self.flush();
        self.queue = None;
        if let Some(task) = self.delivery_task.take() {
            let _ = task.await;
        }
    }

    fn accept(&mut self, notification: Notification) {
        if let Some(allowed) = &self.config.allowed_types {
            if !allowed.contains(&notification.notification_type) {
                return;
            }
        }
        if self.config.urgent_only && !notification.is_urgent() {
            return;
        }

        if self.config.batch_ms == 0 {
            let body = serde_json::to_vec(&Envelope::Notification {
                timestamp: epoch_millis(),
                notification: &notification,
            });
            self.enqueue(body, 1);
            return;
        }

        self.batch.push(notification);
        if self.batch.len() >= self.config.max_batch_size {
            self.flush();
        } else if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + Duration::from_millis(self.config.batch_ms));
        }
    }

    /// Ship the accumulated batch, if any, and disarm the timer.
    fn flush(&mut self) {
        self.deadline = None;
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        let body = serde_json::to_vec(&Envelope::Batch {
            timestamp: epoch_millis(),
            count: batch.len(),
            notifications: &batch,
        });
        self.enqueue(body, batch.len());
    }

    fn enqueue(&mut self, body: Result<Vec<u8>, serde_json::Error>, count: usize) {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize webhook envelope");
                return;
            }
        };
        // Sign the exact bytes that go on the wire.
        let signature = self
            .config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| signing::sign(&body, secret));

        if let Some(queue) = &self.queue {
            let _ = queue.send(PreparedEnvelope {
                body,
                signature,
                count,
            });
        }
    }
}

/// Deliver queued envelopes in order, one at a time. Retry backoff delays
/// everything behind it; submission order is preserved end to end.
async fn run_deliveries(
    mut queue: mpsc::UnboundedReceiver<PreparedEnvelope>,
    config: WebhookConfig,
) {
    let http = reqwest::Client::new();
    while let Some(envelope) = queue.recv().await {
        let outcome = deliver(&http, &config, envelope).await;
        report(config.on_outcome.clone(), outcome);
    }
}

async fn deliver(
    http: &reqwest::Client,
    config: &WebhookConfig,
    envelope: PreparedEnvelope,
) -> DeliveryOutcome {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let reason = match send_once(http, config, &envelope).await {
            Ok(status) => {
                return DeliveryOutcome::Delivered {
                    notifications: envelope.count,
                    status,
                };
            }
            Err(reason) => reason,
        };

        if attempt > config.max_retries {
            tracing::warn!(
                url = %config.url,
                attempts = attempt,
                %reason,
                "webhook delivery gave up"
            );
            return DeliveryOutcome::Failed {
                notifications: envelope.count,
                attempts: attempt,
                reason,
            };
        }

        // 2^attempt backoff between tries.
        let backoff = config.backoff_unit * 2u32.saturating_pow(attempt.min(16));
        tracing::debug!(url = %config.url, attempt, ?backoff, %reason, "webhook delivery retrying");
        tokio::time::sleep(backoff).await;
    }
}

async fn send_once(
    http: &reqwest::Client,
    config: &WebhookConfig,
    envelope: &PreparedEnvelope,
) -> Result<u16, String> {
    let mut request = http
        .post(&config.url)
        .timeout(config.timeout)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(envelope.body.clone());
    if let Some(signature) = &envelope.signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                Ok(status.as_u16())
            } else {
                Err(format!("status {status}"))
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

fn report(callback: Option<DeliveryCallback>, outcome: DeliveryOutcome) {
    if let Some(callback) = callback {
        if catch_unwind(AssertUnwindSafe(|| callback(&outcome))).is_err() {
            tracing::warn!("delivery outcome callback panicked");
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
