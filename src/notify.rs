use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::engine::Commit;
use crate::model::Reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError(pub String);

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "callback delivery failed: {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Pushes a deferred request's result to its callback destination.
/// One attempt only; callers never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, url: &str, reply: &Reply) -> Result<(), DeliveryError>;
}

/// `PUT`s the JSON reply to the callback URL.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError(format!("http client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, url: &str, reply: &Reply) -> Result<(), DeliveryError> {
        let response = self
            .client
            .put(url)
            .json(reply)
            .send()
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DeliveryError(format!("status {}", response.status())));
        }
        Ok(())
    }
}

/// Deliver every commit that has a callback, concurrently. Failures are logged
/// and dropped; the bookings stay committed either way.
pub async fn deliver_all(notifier: &dyn Notifier, commits: &[Commit]) {
    let deliveries = commits.iter().filter_map(|c| {
        let url = c.callback.as_deref()?;
        Some(async move {
            match notifier.deliver(url, &c.reply).await {
                Ok(()) => {
                    debug!(entity = c.booking.entity, stage = %c.booking.stage, "callback delivered");
                    metrics::counter!(crate::observability::CALLBACKS_TOTAL, "status" => "ok")
                        .increment(1);
                }
                Err(e) => {
                    warn!(entity = c.booking.entity, stage = %c.booking.stage, "{e}");
                    metrics::counter!(crate::observability::CALLBACKS_TOTAL, "status" => "failed")
                        .increment(1);
                }
            }
        })
    });
    join_all(deliveries).await;
}
