//! Change notification.
//!
//! After a move-out commits, downstream services learn the product's new
//! total through a message on a fixed topic, keyed by the product id. The
//! publish happens outside the stock transaction and is best effort: a
//! failure is reported to the caller as a warning, never as a failed
//! transfer.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::NotifyError;
use crate::types::ProductId;

/// Topic every quantity change is published on.
pub const QUANTITY_CHANGED_TOPIC: &str = "warehouse_product_quantity_changed";

/// Payload of a quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChanged {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub new_total_quantity: i64,
}

/// A keyed message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Message transport.
pub trait Notifier: Send + Sync {
    fn publish(
        &self,
        message: NotificationMessage,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Builds and publishes quantity change messages on a configured topic.
#[derive(Debug, Clone)]
pub struct ChangeNotifier<N> {
    transport: N,
    topic: String,
}

impl<N: Notifier> ChangeNotifier<N> {
    /// Publishes on the default quantity-changed topic.
    pub fn new(transport: N) -> Self {
        Self::with_topic(transport, QUANTITY_CHANGED_TOPIC)
    }

    /// Publishes on `topic` instead.
    pub fn with_topic(transport: N, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub const fn transport(&self) -> &N {
        &self.transport
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes `{productID, newTotalQuantity}` keyed by the product id.
    #[instrument(name = "notifier.quantity_changed", skip(self), fields(topic = %self.topic))]
    pub async fn notify_quantity_changed(
        &self,
        product_id: ProductId,
        new_total_quantity: i64,
    ) -> Result<(), NotifyError> {
        let message = quantity_changed_message(&self.topic, product_id, new_total_quantity)?;
        self.transport.publish(message).await.inspect_err(|error| {
            warn!(
                error = %error,
                "[notifier.quantity_changed] publish failed"
            );
        })
    }
}

/// Encodes a quantity change for `topic`.
pub fn quantity_changed_message(
    topic: &str,
    product_id: ProductId,
    new_total_quantity: i64,
) -> Result<NotificationMessage, NotifyError> {
    let payload = serde_json::to_value(QuantityChanged {
        product_id,
        new_total_quantity,
    })
    .map_err(|error| NotifyError::Encode(error.to_string()))?;

    Ok(NotificationMessage {
        topic: topic.to_string(),
        key: product_id.to_string(),
        payload,
    })
}
