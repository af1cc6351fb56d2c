use std::sync::{Arc, Mutex};

use stockcore::{NotificationMessage, Notifier, NotifyError};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Notifier that keeps every published message and fans it out to
/// subscribers over a broadcast channel.
#[derive(Debug, Clone)]
pub struct InMemoryNotifier {
    published: Arc<Mutex<Vec<NotificationMessage>>>,
    sender: broadcast::Sender<NotificationMessage>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            published: Arc::default(),
            sender,
        }
    }

    /// Receives every message published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationMessage> {
        self.sender.subscribe()
    }

    /// Every message published so far, oldest first.
    pub fn published(&self) -> Vec<NotificationMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for InMemoryNotifier {
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotifyError> {
        self.published
            .lock()
            .map_err(|_| NotifyError::Publish {
                topic: message.topic.clone(),
                detail: "notification log poisoned".to_string(),
            })?
            .push(message.clone());

        // No subscribers is not an error; the message is still recorded.
        let receivers = self.sender.send(message).unwrap_or(0);
        debug!(receivers, "[memory.publish] notification recorded");
        Ok(())
    }
}
