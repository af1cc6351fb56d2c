use sqlx::postgres::PgListener;
use sqlx::{Pool, Postgres, query};
use stockcore::{NotificationMessage, Notifier, NotifyError};
use tracing::{debug, instrument};

use crate::PostgresStoreError;

/// Publishes each message as a `NOTIFY` on a channel named after its topic.
///
/// The notification payload is the whole message as JSON, so listeners see
/// the key as well as the body.
#[derive(Debug, Clone)]
pub struct PostgresNotifier {
    pool: Pool<Postgres>,
}

impl PostgresNotifier {
    pub const fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Starts listening on `topic`.
    pub async fn listen(&self, topic: &str) -> Result<NotificationListener, PostgresStoreError> {
        let listen_failed = |source: sqlx::Error| PostgresStoreError::ListenFailed {
            channel: topic.to_string(),
            source,
        };
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(listen_failed)?;
        listener.listen(topic).await.map_err(listen_failed)?;
        Ok(NotificationListener {
            channel: topic.to_string(),
            listener,
        })
    }
}

impl Notifier for PostgresNotifier {
    #[instrument(name = "postgres.notify", skip(self, message), fields(topic = %message.topic, key = %message.key))]
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotifyError> {
        let body =
            serde_json::to_string(&message).map_err(|error| NotifyError::Encode(error.to_string()))?;

        let _ = query("SELECT pg_notify($1, $2)")
            .bind(&message.topic)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|error| NotifyError::Publish {
                topic: message.topic.clone(),
                detail: error.to_string(),
            })?;

        debug!("[postgres.notify] notification sent");
        Ok(())
    }
}

/// Receiving side of [`PostgresNotifier`].
pub struct NotificationListener {
    channel: String,
    listener: PgListener,
}

impl NotificationListener {
    /// Waits for the next message.
    pub async fn recv(&mut self) -> Result<NotificationMessage, NotifyError> {
        let notification = self
            .listener
            .recv()
            .await
            .map_err(|error| NotifyError::Publish {
                topic: self.channel.clone(),
                detail: error.to_string(),
            })?;

        serde_json::from_str(notification.payload())
            .map_err(|error| NotifyError::Encode(error.to_string()))
    }
}
