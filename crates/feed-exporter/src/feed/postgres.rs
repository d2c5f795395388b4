//! Postgres LISTEN/NOTIFY change feed.
//!
//! A trigger on the collection table (see `sql/notify_trigger.sql`) sends a
//! JSON payload per row change:
//!
//! ```json
//! {"operation": "update", "before": {"id": 4}, "after": {"id": 4}}
//! ```
//!
//! Malformed payloads are logged and skipped; they do not end the stream.

use crate::errors::FeedError;
use crate::feed::{ChangeFeed, NotificationStream};
use crate::models::ChangeNotification;
use futures::{future, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgListener;
use tracing::{info, warn};

/// Change feed listening on one Postgres notification channel.
pub struct PgChangeFeed {
    url: SecretString,
    channel: String,
}

impl PgChangeFeed {
    pub fn new(url: SecretString, channel: impl Into<String>) -> Self {
        Self {
            url,
            channel: channel.into(),
        }
    }
}

/// Parse one notification payload, logging and dropping malformed ones.
fn parse_payload(channel: &str, payload: &str) -> Option<ChangeNotification> {
    match ChangeNotification::from_json(payload) {
        Ok(notification) => Some(notification),
        Err(e) => {
            warn!(
                target: "feed_exporter.feed",
                channel = %channel,
                error = %e,
                "Skipping malformed change notification"
            );
            None
        }
    }
}

#[async_trait::async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<NotificationStream, FeedError> {
        let mut listener = PgListener::connect(self.url.expose_secret())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        listener
            .listen(&self.channel)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        info!(
            target: "feed_exporter.feed",
            channel = %self.channel,
            "Listening for change notifications"
        );

        let channel = self.channel.clone();
        let stream = listener.into_stream().filter_map(move |item| {
            let parsed = match item {
                Ok(notification) => parse_payload(&channel, notification.payload()).map(Ok),
                Err(e) => Some(Err(FeedError::Stream(e.to_string()))),
            };
            future::ready(parsed)
        });

        Ok(stream.boxed())
    }
}
