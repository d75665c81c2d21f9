//! Change feed of newly inserted notification rows.
//!
//! In PostgreSQL an `AFTER INSERT` trigger on `notifications` publishes the id
//! of each new row on the [`NOTIFICATION_CHANNEL`] channel (see `migrations/`).
//! The listener loads the row itself, so payload size never limits an insert.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use tokio::sync::mpsc;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NotificationEvent, NotificationPayload};

pub const NOTIFICATION_CHANNEL: &str = "notification_inserted";

/// Default buffer between the feed and the dispatcher.
const DEFAULT_BUFFER: usize = 256;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription. The stream ends when the receiver is dropped.
    async fn subscribe(&self) -> Result<mpsc::Receiver<NotificationEvent>, AppError>;
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    body: String,
    deep_link: Option<String>,
    data: Json<serde_json::Map<String, serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for NotificationEvent {
    fn from(row: NotificationRow) -> Self {
        NotificationEvent {
            id: row.id,
            payload: NotificationPayload {
                kind: row.kind.into(),
                title: row.title,
                body: row.body,
                deep_link: row.deep_link,
                data: row.data.0,
            },
            created_at: row.created_at,
        }
    }
}

async fn fetch_event(pool: &PgPool, id: Uuid) -> Result<Option<NotificationEvent>, AppError> {
    let row: Option<NotificationRow> = sqlx::query_as(
        r#"
        SELECT id, type, title, body, deep_link, data, created_at
        FROM notifications WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(NotificationEvent::from))
}

/// `LISTEN`-based change feed.
pub struct PgChangeFeed {
    pool: PgPool,
    buffer: usize,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            buffer: DEFAULT_BUFFER,
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<NotificationEvent>, AppError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFICATION_CHANNEL).await?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            tracing::info!(channel = NOTIFICATION_CHANNEL, "Listening for new notifications");

            loop {
                let notification = tokio::select! {
                    _ = tx.closed() => break,
                    received = listener.recv() => received,
                };

                let notification = match notification {
                    Ok(notification) => notification,
                    Err(e) => {
                        // PgListener reconnects on the next recv()
                        tracing::warn!(error = %e, "Change feed connection lost, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let id = match notification.payload().trim().parse::<Uuid>() {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(error = %e, payload = notification.payload(), "Dropping change feed payload without a notification id");
                        continue;
                    }
                };

                match fetch_event(&pool, id).await {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(notification_id = %id, "Announced notification row not found");
                    }
                    Err(e) => {
                        tracing::warn!(notification_id = %id, error = %e, "Failed to load announced notification");
                    }
                }
            }

            tracing::info!("Change feed subscription closed");
        });

        Ok(rx)
    }
}
