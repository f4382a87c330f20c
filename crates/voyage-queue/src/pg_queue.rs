//! A Postgres-table-backed `WorkQueue`.
//!
//! `dispatch` claims rows with `SELECT ... FOR UPDATE SKIP LOCKED` so
//! concurrent instances never hand the same message to two dispatchers,
//! the same pattern used by Postgres-backed job queues elsewhere in the
//! corpus (claim-then-act, never read-then-write without a lock).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;

use voyage_core::{Error, Result};

use crate::message::ReadyMessage;
use crate::work_queue::{DispatchHandler, WorkQueue};

/// How long a claimed-but-not-yet-acked message stays invisible before it
/// is eligible for redelivery (visibility timeout).
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

pub struct PgWorkQueue {
    pool: PgPool,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, msg: &ReadyMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO work_queue_message (message_enum, version, flight_id) VALUES ($1, $2, $3)",
        )
        .bind(&msg.message_enum)
        .bind(msg.version as i32)
        .bind(&msg.flight_id)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| Error::QueueError(e.to_string()))
    }

    async fn dispatch(&self, max: usize, handler: DispatchHandler) -> Result<usize> {
        let mut delivered = 0usize;
        for _ in 0..max {
            let mut tx =
                self.pool.begin().await.map_err(|e| Error::QueueError(e.to_string()))?;
            let row = sqlx::query(
                "SELECT id, message_enum, version, flight_id FROM work_queue_message \
                 WHERE visible_at <= now() ORDER BY id ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
            )
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Error::QueueError(e.to_string()))?;

            let Some(row) = row else {
                tx.commit().await.ok();
                break;
            };

            let id: i64 = row.try_get("id").map_err(|e| Error::QueueError(e.to_string()))?;
            let version: i32 =
                row.try_get("version").map_err(|e| Error::QueueError(e.to_string()))?;
            let msg = ReadyMessage {
                message_enum: row.try_get("message_enum").map_err(|e| Error::QueueError(e.to_string()))?,
                version: version as u32,
                flight_id: row.try_get("flight_id").map_err(|e| Error::QueueError(e.to_string()))?,
            };

            if !msg.is_supported() {
                sqlx::query("DELETE FROM work_queue_message WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Error::QueueError(e.to_string()))?;
                tx.commit().await.map_err(|e| Error::QueueError(e.to_string()))?;
                tracing::warn!(message_enum = %msg.message_enum, version = msg.version, "dropping unsupported message");
                continue;
            }

            let next_visible: DateTime<Utc> = Utc::now() + chrono::Duration::seconds(VISIBILITY_TIMEOUT.as_secs() as i64);
            sqlx::query("UPDATE work_queue_message SET visible_at = $1 WHERE id = $2")
                .bind(next_visible)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::QueueError(e.to_string()))?;
            tx.commit().await.map_err(|e| Error::QueueError(e.to_string()))?;

            let acked = handler(msg).await;
            delivered += 1;
            if acked {
                sqlx::query("DELETE FROM work_queue_message WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::QueueError(e.to_string()))?;
            } else {
                sqlx::query("UPDATE work_queue_message SET visible_at = now() WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::QueueError(e.to_string()))?;
            }
        }
        Ok(delivered)
    }
}
