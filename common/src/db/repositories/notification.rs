// Notification history repository
// Append-only, user-scoped notification records

use crate::db::repositories::job::{format_timestamp, parse_timestamp};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::NotificationRecord;
use sqlx::Row;
use tracing::instrument;

/// Repository for the per-user notification history
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a record to a user's history
    #[instrument(skip(self, record), fields(session_id = %record.session_id))]
    pub async fn append(
        &self,
        user_id: &str,
        record: &NotificationRecord,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_notifications (
                user_id, session_id, push_target, title, body, sent_at, read
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(user_id)
        .bind(&record.session_id)
        .bind(&record.push_target)
        .bind(&record.title)
        .bind(&record.body)
        .bind(format_timestamp(record.sent_at))
        .bind(record.read)
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// A user's history, oldest first
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, push_target, title, body, sent_at, read
            FROM user_notifications
            WHERE user_id = ?1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<NotificationRecord, DatabaseError> {
                let sent_at: String = row.try_get("sent_at")?;
                Ok(NotificationRecord {
                    session_id: row.try_get("session_id")?,
                    push_target: row.try_get("push_target")?,
                    title: row.try_get("title")?,
                    body: row.try_get("body")?,
                    sent_at: parse_timestamp("sent_at", &sent_at)?,
                    read: row.try_get("read")?,
                })
            })
            .collect()
    }
}
