// Notification history log
// Per-user, append-only record of delivered notifications

use crate::db::repositories::NotificationRepository;
use crate::errors::HistoryError;
use crate::models::NotificationRecord;
use async_trait::async_trait;

/// Append-only store of delivered notifications, scoped by user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, user_id: &str, record: &NotificationRecord) -> Result<(), HistoryError>;

    async fn list(&self, user_id: &str) -> Result<Vec<NotificationRecord>, HistoryError>;
}

/// History log backed by the `user_notifications` table
#[derive(Debug, Clone)]
pub struct SqliteHistoryLog {
    repository: NotificationRepository,
}

impl SqliteHistoryLog {
    pub fn new(repository: NotificationRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl HistoryLog for SqliteHistoryLog {
    async fn append(&self, user_id: &str, record: &NotificationRecord) -> Result<(), HistoryError> {
        self.repository
            .append(user_id, record)
            .await
            .map(|_| ())
            .map_err(|e| HistoryError::AppendFailed {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn list(&self, user_id: &str) -> Result<Vec<NotificationRecord>, HistoryError> {
        self.repository
            .list_for_user(user_id)
            .await
            .map_err(|e| HistoryError::ReadFailed(e.to_string()))
    }
}
