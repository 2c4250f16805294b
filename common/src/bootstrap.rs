// Bootstrap utilities for binary initialization
// Shared by the API server and the end-to-end tests

use crate::config::Settings;
use crate::db::repositories::{JobRepository, NotificationRepository};
use crate::db::DbPool;
use crate::dispatch::Dispatcher;
use crate::history::{HistoryLog, SqliteHistoryLog};
use crate::notifications::NotificationService;
use crate::push::{ExpoPushClient, PushDelivery};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize database pool
///
/// # Errors
/// Returns error if database pool initialization fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Initialize the push client from `[push]` settings
pub fn init_push_client(settings: &Settings) -> Result<Arc<dyn PushDelivery>> {
    let client = ExpoPushClient::new(&settings.push).context("Failed to create push client")?;

    info!(endpoint = %settings.push.endpoint, "Push client initialized");
    Ok(Arc::new(client))
}

/// Wire the scheduler, job store, dispatcher and history log together.
///
/// When `scheduler.recover_on_startup` is set, stored jobs that have not fired
/// yet are re-armed before this returns. The scheduler's timer task is running
/// afterwards either way.
#[tracing::instrument(skip_all)]
pub async fn init_notification_service(
    settings: &Settings,
    db_pool: DbPool,
    push: Arc<dyn PushDelivery>,
) -> Result<NotificationService> {
    let history: Arc<dyn HistoryLog> = Arc::new(SqliteHistoryLog::new(
        NotificationRepository::new(db_pool.clone()),
    ));
    let dispatcher = Dispatcher::new(push, history.clone());
    let scheduler = SchedulerEngine::new(SchedulerConfig::from(&settings.scheduler));

    let service = NotificationService::new(
        scheduler,
        JobRepository::new(db_pool),
        dispatcher,
        history,
    );

    // Ids must never collide with stored ones, even when recovery is off
    service
        .seed_from_store()
        .await
        .context("Failed to read stored job ids")?;

    if settings.scheduler.recover_on_startup {
        let rearmed = service
            .recover()
            .await
            .context("Failed to recover pending notifications")?;
        info!(rearmed, "Startup recovery complete");
    } else {
        service.scheduler().ensure_running();
    }

    Ok(service)
}
