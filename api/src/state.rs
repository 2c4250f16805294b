use std::sync::Arc;

use common::config::Settings;
use common::db::DbPool;
use common::meeting_token::MeetingTokenService;
use common::notifications::NotificationService;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub notifications: NotificationService,
    pub meeting_tokens: MeetingTokenService,
    pub metrics_handle: PrometheusHandle,
    pub config: Arc<Settings>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(
        db_pool: DbPool,
        notifications: NotificationService,
        metrics_handle: PrometheusHandle,
        config: Settings,
    ) -> Self {
        let meeting_tokens = MeetingTokenService::new(&config.meeting_token);

        Self {
            db_pool,
            notifications,
            meeting_tokens,
            metrics_handle,
            config: Arc::new(config),
        }
    }
}
