// Notification service
// Turns schedule requests into armed, persisted triggers and restores them after a restart

use crate::db::repositories::JobRepository;
use crate::dispatch::Dispatcher;
use crate::errors::{ArmError, DatabaseError, HistoryError, ScheduleRequestError};
use crate::history::HistoryLog;
use crate::models::{JobId, NewJob, NotificationRecord, ScheduleRequest, Trigger};
use crate::scheduler::{FireCallback, Scheduler, SchedulerEngine};
use crate::telemetry;
use crate::triggers::{build_triggers, validate_request};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One trigger of a scheduled session, as reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmedTrigger {
    pub job_id: JobId,
    pub fire_at: DateTime<Utc>,
}

/// Result of a successful schedule request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSession {
    pub session_id: String,
    pub reminder: ArmedTrigger,
    pub start: ArmedTrigger,
}

/// Coordinates the scheduler, the job store and the dispatcher
#[derive(Clone)]
pub struct NotificationService {
    scheduler: SchedulerEngine,
    jobs: JobRepository,
    dispatcher: Dispatcher,
    history: Arc<dyn HistoryLog>,
}

impl NotificationService {
    pub fn new(
        scheduler: SchedulerEngine,
        jobs: JobRepository,
        dispatcher: Dispatcher,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Self {
            scheduler,
            jobs,
            dispatcher,
            history,
        }
    }

    pub fn scheduler(&self) -> &SchedulerEngine {
        &self.scheduler
    }

    /// Schedule the reminder and start notifications of one session.
    ///
    /// On success both triggers are armed and both job rows are stored. On
    /// failure whatever was armed for this request is disarmed again and
    /// nothing is stored. A trigger whose fire time had already passed may
    /// have fired before the rollback.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, user_id = %request.user_id))]
    pub async fn schedule(
        &self,
        request: &ScheduleRequest,
    ) -> Result<ScheduledSession, ScheduleRequestError> {
        let session_at = validate_request(request)?;
        let [reminder, start] = build_triggers(request, session_at);

        let reminder_id = self.arm(&reminder).await?;
        let start_id = match self.arm(&start).await {
            Ok(id) => id,
            Err(e) => {
                self.scheduler.disarm(reminder_id).await;
                return Err(e);
            }
        };

        let jobs = [
            new_job(request, session_at, reminder_id, &reminder),
            new_job(request, session_at, start_id, &start),
        ];
        if let Err(e) = self.jobs.record_jobs(&jobs).await {
            tracing::error!(error = %e, "Failed to store jobs, disarming triggers");
            self.scheduler.disarm(reminder_id).await;
            self.scheduler.disarm(start_id).await;
            return Err(e.into());
        }

        self.scheduler.ensure_running();
        telemetry::record_trigger_armed(reminder.kind);
        telemetry::record_trigger_armed(start.kind);

        info!(
            reminder_job_id = %reminder_id,
            reminder_at = %reminder.fire_at,
            start_job_id = %start_id,
            start_at = %start.fire_at,
            "Session notifications scheduled"
        );

        Ok(ScheduledSession {
            session_id: request.session_id.clone(),
            reminder: ArmedTrigger {
                job_id: reminder_id,
                fire_at: reminder.fire_at,
            },
            start: ArmedTrigger {
                job_id: start_id,
                fire_at: start.fire_at,
            },
        })
    }

    /// Raise the scheduler's id sequence above every job id already stored,
    /// so ids stay unique across restarts whether or not recovery runs.
    #[instrument(skip(self))]
    pub async fn seed_from_store(&self) -> Result<Option<JobId>, DatabaseError> {
        let last_used = self.jobs.max_job_id().await?;
        if let Some(last_used) = last_used {
            self.scheduler.seed_job_ids(last_used);
            info!(last_used = %last_used, "Job id sequence seeded from store");
        }
        Ok(last_used)
    }

    /// Re-arm every stored job that has not reached its fire time yet.
    /// Returns how many triggers were re-armed.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, DatabaseError> {
        self.seed_from_store().await?;

        let pending = self.jobs.find_pending(Utc::now()).await?;
        let total = pending.len();
        let mut rearmed = 0;

        for job in pending {
            let trigger = job.to_trigger();
            let fire_at = trigger.fire_at;
            match self
                .scheduler
                .rearm(job.job_id, fire_at, self.fire_callback(trigger))
                .await
            {
                Ok(()) => rearmed += 1,
                Err(e) => {
                    warn!(job_id = %job.job_id, session_id = %job.session_id, error = %e, "Failed to re-arm job");
                }
            }
        }

        self.scheduler.ensure_running();
        info!(rearmed, pending = total, "Recovered pending triggers");
        Ok(rearmed)
    }

    /// Delivered notifications of a user, oldest first
    pub async fn history(&self, user_id: &str) -> Result<Vec<NotificationRecord>, HistoryError> {
        self.history.list(user_id).await
    }

    async fn arm(&self, trigger: &Trigger) -> Result<JobId, ScheduleRequestError> {
        self.scheduler
            .arm(trigger.fire_at, self.fire_callback(trigger.clone()))
            .await
            .map_err(|source: ArmError| {
                warn!(kind = %trigger.kind, error = %source, "Failed to arm trigger");
                ScheduleRequestError::Arming {
                    kind: trigger.kind.as_str(),
                    source,
                }
            })
    }

    fn fire_callback(&self, trigger: Trigger) -> FireCallback {
        let dispatcher = self.dispatcher.clone();
        Box::new(move |job_id| {
            async move {
                let result = dispatcher.dispatch(trigger.kind, &trigger.payload).await;
                tracing::debug!(job_id = %job_id, result = ?result, "Trigger handled");
            }
            .boxed()
        })
    }
}

fn new_job(
    request: &ScheduleRequest,
    session_at: DateTime<Utc>,
    job_id: JobId,
    trigger: &Trigger,
) -> NewJob {
    NewJob {
        session_id: request.session_id.clone(),
        job_id,
        kind: trigger.kind,
        user_id: request.user_id.clone(),
        push_target: request.push_target.clone(),
        session_timestamp: session_at,
        fire_at: trigger.fire_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::test_support::temp_pool;
    use crate::db::DbPool;
    use crate::history::MockHistoryLog;
    use crate::models::TriggerKind;
    use crate::push::MockPushDelivery;
    use crate::scheduler::SchedulerConfig;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    struct Fixture {
        service: NotificationService,
        jobs: JobRepository,
        pool: DbPool,
        _dir: TempDir,
    }

    async fn fixture(max_armed_triggers: usize) -> Fixture {
        let (pool, dir) = temp_pool().await;
        let jobs = JobRepository::new(pool.clone());
        let scheduler = SchedulerEngine::new(SchedulerConfig {
            poll_interval_ms: 50,
            max_armed_triggers,
        });
        let dispatcher = Dispatcher::new(
            Arc::new(MockPushDelivery::new()),
            Arc::new(MockHistoryLog::new()),
        );
        let service =
            NotificationService::new(scheduler, jobs.clone(), dispatcher, Arc::new(MockHistoryLog::new()));

        Fixture {
            service,
            jobs,
            pool,
            _dir: dir,
        }
    }

    fn request(session_id: &str, timestamp: &str) -> ScheduleRequest {
        ScheduleRequest {
            user_id: "u1".to_string(),
            push_target: "tok1".to_string(),
            session_id: session_id.to_string(),
            session_timestamp: timestamp.to_string(),
        }
    }

    fn future_timestamp() -> String {
        (Utc::now() + Duration::days(1)).to_rfc3339()
    }

    #[tokio::test]
    async fn test_schedule_arms_and_stores_both_triggers() {
        let f = fixture(0).await;

        let scheduled = f
            .service
            .schedule(&request("s1", "2099-06-01T10:00:00Z"))
            .await
            .unwrap();

        assert_eq!(scheduled.session_id, "s1");
        assert_eq!(
            scheduled.reminder.fire_at,
            Utc.with_ymd_and_hms(2099, 6, 1, 9, 30, 0).unwrap()
        );
        assert_eq!(
            scheduled.start.fire_at,
            Utc.with_ymd_and_hms(2099, 6, 1, 10, 0, 0).unwrap()
        );
        assert_ne!(scheduled.reminder.job_id, scheduled.start.job_id);
        assert_eq!(f.service.scheduler().armed_count().await, 2);

        let rows = f.jobs.find_by_session("s1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, TriggerKind::Reminder);
        assert_eq!(rows[0].job_id, scheduled.reminder.job_id);
        assert_eq!(rows[1].kind, TriggerKind::Start);
        assert_eq!(rows[1].job_id, scheduled.start.job_id);
    }

    #[tokio::test]
    async fn test_invalid_timestamp_has_no_side_effects() {
        let f = fixture(0).await;

        let err = f
            .service
            .schedule(&request("s1", "not-a-date"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "invalid_timestamp");
        assert_eq!(f.jobs.count().await.unwrap(), 0);
        assert_eq!(f.service.scheduler().armed_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_requests_are_not_deduplicated() {
        let f = fixture(0).await;
        let req = request("s1", &future_timestamp());

        f.service.schedule(&req).await.unwrap();
        f.service.schedule(&req).await.unwrap();

        assert_eq!(f.jobs.find_by_session("s1").await.unwrap().len(), 4);
        assert_eq!(f.service.scheduler().armed_count().await, 4);
    }

    #[tokio::test]
    async fn test_second_arm_failure_rolls_back_first() {
        let f = fixture(1).await;

        let err = f
            .service
            .schedule(&request("s1", &future_timestamp()))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "scheduling_failed");
        assert!(matches!(err, ScheduleRequestError::Arming { kind: "start", .. }));
        assert_eq!(f.service.scheduler().armed_count().await, 0);
        assert_eq!(f.jobs.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_disarms_both() {
        let f = fixture(0).await;
        f.pool.close().await;

        let err = f
            .service
            .schedule(&request("s1", &future_timestamp()))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "persistence_failed");
        assert_eq!(f.service.scheduler().armed_count().await, 0);
    }

    #[tokio::test]
    async fn test_recover_rearms_future_jobs_under_persisted_ids() {
        let f = fixture(0).await;
        let now = Utc::now();
        let job = |session_id: &str, job_id: u64, fire_at: DateTime<Utc>| NewJob {
            session_id: session_id.to_string(),
            job_id: JobId::new(job_id),
            kind: TriggerKind::Start,
            user_id: "u1".to_string(),
            push_target: "tok1".to_string(),
            session_timestamp: fire_at,
            fire_at,
        };
        f.jobs
            .record_jobs(&[
                job("past", 3, now - Duration::hours(1)),
                job("future", 8, now + Duration::hours(1)),
            ])
            .await
            .unwrap();

        let rearmed = f.service.recover().await.unwrap();
        assert_eq!(rearmed, 1);
        assert_eq!(f.service.scheduler().armed_count().await, 1);

        // The re-armed id is taken, so a duplicate rearm is refused
        let dup = f
            .service
            .scheduler()
            .rearm(JobId::new(8), now + Duration::hours(1), Box::new(|_| async {}.boxed()))
            .await;
        assert_eq!(dup, Err(ArmError::DuplicateJobId(8)));

        // Fresh ids continue after the highest stored one
        let scheduled = f
            .service
            .schedule(&request("s2", &future_timestamp()))
            .await
            .unwrap();
        assert_eq!(scheduled.reminder.job_id, JobId::new(9));
        assert_eq!(scheduled.start.job_id, JobId::new(10));
    }

    #[tokio::test]
    async fn test_seed_from_store_without_recovery() {
        let f = fixture(0).await;
        let at = Utc::now() + Duration::hours(1);
        f.jobs
            .record_job(&NewJob {
                session_id: "old".to_string(),
                job_id: JobId::new(5),
                kind: TriggerKind::Start,
                user_id: "u1".to_string(),
                push_target: "tok1".to_string(),
                session_timestamp: at,
                fire_at: at,
            })
            .await
            .unwrap();

        assert_eq!(f.service.seed_from_store().await.unwrap(), Some(JobId::new(5)));
        assert_eq!(f.service.scheduler().armed_count().await, 0);

        let scheduled = f
            .service
            .schedule(&request("s1", &future_timestamp()))
            .await
            .unwrap();
        assert_eq!(scheduled.reminder.job_id, JobId::new(6));
    }

    #[tokio::test]
    async fn test_recover_on_empty_store() {
        let f = fixture(0).await;
        assert_eq!(f.service.recover().await.unwrap(), 0);
        assert_eq!(f.service.scheduler().armed_count().await, 0);
    }
}
