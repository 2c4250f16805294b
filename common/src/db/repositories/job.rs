// Job repository implementation
// Write-once audit/recovery records of armed triggers

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Job, JobId, NewJob, TriggerKind};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

const JOB_COLUMNS: &str = "id, session_id, job_id, trigger_kind, user_id, push_target, \
                           session_timestamp, fire_at, created_at";

/// Timestamps are stored as fixed-width RFC 3339 text in UTC with microseconds,
/// which keeps lexicographic order equal to chronological order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow(format!("{} '{}': {}", column, value, e)))
}

/// Repository for job-related database operations
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    /// Create a new JobRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a single job row and return its row id
    #[instrument(skip(self, job), fields(session_id = %job.session_id, job_id = %job.job_id))]
    pub async fn record_job(&self, job: &NewJob) -> Result<i64, DatabaseError> {
        let mut conn = self.pool.pool().acquire().await?;
        let id = insert_job(&mut conn, job).await?;

        tracing::info!(row_id = id, kind = %job.kind, "Job recorded");
        Ok(id)
    }

    /// Insert several job rows atomically: either all land or none do
    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    pub async fn record_jobs(&self, jobs: &[NewJob]) -> Result<Vec<i64>, DatabaseError> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(insert_job(&mut tx, job).await?);
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(row_ids = ?ids, "Jobs recorded");
        Ok(ids)
    }

    /// All jobs recorded for a session, oldest first
    #[instrument(skip(self))]
    pub async fn find_by_session(&self, session_id: &str) -> Result<Vec<Job>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE session_id = ?1 ORDER BY id",
            JOB_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Jobs whose fire time is still ahead of `now`, earliest first
    #[instrument(skip(self))]
    pub async fn find_pending(&self, now: DateTime<Utc>) -> Result<Vec<Job>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE fire_at > ?1 ORDER BY fire_at, id",
            JOB_COLUMNS
        ))
        .bind(format_timestamp(now))
        .fetch_all(self.pool.pool())
        .await?;

        let jobs: Vec<Job> = rows.iter().map(job_from_row).collect::<Result<_, _>>()?;
        tracing::debug!(count = jobs.len(), "Found pending jobs");
        Ok(jobs)
    }

    /// Highest scheduler job id ever recorded
    #[instrument(skip(self))]
    pub async fn max_job_id(&self) -> Result<Option<JobId>, DatabaseError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(job_id) FROM jobs")
            .fetch_one(self.pool.pool())
            .await?;

        Ok(max.map(|raw| JobId::new(raw as u64)))
    }

    /// Total number of job rows
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(count)
    }
}

async fn insert_job(
    conn: &mut sqlx::SqliteConnection,
    job: &NewJob,
) -> Result<i64, DatabaseError> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (
            session_id, job_id, trigger_kind, user_id, push_target,
            session_timestamp, fire_at, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&job.session_id)
    .bind(job.job_id.get() as i64)
    .bind(job.kind.as_str())
    .bind(&job.user_id)
    .bind(&job.push_target)
    .bind(format_timestamp(job.session_timestamp))
    .bind(format_timestamp(job.fire_at))
    .bind(format_timestamp(Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

fn job_from_row(row: &SqliteRow) -> Result<Job, DatabaseError> {
    let kind: String = row.try_get("trigger_kind")?;
    let job_id: i64 = row.try_get("job_id")?;
    let session_timestamp: String = row.try_get("session_timestamp")?;
    let fire_at: String = row.try_get("fire_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        job_id: JobId::new(job_id as u64),
        kind: kind
            .parse::<TriggerKind>()
            .map_err(DatabaseError::CorruptRow)?,
        user_id: row.try_get("user_id")?,
        push_target: row.try_get("push_target")?,
        session_timestamp: parse_timestamp("session_timestamp", &session_timestamp)?,
        fire_at: parse_timestamp("fire_at", &fire_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
