// Error handling framework
// Request-time errors are returned to the caller; fire-time errors are only logged.

use thiserror::Error;

/// Input validation errors for incoming schedule requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid session timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Errors reported synchronously by the scheduler when registering a trigger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArmError {
    #[error("Scheduler has been shut down")]
    SchedulerStopped,

    #[error("Scheduler capacity of {limit} armed triggers reached")]
    CapacityExceeded { limit: usize },

    #[error("Job id {0} is already armed")]
    DuplicateJobId(u64),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Push delivery errors, raised at fire time
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Push request failed: {0}")]
    RequestFailed(String),

    #[error("Push service responded with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Push service rejected the ticket: {0}")]
    TicketError(String),
}

/// History log errors, raised at fire time after a successful delivery
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to append notification for user {user_id}: {reason}")]
    AppendFailed { user_id: String, reason: String },

    #[error("Failed to read notifications: {0}")]
    ReadFailed(String),
}

/// Meeting token signing errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid role type '{0}': expected an integer")]
    InvalidRoleType(String),

    #[error("Meeting token signing is not configured")]
    NotConfigured,

    #[error("Failed to sign token: {0}")]
    SigningFailed(String),
}

/// Failure of a whole schedule request
#[derive(Error, Debug)]
pub enum ScheduleRequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to schedule {kind} notification: {source}")]
    Arming {
        kind: &'static str,
        #[source]
        source: ArmError,
    },

    #[error("Failed to store jobs: {0}")]
    Persistence(#[from] DatabaseError),
}

impl ScheduleRequestError {
    /// Machine-checkable category reported to API clients
    pub fn category(&self) -> &'static str {
        match self {
            ScheduleRequestError::Validation(ValidationError::InvalidTimestamp { .. }) => {
                "invalid_timestamp"
            }
            ScheduleRequestError::Validation(_) => "validation_error",
            ScheduleRequestError::Arming { .. } => "scheduling_failed",
            ScheduleRequestError::Persistence(_) => "persistence_failed",
        }
    }

    /// Whether the caller sent bad input, as opposed to a server-side failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScheduleRequestError::Validation(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DatabaseError::DuplicateKey(db_err.message().to_string())
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::RequestFailed(err.to_string())
    }
}
