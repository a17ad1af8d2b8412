use thiserror::Error;

/// The five-class error taxonomy shared by every satellite crate.
///
/// Validation and capacity errors are never retried; contention errors are
/// retried locally by [`crate::retry::with_backoff`] and only escalate to
/// `RetryExhausted` once the retry budget is spent.
#[derive(Error, Debug)]
pub enum KbError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("queue full")]
    QueueFull,

    #[error("no slot available")]
    NoSlotAvailable,

    #[error("reply inbox full")]
    ReplyInboxFull,

    #[error("no matching record")]
    NoMatchingRecord,

    #[error("retry budget exhausted after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<KbError>,
    },

    #[error("installation failed: {0}")]
    InstallationFailed(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl KbError {
    /// True for the contention-class errors `with_backoff` should retry:
    /// lock-not-available, serialization failures, and deadlocks surfaced by
    /// Postgres through `sqlx::Error::Database`.
    pub fn is_contention(&self) -> bool {
        match self {
            KbError::Store(sqlx::Error::Database(db)) => {
                matches!(
                    db.code().as_deref(),
                    Some("40001") // serialization_failure
                        | Some("40P01") // deadlock_detected
                        | Some("55P03") // lock_not_available
                )
            }
            _ => false,
        }
    }
}
