use super::queue::QueueError;

/// Error type for scheduler runs.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),
    #[error("Failed to build processor pool: {0}")]
    ThreadPool(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
