//! Error types for slot-engine operations.

use thiserror::Error;

/// Failure reported by an [`AvailabilityStore`](crate::store::AvailabilityStore)
/// implementation. The engine never inspects or retries these.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error(transparent)]
    Store(StoreError),
}

impl SlotError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SlotError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SlotError>;
