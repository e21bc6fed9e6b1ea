//! Lightwatch error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    /// The recipient blocked the bot or no longer exists.
    #[error("Recipient blocked or unreachable")]
    RecipientBlocked,

    #[error("Provider error: {0}")]
    Provider(String),

    /// The provider publishes no plannable schedule right now (emergency outages).
    #[error("Provider is in emergency mode, no plannable schedule")]
    ProviderEmergency,

    #[error("Cannot determine next-day schedule availability")]
    NextDayUnknown,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Cancellation and deadline errors are benign at the job boundary.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Provider states the refresh job expects from time to time.
    pub fn is_soft_provider_state(&self) -> bool {
        matches!(self, Self::ProviderEmergency | Self::NextDayUnknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(WatchError::Cancelled.is_cancellation());
        assert!(WatchError::DeadlineExceeded.is_cancellation());
        assert!(!WatchError::Store("x".into()).is_cancellation());

        assert!(WatchError::ProviderEmergency.is_soft_provider_state());
        assert!(WatchError::NextDayUnknown.is_soft_provider_state());
        assert!(!WatchError::Provider("down".into()).is_soft_provider_state());
    }
}
