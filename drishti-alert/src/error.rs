//! Error types for drishti-alert

use drishti_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Alert queue is shut down")]
    QueueClosed,
}

impl From<AlertError> for CoreError {
    fn from(err: AlertError) -> Self {
        match &err {
            AlertError::Config(_) => CoreError::Configuration(err.to_string()),
            _ => CoreError::Alert(err.to_string()),
        }
    }
}
