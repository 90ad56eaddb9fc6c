use thiserror::Error;

/// Error type for compute scheduler operations.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Scheduler already running")]
    AlreadyRunning,
    #[error("No tokio runtime available")]
    NoRuntime,
    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },
}
