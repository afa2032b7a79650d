use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenaError {
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Unknown subscription {0}")]
    UnknownSubscription(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Event delivery to {sid} failed: {reason}")]
    Delivery { sid: String, reason: String },
}
