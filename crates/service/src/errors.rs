use thiserror::Error;

use crate::delivery::DeliveryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl ServiceError {
    pub fn not_found(key: &str) -> Self { Self::NotFound(format!("key {} does not exist", key)) }
    pub fn conflict(key: &str) -> Self { Self::Conflict(format!("key {} already exists", key)) }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 1001,
            ServiceError::Conflict(_) => 1002,
            ServiceError::NotFound(_) => 1003,
            ServiceError::Decode(_) => 1101,
            ServiceError::Io(_) => 1200,
            ServiceError::Delivery(_) => 1300,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}
