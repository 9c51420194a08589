//! Maps `sqlx::Error` into the gateway's own typed categories (§4.2), so
//! callers never have to match on a driver-specific error type.

use lead_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => GatewayError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    GatewayError::Conflict(db_err.to_string())
                } else if db_err.is_foreign_key_violation() {
                    GatewayError::InvalidReference(db_err.to_string())
                } else {
                    GatewayError::Unknown(db_err.to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                GatewayError::Connection(err.to_string())
            }
            other => GatewayError::Unknown(other.to_string()),
        }
    }
}

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => CoreError::NotFound(msg),
            GatewayError::Conflict(msg) => CoreError::Conflict(msg),
            GatewayError::InvalidReference(msg) => CoreError::Validation(msg),
            GatewayError::Connection(msg) | GatewayError::Unknown(msg) => CoreError::Database(msg),
        }
    }
}
