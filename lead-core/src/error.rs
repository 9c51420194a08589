//! The error taxonomy (§7): Validation, Authentication, Resource,
//! BusinessLogic, External, System, RateLimit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("authentication: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no eligible buyers")]
    NoEligibleBuyers,

    #[error("no bids received")]
    NoBids,

    #[error("all posts failed")]
    AllPostsFailed,

    #[error("bid {bid} out of range [{min}, {max}]")]
    OutOfRange { bid: String, min: String, max: String },

    #[error("buyer daily quota exceeded")]
    QuotaExceeded,

    #[error("lead is not in the expected state")]
    AlreadyProcessing,

    #[error("buyer call timed out")]
    BuyerTimeout,

    #[error("buyer returned http error {0}")]
    BuyerHttpError(u16),

    #[error("buyer response could not be parsed: {0}")]
    BuyerMalformedResponse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("rate limited")]
    RateLimit,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A coarse taxonomy category, used for logging and status mapping.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Authentication(_) => "authentication",
            Error::NotFound(_) | Error::AlreadyExists(_) | Error::Conflict(_) => "resource",
            Error::NoEligibleBuyers
            | Error::NoBids
            | Error::AllPostsFailed
            | Error::OutOfRange { .. }
            | Error::QuotaExceeded
            | Error::AlreadyProcessing => "business_logic",
            Error::BuyerTimeout | Error::BuyerHttpError(_) | Error::BuyerMalformedResponse(_) => {
                "external"
            }
            Error::Database(_) | Error::Cache(_) | Error::Queue(_) => "system",
            Error::RateLimit => "rate_limit",
            Error::Internal(_) => "system",
        }
    }
}

#[cfg(feature = "api")]
mod api {
    use super::Error;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde_json::json;

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = match &self {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::Authentication(_) => StatusCode::UNAUTHORIZED,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::AlreadyExists(_) | Error::Conflict(_) => StatusCode::CONFLICT,
                Error::NoEligibleBuyers
                | Error::NoBids
                | Error::AllPostsFailed
                | Error::OutOfRange { .. }
                | Error::QuotaExceeded
                | Error::AlreadyProcessing => StatusCode::UNPROCESSABLE_ENTITY,
                Error::BuyerTimeout | Error::BuyerHttpError(_) | Error::BuyerMalformedResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                Error::Database(_) | Error::Cache(_) | Error::Queue(_) | Error::Internal(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                Error::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            };
            let body = Json(json!({ "error": self.to_string(), "category": self.category() }));
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_the_taxonomy() {
        assert_eq!(Error::Validation("x".into()).category(), "validation");
        assert_eq!(Error::NoEligibleBuyers.category(), "business_logic");
        assert_eq!(Error::BuyerTimeout.category(), "external");
        assert_eq!(Error::Database("x".into()).category(), "system");
        assert_eq!(Error::RateLimit.category(), "rate_limit");
    }
}
