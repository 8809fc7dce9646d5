use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy surfaced to the HTTP boundary. Every store or crypto
/// failure is wrapped and propagated verbatim; services never retry, since
/// there is no safe automatic retry for a read-modify-write sequence.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Vote target absent. Distinct from `NotFound` so the boundary can
    /// serialize the dedicated message.
    #[error("{0}")]
    ResponseNotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Invalid(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error("store failure: {0}")]
    Store(#[from] mongodb::error::Error),
    #[error("serialization failure: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}

impl ServiceError {
    /// Stable machine-checkable status class.
    fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::ResponseNotFound(_) => "response_not_found",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Invalid(_) => "invalid_request",
            ServiceError::Crypto(_) => "crypto_failure",
            ServiceError::Store(_) | ServiceError::Bson(_) => "store_failure",
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) | ServiceError::ResponseNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
            ServiceError::Crypto(_) | ServiceError::Store(_) | ServiceError::Bson(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{}", self);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ResponseNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Crypto("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn conflict_and_vote_miss_have_distinct_codes() {
        assert_eq!(ServiceError::Conflict("x".into()).code(), "conflict");
        assert_eq!(
            ServiceError::ResponseNotFound("x".into()).code(),
            "response_not_found"
        );
    }
}
