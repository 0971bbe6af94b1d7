use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use common_database::{extract_timeout_type, is_timeout_error, CustomDatabaseError};
use common_redis::CustomRedisError;
use serde::Serialize;
use thiserror::Error;

/// Error body shared by every failing endpoint, mirroring the success
/// envelope in `api::types`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Short link not found")]
    LinkNotFound,
    #[error("Custom alias already exists")]
    AliasTaken,
    #[error("User with this email already exists")]
    EmailTaken,
    #[error("This short link has expired")]
    LinkExpired,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Unable to generate a unique short code")]
    CodeSpaceExhausted,
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("Database unavailable")]
    DatabaseUnavailable,
    #[error("Redis unavailable")]
    RedisUnavailable,
    /// Timeout with an optional classification label, e.g. "pool_timeout"
    /// or "query_canceled".
    #[error("Timed out while fetching data")]
    Timeout(Option<String>),
}

impl ApiError {
    /// Returns (error_code, status_code) for this error.
    ///
    /// One table keeps machine-readable codes and HTTP statuses consistent
    /// across every variant.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Validation(_) => ("validation_failed", StatusCode::BAD_REQUEST),
            ApiError::Unauthorized(_) => ("unauthorized", StatusCode::UNAUTHORIZED),
            ApiError::LinkNotFound => ("not_found", StatusCode::NOT_FOUND),
            ApiError::AliasTaken => ("alias_taken", StatusCode::CONFLICT),
            ApiError::EmailTaken => ("email_taken", StatusCode::CONFLICT),
            ApiError::LinkExpired => ("link_expired", StatusCode::GONE),
            ApiError::RateLimited => ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
            ApiError::CodeSpaceExhausted => {
                ("code_space_exhausted", StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Internal(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Database(_) => ("database_error", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::DatabaseUnavailable => {
                ("database_unavailable", StatusCode::SERVICE_UNAVAILABLE)
            }
            ApiError::RedisUnavailable => ("redis_unavailable", StatusCode::SERVICE_UNAVAILABLE),
            ApiError::Timeout(_) => ("timeout", StatusCode::SERVICE_UNAVAILABLE),
        }
    }

    /// Returns a short error code for canonical logging.
    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_metadata().1
    }

    pub fn is_5xx(&self) -> bool {
        self.status_code().is_server_error()
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::CodeSpaceExhausted => {
                "An internal server error occurred. Please try again later.".to_string()
            }
            ApiError::Database(_) => {
                "A database error occurred. Please try again later.".to_string()
            }
            ApiError::DatabaseUnavailable => {
                "Our database is currently unavailable. Please try again later.".to_string()
            }
            ApiError::RedisUnavailable => {
                "Our cache service is currently unavailable. Please try again later.".to_string()
            }
            ApiError::Timeout(_) => {
                "The request timed out. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();

        // Server-side failures get logged with their internal detail, the
        // client only sees the generic message.
        match &self {
            ApiError::Internal(msg) => tracing::error!(code, "internal server error: {msg}"),
            ApiError::Database(err) => tracing::error!(code, "database error: {err}"),
            ApiError::DatabaseUnavailable | ApiError::RedisUnavailable => {
                tracing::error!(code, "dependency unavailable")
            }
            ApiError::Timeout(timeout_type) => {
                let timeout_type = timeout_type.as_deref().unwrap_or("unknown");
                tracing::error!(code, timeout_type, "request timed out")
            }
            ApiError::CodeSpaceExhausted => {
                tracing::error!(code, "short code generation ran out of retries")
            }
            _ => {}
        }

        let body = ErrorBody {
            success: false,
            code,
            message: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CustomRedisError> for ApiError {
    fn from(e: CustomRedisError) -> Self {
        match e {
            CustomRedisError::Timeout => ApiError::Timeout(Some("redis_timeout".to_string())),
            CustomRedisError::NotFound
            | CustomRedisError::ParseError(_)
            | CustomRedisError::Redis(_) => ApiError::RedisUnavailable,
        }
    }
}

impl From<CustomDatabaseError> for ApiError {
    fn from(e: CustomDatabaseError) -> Self {
        match e {
            CustomDatabaseError::Timeout(_) => {
                ApiError::Timeout(Some("client_timeout".to_string()))
            }
            CustomDatabaseError::Other(sqlx_error) => {
                if is_timeout_error(&sqlx_error) {
                    ApiError::Timeout(extract_timeout_type(&sqlx_error).map(|s| s.to_string()))
                } else {
                    ApiError::DatabaseUnavailable
                }
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if is_timeout_error(&e) {
            ApiError::Timeout(extract_timeout_type(&e).map(|s| s.to_string()))
        } else {
            ApiError::Database(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_http_semantics() {
        assert_eq!(
            ApiError::Validation("".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::LinkNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::AliasTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::LinkExpired.status_code(), StatusCode::GONE);
        assert_eq!(
            ApiError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal("".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::DatabaseUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Timeout(None).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_is_5xx() {
        assert!(ApiError::Internal("test".to_string()).is_5xx());
        assert!(ApiError::Database(sqlx::Error::RowNotFound).is_5xx());
        assert!(ApiError::DatabaseUnavailable.is_5xx());
        assert!(ApiError::RedisUnavailable.is_5xx());
        assert!(ApiError::Timeout(None).is_5xx());
        assert!(ApiError::CodeSpaceExhausted.is_5xx());

        assert!(!ApiError::Validation("test".to_string()).is_5xx());
        assert!(!ApiError::Unauthorized("test".to_string()).is_5xx());
        assert!(!ApiError::LinkNotFound.is_5xx());
        assert!(!ApiError::AliasTaken.is_5xx());
        assert!(!ApiError::LinkExpired.is_5xx());
        assert!(!ApiError::RateLimited.is_5xx());
    }

    #[test]
    fn test_error_codes_are_unique_and_well_formed() {
        use std::collections::HashSet;

        let errors: Vec<ApiError> = vec![
            ApiError::Validation("test".to_string()),
            ApiError::Unauthorized("test".to_string()),
            ApiError::LinkNotFound,
            ApiError::AliasTaken,
            ApiError::EmailTaken,
            ApiError::LinkExpired,
            ApiError::RateLimited,
            ApiError::CodeSpaceExhausted,
            ApiError::Internal("test".to_string()),
            ApiError::Database(sqlx::Error::RowNotFound),
            ApiError::DatabaseUnavailable,
            ApiError::RedisUnavailable,
            ApiError::Timeout(None),
        ];

        let mut seen_codes: HashSet<&'static str> = HashSet::new();
        for error in &errors {
            let code = error.error_code();
            assert!(!code.is_empty());
            assert!(!code.contains(' '), "code should not contain spaces: {code}");
            assert!(seen_codes.insert(code), "duplicate error code '{code}'");
        }
    }

    #[test]
    fn test_database_error_conversion_timeout() {
        let flagged: ApiError = sqlx::Error::PoolTimedOut.into();
        assert!(
            matches!(flagged, ApiError::Timeout(Some(ref t)) if t == "pool_timeout")
        );
    }

    #[test]
    fn test_database_error_conversion_non_timeout() {
        let converted: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(converted, ApiError::Database(_)));
    }

    #[test]
    fn test_redis_error_conversion() {
        let timeout: ApiError = CustomRedisError::Timeout.into();
        assert!(matches!(timeout, ApiError::Timeout(Some(ref t)) if t == "redis_timeout"));

        let unavailable: ApiError = CustomRedisError::ParseError("bad".to_string()).into();
        assert!(matches!(unavailable, ApiError::RedisUnavailable));
    }

    #[test]
    fn test_internal_detail_not_leaked_to_client() {
        let err = ApiError::Internal("secret pool details".to_string());
        assert!(!err.client_message().contains("secret"));

        let err = ApiError::Database(sqlx::Error::RowNotFound);
        assert!(!err.client_message().contains("RowNotFound"));
    }
}
