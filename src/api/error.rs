//! HTTP mapping for service errors.
//!
//! Every failure leaves as `{ code, message, status, timestamp }`. Internal
//! details stay in the logs.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::error::AuthError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

fn body(status: StatusCode, code: &str, message: String) -> Json<ErrorBody> {
    Json(ErrorBody {
        code: status.as_u16(),
        message,
        status: code.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                body(StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            )
                .into_response(),
            Self::Auth(err) => err.into_response(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated(reason) => (
                StatusCode::UNAUTHORIZED,
                body(
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    reason.message().to_string(),
                ),
            )
                .into_response(),
            Self::QuotaExceeded {
                retry_after_seconds,
            } => {
                let message = AuthError::QuotaExceeded {
                    retry_after_seconds,
                }
                .to_string();
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    body(StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", message),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                response
            }
            Self::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                body(StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            )
                .into_response(),
            Self::UpstreamDependency(detail) => {
                error!("Upstream dependency failure: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    body(
                        StatusCode::BAD_GATEWAY,
                        "OAUTH_UPSTREAM_FAILURE",
                        "OAuth provider request failed. Please restart the login.".to_string(),
                    ),
                )
                    .into_response()
            }
            Self::InvalidConfiguration(detail) => {
                error!("Invalid configuration reached request path: {detail}");
                internal_error()
            }
            Self::Storage(err) => {
                error!("Storage failure: {err:#}");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An unexpected error occurred.".to_string(),
        ),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnauthenticatedReason;

    #[test]
    fn quota_exceeded_sets_retry_after() {
        let response = AuthError::QuotaExceeded {
            retry_after_seconds: 17,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("17")
        );
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (
                AuthError::unauthenticated(UnauthenticatedReason::ReuseDetected),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AuthError::InvalidRequest("Missing authorization code.".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuthError::UpstreamDependency("timeout".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AuthError::Storage(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
        assert_eq!(
            ApiError::BadRequest("nope".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
