//! HTTP error taxonomy for the public API.
//!
//! Every failure a handler can surface is an [`ApiError`] variant with a
//! fixed status code, a stable machine-readable `error_code`, and a `type`
//! discriminator. The response body shape is [`ErrorBody`] from the core
//! crate, so clients can match on `error.error_code` without parsing the
//! human-readable message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use callwire_core::{CallId, ErrorBody};
use thiserror::Error;

use crate::call::{CancelError, RelayError};

/// Errors returned by the HTTP API surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No `Authorization` header, or one that is not `Bearer <token>`.
    #[error("Missing or malformed Authorization header")]
    MissingAuth,

    /// A bearer token was presented but does not match the configured one.
    #[error("Invalid authentication token")]
    InvalidToken,

    /// The call id does not resolve to a retained call record.
    #[error("Call '{0}' not found")]
    CallNotFound(CallId),

    /// The operation kind does not resolve to a registered handler.
    #[error("Kind '{0}' not found")]
    KindNotFound(String),

    /// The request body failed to parse or validate.
    #[error("{0}")]
    Validation(String),

    /// Another consumer currently holds the call's event stream.
    #[error("Call '{0}' already has an active stream consumer")]
    StreamBusy(CallId),

    /// The upstream text provider rejected or aborted the request.
    #[error("{0}")]
    Provider(String),
}

impl ApiError {
    /// HTTP status code for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingAuth => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::CallNotFound(_) | Self::KindNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StreamBusy(_) => StatusCode::CONFLICT,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code carried in the response body.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingAuth => "AUTH_ERROR",
            Self::InvalidToken => "AUTHZ_ERROR",
            Self::CallNotFound(_) => "CALL_NOT_FOUND",
            Self::KindNotFound(_) => "KIND_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::StreamBusy(_) => "STREAM_BUSY",
            Self::Provider(_) => "PROVIDER_ERROR",
        }
    }

    /// Value of the body's `type` discriminator.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::MissingAuth => "AuthenticationError",
            Self::InvalidToken => "AuthorizationError",
            Self::CallNotFound(_) => "CallNotFoundError",
            Self::KindNotFound(_) => "UnknownOperationKindError",
            Self::Validation(_) => "ValidationError",
            Self::StreamBusy(_) => "StreamBusyError",
            Self::Provider(_) => "ProviderError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.to_string(), self.error_code(), self.kind_name());
        (self.status(), Json(body)).into_response()
    }
}

impl From<CancelError> for ApiError {
    fn from(err: CancelError) -> Self {
        match err {
            CancelError::NotFound(id) => Self::CallNotFound(id),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound(id) => Self::CallNotFound(id),
            RelayError::Busy(id) => Self::StreamBusy(id),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_maps_to_401() {
        let (status, body) = body_json(ApiError::MissingAuth).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"]["message"],
            "Missing or malformed Authorization header"
        );
        assert_eq!(body["error"]["error_code"], "AUTH_ERROR");
        assert_eq!(body["error"]["type"], "AuthenticationError");
    }

    #[tokio::test]
    async fn invalid_token_maps_to_403() {
        let (status, body) = body_json(ApiError::InvalidToken).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Invalid authentication token");
        assert_eq!(body["error"]["error_code"], "AUTHZ_ERROR");
        assert_eq!(body["error"]["type"], "AuthorizationError");
    }

    #[tokio::test]
    async fn call_not_found_names_the_call() {
        let id = CallId::generate();
        let (status, body) = body_json(ApiError::CallNotFound(id.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"]["message"],
            format!("Call '{id}' not found")
        );
        assert_eq!(body["error"]["error_code"], "CALL_NOT_FOUND");
        assert_eq!(body["error"]["type"], "CallNotFoundError");
    }

    #[tokio::test]
    async fn kind_not_found_names_the_kind() {
        let (status, body) = body_json(ApiError::KindNotFound("summarize".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Kind 'summarize' not found");
        assert_eq!(body["error"]["error_code"], "KIND_NOT_FOUND");
        assert_eq!(body["error"]["type"], "UnknownOperationKindError");
    }

    #[tokio::test]
    async fn validation_maps_to_422() {
        let (status, body) = body_json(ApiError::Validation("bad input".into())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["message"], "bad input");
        assert_eq!(body["error"]["error_code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["type"], "ValidationError");
    }

    #[tokio::test]
    async fn stream_busy_maps_to_409() {
        let id = CallId::generate();
        let (status, body) = body_json(ApiError::StreamBusy(id.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["error"]["message"],
            format!("Call '{id}' already has an active stream consumer")
        );
        assert_eq!(body["error"]["error_code"], "STREAM_BUSY");
        assert_eq!(body["error"]["type"], "StreamBusyError");
    }

    #[tokio::test]
    async fn provider_maps_to_502() {
        let (status, body) = body_json(ApiError::Provider("upstream refused".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["message"], "upstream refused");
        assert_eq!(body["error"]["error_code"], "PROVIDER_ERROR");
        assert_eq!(body["error"]["type"], "ProviderError");
    }

    #[test]
    fn cancel_error_converts_to_not_found() {
        let id = CallId::generate();
        let err: ApiError = CancelError::NotFound(id.clone()).into();
        assert!(matches!(err, ApiError::CallNotFound(got) if got == id));
    }

    #[test]
    fn relay_errors_convert() {
        let id = CallId::generate();
        let err: ApiError = RelayError::NotFound(id.clone()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: ApiError = RelayError::Busy(id).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
