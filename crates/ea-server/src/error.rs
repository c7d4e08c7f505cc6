use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use trading_core::TradingError;

/// Uniform response envelope for every EA-facing endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error that maps the platform error kinds to status codes.
pub struct AppError(pub anyhow::Error);

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, retriable) = match self.0.downcast_ref::<TradingError>() {
            Some(TradingError::Auth(_)) => (StatusCode::UNAUTHORIZED, false),
            Some(TradingError::Validation(_)) | Some(TradingError::BrokerRejected(_)) => {
                (StatusCode::BAD_REQUEST, false)
            }
            Some(TradingError::NotFound(_)) => (StatusCode::NOT_FOUND, false),
            Some(TradingError::Conflict(_)) => (StatusCode::CONFLICT, false),
            Some(TradingError::Timeout(_)) => (StatusCode::REQUEST_TIMEOUT, true),
            Some(TradingError::Transient(_)) => (StatusCode::SERVICE_UNAVAILABLE, true),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, true),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.0.to_string(),
                "retriable": retriable,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(err: TradingError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn error_kind_mapping() {
        assert_eq!(status_for(TradingError::Auth("bad key".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(TradingError::Validation("bad volume".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(TradingError::BrokerRejected("stops".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(TradingError::NotFound("trade".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(TradingError::Conflict("signal race".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(TradingError::Transient("db".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(TradingError::Internal("bug".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
