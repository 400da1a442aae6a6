use {
    crate::domain::error::PipelineError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// HTTP face of `PipelineError`.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            // A lost race or a redelivery; acknowledge so the sender stops retrying.
            PipelineError::InvalidTransition { current, .. } => {
                tracing::info!(error = %self.0, "acknowledging no-op transition");
                let body = serde_json::json!({
                    "ok": true,
                    "status": "noop",
                    "current": current,
                });
                return (StatusCode::OK, Json(body)).into_response();
            }
            PipelineError::SignatureMismatch(msg) => {
                tracing::warn!("rejecting request: signature mismatch ({msg})");
                (
                    StatusCode::BAD_REQUEST,
                    "signature_mismatch",
                    "invalid signature".to_string(),
                )
            }
            PipelineError::OrderNotFound(order_ref) => (
                StatusCode::NOT_FOUND,
                "order_not_found",
                format!("order not found: {order_ref}"),
            ),
            PipelineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PipelineError::DuplicateOrder(order_ref) => (
                StatusCode::CONFLICT,
                "duplicate_order",
                format!("order already exists: {order_ref}"),
            ),
            PipelineError::Gateway(msg) => {
                tracing::error!("upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "upstream service failed".to_string(),
                )
            }
            PipelineError::Unauthorized(what) => {
                tracing::warn!("rejecting request: {what}");
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "missing or invalid credentials".to_string(),
                )
            }
            PipelineError::Timeout(op) => {
                tracing::warn!("request timed out in {op}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "timeout",
                    format!("{op} timed out"),
                )
            }
            PipelineError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            PipelineError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "ok": false,
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
