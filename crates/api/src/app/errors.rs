use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use foodrescue_infra::ServiceError;

use crate::context::ContextError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ServiceError::InsufficientStock {
            listing_id,
            requested,
            available,
        } => json_error_with(
            StatusCode::CONFLICT,
            "insufficient_stock",
            message,
            json!({ "listing_id": listing_id, "requested": requested, "available": available }),
        ),
        ServiceError::OrderState(e) => json_error_with(
            StatusCode::CONFLICT,
            "order_state",
            message,
            json!({ "order_id": e.order_id, "current": e.current, "required": e.required }),
        ),
        ServiceError::ConcurrentModification { order_id } => json_error_with(
            StatusCode::CONFLICT,
            "concurrent_modification",
            "the order was changed by someone else; please retry",
            json!({ "order_id": order_id, "retryable": true }),
        ),
        ServiceError::InvalidAdjustment {
            listing_id,
            delta,
            available,
        } => json_error_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_adjustment",
            message,
            json!({ "listing_id": listing_id, "delta": delta, "available": available }),
        ),
        ServiceError::TokenInvalid => {
            json_error(StatusCode::CONFLICT, "token_invalid", "pickup token is invalid")
        }
        ServiceError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        ServiceError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        ServiceError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        ServiceError::LockTimeout(_) => json_error_with(
            StatusCode::SERVICE_UNAVAILABLE,
            "lock_timeout",
            "the resource is busy; please retry",
            json!({ "retryable": true }),
        ),
        ServiceError::CompensationFailed { order_id, unreleased, .. } => {
            tracing::error!(%order_id, unreleased = ?unreleased, error = %message, "stock left unreleased");
            json_error_with(
                StatusCode::INTERNAL_SERVER_ERROR,
                "compensation_failed",
                "internal error",
                json!({ "order_id": order_id }),
            )
        }
        ServiceError::Internal(_) => {
            tracing::error!(error = %message, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn context_error_to_response(err: ContextError) -> axum::response::Response {
    let status = match err {
        ContextError::Missing => StatusCode::UNAUTHORIZED,
        ContextError::Ambiguous | ContextError::Malformed(_) => StatusCode::BAD_REQUEST,
    };
    json_error(status, "invalid_identity", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Like [`json_error`], with extra detail fields merged into the body.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    detail: Value,
) -> axum::response::Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Some(body), Value::Object(detail)) = (body.as_object_mut(), detail) {
        body.extend(detail);
    }
    (status, axum::Json(body)).into_response()
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}
