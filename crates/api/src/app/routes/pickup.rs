use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use foodrescue_core::RequestContext;

use crate::app::dto;
use crate::app::services::{self, AppServices};

/// Redeem a pickup token at the counter, completing its order.
pub async fn validate_pickup(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::ValidatePickupRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_supplier(&ctx) {
        return resp;
    }

    let token = body.token.trim().to_string();
    let collected = match services::blocking(&services, move |svc| {
        svc.validate_pickup(&ctx, &token, Utc::now())
    })
    .await
    {
        Ok(order) => order,
        Err(resp) => return resp,
    };

    (StatusCode::OK, Json(dto::OrderResponse::from(&collected))).into_response()
}
