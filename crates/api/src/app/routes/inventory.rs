use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use foodrescue_core::{ListingId, RequestContext, StoreId};

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_inventory))
        .route("/:listing_id", get(get_inventory))
        .route("/:listing_id/adjust", post(adjust_inventory))
}

pub async fn register_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::RegisterInventoryRequest>,
) -> axum::response::Response {
    let store_id = match crate::authz::require_supplier(&ctx) {
        Ok(store_id) => store_id,
        Err(resp) => return resp,
    };

    let inventory = match services::blocking(&services, move |svc| {
        svc.register_inventory(&ctx, body.listing_id, store_id, body.qty_available, Utc::now())
    })
    .await
    {
        Ok(inv) => inv,
        Err(resp) => return resp,
    };

    (StatusCode::CREATED, Json(dto::InventoryResponse::from(inventory))).into_response()
}

pub async fn get_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(listing_id): Path<String>,
) -> axum::response::Response {
    let listing_id: ListingId = match listing_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("listing"),
    };

    match services::blocking(&services, move |svc| svc.get_inventory(listing_id)).await {
        Ok(inv) => (StatusCode::OK, Json(dto::InventoryResponse::from(inv))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn adjust_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(listing_id): Path<String>,
    Json(body): Json<dto::AdjustInventoryRequest>,
) -> axum::response::Response {
    let listing_id: ListingId = match listing_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("listing"),
    };

    let current = match services::blocking(&services, move |svc| svc.get_inventory(listing_id)).await {
        Ok(inv) => inv,
        Err(resp) => return resp,
    };
    if let Err(resp) = crate::authz::require_store(&ctx, current.store_id) {
        return resp;
    }

    match services::blocking(&services, move |svc| {
        svc.adjust_inventory(&ctx, listing_id, body.delta, Utc::now())
    })
    .await
    {
        Ok(inv) => (StatusCode::OK, Json(dto::InventoryResponse::from(inv))).into_response(),
        Err(resp) => resp,
    }
}

/// A supplier's own stock sheet.
pub async fn store_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let store_id: StoreId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("store"),
    };
    if let Err(resp) = crate::authz::require_store(&ctx, store_id) {
        return resp;
    }

    match services::blocking(&services, move |svc| Ok(svc.inventory_for_store(store_id))).await {
        Ok(rows) => {
            let items: Vec<dto::InventoryResponse> = rows.into_iter().map(dto::InventoryResponse::from).collect();
            let count = items.len();
            (StatusCode::OK, Json(dto::InventoryListResponse { items, count })).into_response()
        }
        Err(resp) => resp,
    }
}
