use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use foodrescue_core::{ConsumerId, OrderId, RequestContext, StoreId};
use foodrescue_infra::PlaceOrder;
use foodrescue_orders::Order;

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/accept", post(accept_order))
        .route("/:id/reject", post(reject_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/pickup-token", get(get_pickup_token))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("order"))
}

/// Load an order for the caller, refusing callers who are not party to it.
async fn load_for_party(
    services: &Arc<AppServices>,
    ctx: &RequestContext,
    order_id: OrderId,
) -> Result<Order, axum::response::Response> {
    let order = services::blocking(services, move |svc| svc.get_order(order_id)).await?;
    crate::authz::require_party(ctx, &order)?;
    Ok(order)
}

fn order_ok(order: &Order) -> axum::response::Response {
    (StatusCode::OK, Json(dto::OrderResponse::from(order))).into_response()
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let Some(consumer_id) = ctx.consumer_id() else {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "only consumers may place orders");
    };
    let pickup_slot = match body.pickup_slot() {
        Ok(slot) => slot,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    let cmd = PlaceOrder {
        store_id: body.store_id,
        consumer_id,
        lines: body.lines(),
        currency: body.currency,
        pickup_slot,
    };

    match services::blocking(&services, move |svc| svc.create_order(&ctx, cmd, Utc::now())).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match load_for_party(&services, &ctx, order_id).await {
        Ok(order) => order_ok(&order),
        Err(resp) => resp,
    }
}

pub async fn accept_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order = match load_for_party(&services, &ctx, order_id).await {
        Ok(order) => order,
        Err(resp) => return resp,
    };
    if let Err(resp) = crate::authz::require_store(&ctx, order.store_id()) {
        return resp;
    }

    match services::blocking(&services, move |svc| svc.accept_order(&ctx, order_id, Utc::now())).await {
        Ok(order) => order_ok(&order),
        Err(resp) => resp,
    }
}

pub async fn reject_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order = match load_for_party(&services, &ctx, order_id).await {
        Ok(order) => order,
        Err(resp) => return resp,
    };
    if let Err(resp) = crate::authz::require_store(&ctx, order.store_id()) {
        return resp;
    }

    let reason = body.and_then(|Json(b)| b.reason);
    match services::blocking(&services, move |svc| {
        svc.reject_order(&ctx, order_id, reason, Utc::now())
    })
    .await
    {
        Ok(order) => order_ok(&order),
        Err(resp) => resp,
    }
}

/// Either the consumer or the store may cancel.
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = load_for_party(&services, &ctx, order_id).await {
        return resp;
    }

    let reason = body.and_then(|Json(b)| b.reason);
    match services::blocking(&services, move |svc| {
        svc.cancel_order(&ctx, order_id, reason, Utc::now())
    })
    .await
    {
        Ok(order) => order_ok(&order),
        Err(resp) => resp,
    }
}

pub async fn get_pickup_token(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = load_for_party(&services, &ctx, order_id).await {
        return resp;
    }

    match services::blocking(&services, move |svc| svc.pickup_token_for(order_id)).await {
        Ok(token) => (StatusCode::OK, Json(dto::PickupTokenResponse::from(token))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn store_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let store_id: StoreId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("store"),
    };
    if let Err(resp) = crate::authz::require_store(&ctx, store_id) {
        return resp;
    }
    let status = match query.status() {
        Ok(s) => s,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services::blocking(&services, move |svc| Ok(svc.orders_for_store(store_id, status))).await {
        Ok(orders) => (StatusCode::OK, Json(dto::OrderListResponse::new(&orders))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn store_pending_count(
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

    match services::blocking(&services, move |svc| Ok(svc.count_pending_for_store(store_id))).await {
        Ok(pending) => (
            StatusCode::OK,
            Json(serde_json::json!({ "store_id": store_id, "pending": pending })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn consumer_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let consumer_id: ConsumerId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("consumer"),
    };
    if let Err(resp) = crate::authz::require_consumer(&ctx, consumer_id) {
        return resp;
    }
    let status = match query.status() {
        Ok(s) => s,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services::blocking(&services, move |svc| Ok(svc.orders_for_consumer(consumer_id, status))).await {
        Ok(orders) => (StatusCode::OK, Json(dto::OrderListResponse::new(&orders))).into_response(),
        Err(resp) => resp,
    }
}
