use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;

use retailerp_core::AggregateId;
use retailerp_restock::{
    ApproveRestock, CancelRestock, CreateRestock, OrderRestock, RestockId, UpdateRestockMetadata,
};

use crate::app::routes::common::{reply, reply_list};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_restock).get(list_restocks))
        .route("/:id", get(get_restock).patch(update_restock))
        .route("/:id/approve", post(approve_restock))
        .route("/:id/order", post(order_restock))
        .route("/:id/receive", post(receive_restock))
        .route("/:id/cancel", post(cancel_restock))
}

fn restock_id(raw: &str) -> Result<RestockId, axum::response::Response> {
    errors::parse_id::<AggregateId>(raw, "restock id").map(RestockId::new)
}

pub async fn create_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateRestockRequest>,
) -> axum::response::Response {
    let cmd = CreateRestock {
        restock_id: RestockId::new(AggregateId::new()),
        request_number: body.request_number,
        location_id: body.location_id,
        expected_date: body.expected_date,
        memo: body.memo,
        lines: body.lines,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.create_restock(cmd)).await;
    reply(StatusCode::CREATED, result, dto::restock_to_json)
}

pub async fn list_restocks(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services.run(|wf| wf.restocks()).await;
    reply_list(result, dto::restock_to_json)
}

pub async fn get_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.run(move |wf| wf.restock(restock_id)).await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}

/// Expected date and memo only. Never moves stock, in any status.
pub async fn update_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateRestockRequest>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = UpdateRestockMetadata {
        restock_id,
        expected_date: body.expected_date,
        memo: body.memo,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.update_restock_metadata(cmd)).await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}

pub async fn approve_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = ApproveRestock {
        restock_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.approve_restock(cmd)).await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}

pub async fn order_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = OrderRestock {
        restock_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.order_restock(cmd)).await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}

pub async fn receive_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveRestockRequest>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor_id = actor.actor_id();
    let result = services
        .run(move |wf| wf.receive_restock(restock_id, body.lines, actor_id))
        .await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}

pub async fn cancel_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelRequest>>,
) -> axum::response::Response {
    let restock_id = match restock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd = CancelRestock {
        restock_id,
        reason: body.reason,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.cancel_restock(cmd)).await;
    reply(StatusCode::OK, result, dto::restock_to_json)
}
