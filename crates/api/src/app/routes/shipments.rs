use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;

use retailerp_core::AggregateId;
use retailerp_shipping::{
    CancelShipment, ConfirmReceived, ConfirmShipped, CreateShipment, ShipmentId,
};

use crate::app::routes::common::{reply, reply_list};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_shipment).get(list_shipments))
        .route("/:id", get(get_shipment))
        .route("/:id/ship", post(confirm_shipped))
        .route("/:id/receive", post(confirm_received))
        .route("/:id/cancel", post(cancel_shipment))
}

fn shipment_id(raw: &str) -> Result<ShipmentId, axum::response::Response> {
    errors::parse_id::<AggregateId>(raw, "shipment id").map(ShipmentId::new)
}

pub async fn create_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateShipmentRequest>,
) -> axum::response::Response {
    let cmd = CreateShipment {
        shipment_id: ShipmentId::new(AggregateId::new()),
        request_number: body.request_number,
        kind: body.kind,
        from_location: body.from_location,
        to_location: body.to_location,
        lines: body.lines,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.create_shipment(cmd)).await;
    reply(StatusCode::CREATED, result, dto::shipment_to_json)
}

pub async fn list_shipments(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services.run(|wf| wf.shipments()).await;
    reply_list(result, dto::shipment_to_json)
}

pub async fn get_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let shipment_id = match shipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.run(move |wf| wf.shipment(shipment_id)).await;
    reply(StatusCode::OK, result, dto::shipment_to_json)
}

/// Origin debit. The body must name every line exactly once.
pub async fn confirm_shipped(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineQuantitiesRequest>,
) -> axum::response::Response {
    let shipment_id = match shipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = ConfirmShipped {
        shipment_id,
        lines: body.lines,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.confirm_shipped(cmd)).await;
    reply(StatusCode::OK, result, dto::shipment_to_json)
}

pub async fn confirm_received(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineQuantitiesRequest>,
) -> axum::response::Response {
    let shipment_id = match shipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = ConfirmReceived {
        shipment_id,
        lines: body.lines,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.confirm_received(cmd)).await;
    reply(StatusCode::OK, result, dto::shipment_to_json)
}

pub async fn cancel_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelRequest>>,
) -> axum::response::Response {
    let shipment_id = match shipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd = CancelShipment {
        shipment_id,
        reason: body.reason,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.cancel_shipment(cmd)).await;
    reply(StatusCode::OK, result, dto::shipment_to_json)
}
