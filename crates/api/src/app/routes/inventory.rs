use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use retailerp_core::{ItemVariantId, LocationId, MaterialId};
use retailerp_infra::command_dispatcher::DispatchError;
use retailerp_infra::reconcile::reconcile;
use retailerp_inventory::StockKey;

use crate::app::routes::common::reply;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/:location_id/:item_variant_id", get(get_record))
        .route("/ledger", get(list_ledger))
        .route("/adjust", post(adjust_stock))
        .route("/reconcile", get(run_reconcile))
        .route("/materials", get(list_materials))
        .route("/materials/:material_id/receive", post(receive_material))
}

fn storage(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Storage(e.to_string())
}

pub async fn list_records(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services
        .run(|wf| wf.inventory().records().map_err(storage))
        .await;
    reply(StatusCode::OK, result, |records| json!({ "items": records }))
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Path((location_id, item_variant_id)): Path<(String, String)>,
) -> axum::response::Response {
    let location: LocationId = match errors::parse_id(&location_id, "location id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let variant: ItemVariantId = match errors::parse_id(&item_variant_id, "item variant id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let key = StockKey::new(location, variant);
    let result = services
        .run(move |wf| wf.inventory().quantity(&key).map_err(storage))
        .await;
    // Keys never written read as zero.
    reply(StatusCode::OK, result, |quantity| {
        json!({
            "location_id": location,
            "item_variant_id": variant,
            "quantity": quantity,
        })
    })
}

pub async fn list_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LedgerQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let result = services
        .run(move |wf| wf.inventory().ledger(&filter).map_err(storage))
        .await;
    reply(StatusCode::OK, result, |entries| json!({ "items": entries }))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let actor_id = actor.actor_id();
    let result = services
        .run(move |wf| {
            wf.adjust_stock(body.location_id, body.item_variant_id, body.delta, actor_id, body.memo)
        })
        .await;
    reply(StatusCode::OK, result, |quantity| json!({ "quantity": quantity }))
}

pub async fn run_reconcile(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services
        .run(|wf| reconcile(wf.inventory()).map_err(storage))
        .await;
    match result {
        Ok(report) => {
            let status = if report.is_consistent() {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            (status, Json(report)).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_materials(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services
        .run(|wf| wf.materials().stocks().map_err(storage))
        .await;
    reply(StatusCode::OK, result, |stocks| json!({ "items": stocks }))
}

pub async fn receive_material(
    Extension(services): Extension<Arc<AppServices>>,
    Path(material_id): Path<String>,
    Json(body): Json<dto::ReceiveMaterialRequest>,
) -> axum::response::Response {
    let material: MaterialId = match errors::parse_id(&material_id, "material id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .run(move |wf| wf.receive_material(material, body.quantity))
        .await;
    reply(StatusCode::OK, result, |quantity| {
        json!({ "material_id": material, "quantity": quantity })
    })
}
