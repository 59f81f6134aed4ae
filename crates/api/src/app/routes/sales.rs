use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;

use retailerp_core::AggregateId;
use retailerp_sales::{DeleteSale, EditSaleQuantity, RecordSale, SaleId};

use crate::app::routes::common::{reply, reply_list};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_sale).get(list_sales))
        .route("/:id", get(get_sale).patch(edit_sale).delete(delete_sale))
}

fn sale_id(raw: &str, what: &'static str) -> Result<SaleId, axum::response::Response> {
    errors::parse_id::<AggregateId>(raw, what).map(SaleId::new)
}

/// Sales debit and returns credit the location immediately.
pub async fn record_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::RecordSaleRequest>,
) -> axum::response::Response {
    let original_sale = match body.original_sale.as_deref().map(|raw| sale_id(raw, "original sale id")) {
        Some(Ok(id)) => Some(id),
        Some(Err(resp)) => return resp,
        None => None,
    };
    let cmd = RecordSale {
        sale_id: SaleId::new(AggregateId::new()),
        kind: body.kind,
        location_id: body.location_id,
        item_variant_id: body.item_variant_id,
        quantity: body.quantity,
        original_sale,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.record_sale(cmd)).await;
    reply(StatusCode::CREATED, result, dto::sale_to_json)
}

pub async fn list_sales(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services.run(|wf| wf.sales()).await;
    reply_list(result, dto::sale_to_json)
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let sale_id = match sale_id(&id, "sale id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.run(move |wf| wf.sale(sale_id)).await;
    reply(StatusCode::OK, result, dto::sale_to_json)
}

pub async fn edit_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::EditSaleRequest>,
) -> axum::response::Response {
    let sale_id = match sale_id(&id, "sale id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = EditSaleQuantity {
        sale_id,
        new_quantity: body.quantity,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.edit_sale(cmd)).await;
    reply(StatusCode::OK, result, dto::sale_to_json)
}

/// Reverses the stock effect. Refused while returns are linked.
pub async fn delete_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let sale_id = match sale_id(&id, "sale id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = DeleteSale {
        sale_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.delete_sale(cmd)).await;
    reply(StatusCode::OK, result, dto::sale_to_json)
}
