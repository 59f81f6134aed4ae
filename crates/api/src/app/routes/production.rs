use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;

use retailerp_core::AggregateId;
use retailerp_production::{
    BindVariant, CancelPlan, ConfirmPlan, CreatePlan, PlanId, RecordMaterialUsage, RecordOutput,
    StartProduction,
};

use crate::app::routes::common::{reply, reply_list};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/plans", post(create_plan).get(list_plans))
        .route("/plans/:id", get(get_plan))
        .route("/plans/:id/confirm", post(confirm_plan))
        .route("/plans/:id/start", post(start_production))
        .route("/plans/:id/output", post(record_output))
        .route("/plans/:id/materials", post(record_material_usage))
        .route("/plans/:id/bind", post(bind_variant))
        .route("/plans/:id/complete", post(complete_plan))
        .route("/plans/:id/cancel", post(cancel_plan))
}

fn plan_id(raw: &str) -> Result<PlanId, axum::response::Response> {
    errors::parse_id::<AggregateId>(raw, "plan id").map(PlanId::new)
}

pub async fn create_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreatePlanRequest>,
) -> axum::response::Response {
    let cmd = CreatePlan {
        plan_id: PlanId::new(AggregateId::new()),
        plan_number: body.plan_number,
        season: body.season,
        start_date: body.start_date,
        end_date: body.end_date,
        lines: body.lines,
        materials: body.materials,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.create_plan(cmd)).await;
    reply(StatusCode::CREATED, result, dto::plan_to_json)
}

pub async fn list_plans(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services.run(|wf| wf.plans()).await;
    reply_list(result, dto::plan_to_json)
}

pub async fn get_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.run(move |wf| wf.plan(plan_id)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn confirm_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = ConfirmPlan {
        plan_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.confirm_plan(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn start_production(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = StartProduction {
        plan_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.start_production(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn record_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordOutputRequest>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = RecordOutput {
        plan_id,
        line_no: body.line_no,
        produced_qty: body.produced_qty,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.record_output(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn record_material_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordMaterialUsageRequest>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = RecordMaterialUsage {
        plan_id,
        material_id: body.material_id,
        used_qty: body.used_qty,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.record_material_usage(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

/// Attach a SKU to a line planned by category only.
pub async fn bind_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::BindVariantRequest>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = BindVariant {
        plan_id,
        line_no: body.line_no,
        item_variant_id: body.item_variant_id,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.bind_variant(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn complete_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor_id = actor.actor_id();
    let result = services.run(move |wf| wf.complete_plan(plan_id, actor_id)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}

pub async fn cancel_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelRequest>>,
) -> axum::response::Response {
    let plan_id = match plan_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd = CancelPlan {
        plan_id,
        reason: body.reason,
        actor: actor.actor_id(),
        occurred_at: Utc::now(),
    };
    let result = services.run(move |wf| wf.cancel_plan(cmd)).await;
    reply(StatusCode::OK, result, dto::plan_to_json)
}
