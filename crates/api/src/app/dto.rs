use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use retailerp_core::{ItemVariantId, LocationId, MaterialId};
use retailerp_infra::inventory_store::LedgerFilter;
use retailerp_production::{NewMaterialUsage, NewProductionLine, ProductionPlan};
use retailerp_restock::{NewRestockLine, ReceivedLine, RestockRequest};
use retailerp_sales::{Sale, SaleKind};
use retailerp_shipping::{LineQuantity, NewShipmentLine, ShipmentKind, ShipmentRequest};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub delta: i64,
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveMaterialRequest {
    pub quantity: i64,
}

/// Query string of `GET /inventory/ledger`. Everything optional.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub location_id: Option<String>,
    pub item_variant_id: Option<String>,
    pub reference_id: Option<String>,
    pub kind: Option<String>,
    pub after_sequence: Option<u64>,
    pub limit: Option<usize>,
}

impl LedgerQuery {
    pub fn into_filter(self) -> Result<LedgerFilter, axum::response::Response> {
        Ok(LedgerFilter {
            location_id: optional(self.location_id, "location id")?,
            item_variant_id: optional(self.item_variant_id, "item variant id")?,
            reference_id: optional(self.reference_id, "reference id")?,
            kind: optional(self.kind, "transaction kind")?,
            after_sequence: self.after_sequence,
            limit: self.limit,
        })
    }
}

fn optional<T: core::str::FromStr>(
    raw: Option<String>,
    what: &'static str,
) -> Result<Option<T>, axum::response::Response> {
    raw.filter(|v| !v.trim().is_empty())
        .map(|v| errors::parse_id(&v, what))
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub request_number: String,
    pub kind: ShipmentKind,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub lines: Vec<NewShipmentLine>,
}

#[derive(Debug, Deserialize)]
pub struct LineQuantitiesRequest {
    pub lines: Vec<LineQuantity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRestockRequest {
    pub request_number: String,
    pub location_id: LocationId,
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
    pub lines: Vec<NewRestockLine>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveRestockRequest {
    pub lines: Vec<ReceivedLine>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRestockRequest {
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub plan_number: String,
    pub season: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lines: Vec<NewProductionLine>,
    #[serde(default)]
    pub materials: Vec<NewMaterialUsage>,
}

#[derive(Debug, Deserialize)]
pub struct RecordOutputRequest {
    pub line_no: u32,
    pub produced_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordMaterialUsageRequest {
    pub material_id: MaterialId,
    pub used_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct BindVariantRequest {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub kind: SaleKind,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
    /// Returns only: the sale being returned against.
    pub original_sale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditSaleRequest {
    pub quantity: i64,
}

// -------------------------
// Response mapping
// -------------------------

pub fn shipment_to_json(s: &ShipmentRequest) -> JsonValue {
    json!({
        "id": s.id_typed().to_string(),
        "request_number": s.request_number(),
        "kind": s.kind(),
        "status": s.status(),
        "from_location": s.from_location(),
        "to_location": s.to_location(),
        "created_by": s.created_by(),
        "created_at": s.created_at(),
        "shipped_at": s.shipped_at(),
        "received_at": s.received_at(),
        "cancelled_at": s.cancelled_at(),
        "lines": s.lines(),
    })
}

pub fn restock_to_json(r: &RestockRequest) -> JsonValue {
    json!({
        "id": r.id_typed().to_string(),
        "request_number": r.request_number(),
        "location_id": r.location_id(),
        "status": r.status(),
        "expected_date": r.expected_date(),
        "received_date": r.received_date(),
        "memo": r.memo(),
        "lines": r.lines(),
    })
}

pub fn plan_to_json(p: &ProductionPlan) -> JsonValue {
    json!({
        "id": p.id_typed().to_string(),
        "plan_number": p.plan_number(),
        "season": p.season(),
        "start_date": p.start_date(),
        "end_date": p.end_date(),
        "status": p.status(),
        "lines": p.lines(),
        "materials": p.materials(),
        "completed_at": p.completed_at(),
    })
}

pub fn sale_to_json(s: &Sale) -> JsonValue {
    json!({
        "id": s.id_typed().to_string(),
        "kind": s.kind(),
        "location_id": s.location_id(),
        "item_variant_id": s.item_variant_id(),
        "quantity": s.quantity(),
        "original_sale": s.original_sale().map(|id| id.to_string()),
        "linked_returns": s.linked_returns().iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "deleted": s.is_deleted(),
        "recorded_at": s.recorded_at(),
    })
}
