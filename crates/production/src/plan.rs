use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use retailerp_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ItemVariantId, LocationId,
    MaterialId, StatusMachine,
};
use retailerp_events::Event;
use retailerp_inventory::{MaterialConsumption, StockEffects, StockMovement, TransactionKind};

/// Production plan identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub AggregateId);

impl PlanId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PlanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Draft,
    Confirmed,
    InProduction,
    Completed,
    Cancelled,
}

impl core::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::Confirmed => "CONFIRMED",
            PlanStatus::InProduction => "IN_PRODUCTION",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl StatusMachine for PlanStatus {
    const ENTITY: &'static str = "production plan";

    fn allowed_next(self) -> &'static [Self] {
        match self {
            PlanStatus::Draft => &[PlanStatus::Confirmed, PlanStatus::Cancelled],
            PlanStatus::Confirmed => &[PlanStatus::InProduction, PlanStatus::Cancelled],
            PlanStatus::InProduction => &[PlanStatus::Completed],
            PlanStatus::Completed | PlanStatus::Cancelled => &[],
        }
    }
}

/// A planned output. `item_variant_id` may be bound late; lines without one
/// are descriptive only and never credit stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub line_no: u32,
    pub category: String,
    pub item_variant_id: Option<ItemVariantId>,
    pub planned_qty: i64,
    pub produced_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductionLine {
    pub category: String,
    pub item_variant_id: Option<ItemVariantId>,
    pub planned_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub material_id: MaterialId,
    pub required_qty: i64,
    pub used_qty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterialUsage {
    pub material_id: MaterialId,
    pub required_qty: i64,
}

/// Finished goods credited on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMovement {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
}

/// Aggregate root: ProductionPlan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionPlan {
    id: PlanId,
    plan_number: String,
    season: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    status: PlanStatus,
    lines: Vec<ProductionLine>,
    materials: Vec<MaterialUsage>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ProductionPlan {
    pub fn empty(id: PlanId) -> Self {
        Self {
            id,
            plan_number: String::new(),
            season: None,
            start_date: None,
            end_date: None,
            status: PlanStatus::Draft,
            lines: Vec::new(),
            materials: Vec::new(),
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PlanId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn plan_number(&self) -> &str {
        &self.plan_number
    }

    pub fn season(&self) -> Option<&str> {
        self.season.as_deref()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn lines(&self) -> &[ProductionLine] {
        &self.lines
    }

    pub fn materials(&self) -> &[MaterialUsage] {
        &self.materials
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

impl AggregateRoot for ProductionPlan {
    type Id = PlanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlan {
    pub plan_id: PlanId,
    pub plan_number: String,
    pub season: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lines: Vec<NewProductionLine>,
    pub materials: Vec<NewMaterialUsage>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPlan {
    pub plan_id: PlanId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProduction {
    pub plan_id: PlanId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutput {
    pub plan_id: PlanId,
    pub line_no: u32,
    pub produced_qty: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMaterialUsage {
    pub plan_id: PlanId,
    pub material_id: MaterialId,
    pub used_qty: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindVariant {
    pub plan_id: PlanId,
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletePlan {
    pub plan_id: PlanId,
    pub finished_goods_location: LocationId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPlan {
    pub plan_id: PlanId,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanCommand {
    CreatePlan(CreatePlan),
    ConfirmPlan(ConfirmPlan),
    StartProduction(StartProduction),
    RecordOutput(RecordOutput),
    RecordMaterialUsage(RecordMaterialUsage),
    BindVariant(BindVariant),
    CompletePlan(CompletePlan),
    CancelPlan(CancelPlan),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCreated {
    pub plan_id: PlanId,
    pub plan_number: String,
    pub season: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lines: Vec<ProductionLine>,
    pub materials: Vec<MaterialUsage>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfirmed {
    pub plan_id: PlanId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStarted {
    pub plan_id: PlanId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecorded {
    pub plan_id: PlanId,
    pub line_no: u32,
    pub produced_qty: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsageRecorded {
    pub plan_id: PlanId,
    pub material_id: MaterialId,
    pub used_qty: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantBound {
    pub plan_id: PlanId,
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Completion, with the skip rule already applied: only materials with
/// `used_qty > 0` and lines with a variant and `produced_qty > 0` appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCompleted {
    pub plan_id: PlanId,
    pub finished_goods_location: LocationId,
    pub consumption: Vec<MaterialConsumption>,
    pub outputs: Vec<OutputMovement>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCancelled {
    pub plan_id: PlanId,
    pub previous_status: PlanStatus,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanEvent {
    PlanCreated(PlanCreated),
    PlanConfirmed(PlanConfirmed),
    ProductionStarted(ProductionStarted),
    OutputRecorded(OutputRecorded),
    MaterialUsageRecorded(MaterialUsageRecorded),
    VariantBound(VariantBound),
    PlanCompleted(PlanCompleted),
    PlanCancelled(PlanCancelled),
}

impl Event for PlanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PlanEvent::PlanCreated(_) => "production.plan.created",
            PlanEvent::PlanConfirmed(_) => "production.plan.confirmed",
            PlanEvent::ProductionStarted(_) => "production.plan.started",
            PlanEvent::OutputRecorded(_) => "production.plan.output_recorded",
            PlanEvent::MaterialUsageRecorded(_) => "production.plan.material_usage_recorded",
            PlanEvent::VariantBound(_) => "production.plan.variant_bound",
            PlanEvent::PlanCompleted(_) => "production.plan.completed",
            PlanEvent::PlanCancelled(_) => "production.plan.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PlanEvent::PlanCreated(e) => e.occurred_at,
            PlanEvent::PlanConfirmed(e) => e.occurred_at,
            PlanEvent::ProductionStarted(e) => e.occurred_at,
            PlanEvent::OutputRecorded(e) => e.occurred_at,
            PlanEvent::MaterialUsageRecorded(e) => e.occurred_at,
            PlanEvent::VariantBound(e) => e.occurred_at,
            PlanEvent::PlanCompleted(e) => e.occurred_at,
            PlanEvent::PlanCancelled(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> ActorId {
        match self {
            PlanEvent::PlanCreated(e) => e.actor,
            PlanEvent::PlanConfirmed(e) => e.actor,
            PlanEvent::ProductionStarted(e) => e.actor,
            PlanEvent::OutputRecorded(e) => e.actor,
            PlanEvent::MaterialUsageRecorded(e) => e.actor,
            PlanEvent::VariantBound(e) => e.actor,
            PlanEvent::PlanCompleted(e) => e.actor,
            PlanEvent::PlanCancelled(e) => e.actor,
        }
    }
}

impl StockEffects for PlanEvent {
    fn stock_movements(&self) -> Vec<StockMovement> {
        match self {
            PlanEvent::PlanCompleted(e) => e
                .outputs
                .iter()
                .map(|o| {
                    StockMovement::new(
                        e.finished_goods_location,
                        o.item_variant_id,
                        o.quantity,
                        TransactionKind::Production,
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn material_consumption(&self) -> Vec<MaterialConsumption> {
        match self {
            PlanEvent::PlanCompleted(e) => e.consumption.clone(),
            _ => Vec::new(),
        }
    }
}

impl Aggregate for ProductionPlan {
    type Command = PlanCommand;
    type Event = PlanEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PlanEvent::PlanCreated(e) => {
                self.id = e.plan_id;
                self.plan_number = e.plan_number.clone();
                self.season = e.season.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.lines = e.lines.clone();
                self.materials = e.materials.clone();
                self.status = PlanStatus::Draft;
                self.created = true;
            }
            PlanEvent::PlanConfirmed(_) => self.status = PlanStatus::Confirmed,
            PlanEvent::ProductionStarted(_) => self.status = PlanStatus::InProduction,
            PlanEvent::OutputRecorded(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.produced_qty = e.produced_qty;
                }
            }
            PlanEvent::MaterialUsageRecorded(e) => {
                if let Some(m) = self
                    .materials
                    .iter_mut()
                    .find(|m| m.material_id == e.material_id)
                {
                    m.used_qty = e.used_qty;
                }
            }
            PlanEvent::VariantBound(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.item_variant_id = Some(e.item_variant_id);
                }
            }
            PlanEvent::PlanCompleted(e) => {
                self.status = PlanStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            PlanEvent::PlanCancelled(_) => self.status = PlanStatus::Cancelled,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PlanCommand::CreatePlan(cmd) => self.handle_create(cmd),
            PlanCommand::ConfirmPlan(cmd) => {
                self.ensure_created(cmd.plan_id)?;
                self.status.ensure_transition(PlanStatus::Confirmed)?;
                Ok(vec![PlanEvent::PlanConfirmed(PlanConfirmed {
                    plan_id: cmd.plan_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PlanCommand::StartProduction(cmd) => {
                self.ensure_created(cmd.plan_id)?;
                self.status.ensure_transition(PlanStatus::InProduction)?;
                Ok(vec![PlanEvent::ProductionStarted(ProductionStarted {
                    plan_id: cmd.plan_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PlanCommand::RecordOutput(cmd) => {
                self.ensure_open(cmd.plan_id)?;
                self.ensure_line(cmd.line_no)?;
                if cmd.produced_qty < 0 {
                    return Err(DomainError::validation(format!(
                        "line {}: produced_qty cannot be negative",
                        cmd.line_no
                    )));
                }
                Ok(vec![PlanEvent::OutputRecorded(OutputRecorded {
                    plan_id: cmd.plan_id,
                    line_no: cmd.line_no,
                    produced_qty: cmd.produced_qty,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PlanCommand::RecordMaterialUsage(cmd) => {
                self.ensure_open(cmd.plan_id)?;
                if !self.materials.iter().any(|m| m.material_id == cmd.material_id) {
                    return Err(DomainError::validation(format!(
                        "material {} is not part of this plan",
                        cmd.material_id
                    )));
                }
                if cmd.used_qty < 0 {
                    return Err(DomainError::validation("used_qty cannot be negative"));
                }
                Ok(vec![PlanEvent::MaterialUsageRecorded(MaterialUsageRecorded {
                    plan_id: cmd.plan_id,
                    material_id: cmd.material_id,
                    used_qty: cmd.used_qty,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PlanCommand::BindVariant(cmd) => {
                self.ensure_open(cmd.plan_id)?;
                self.ensure_line(cmd.line_no)?;
                Ok(vec![PlanEvent::VariantBound(VariantBound {
                    plan_id: cmd.plan_id,
                    line_no: cmd.line_no,
                    item_variant_id: cmd.item_variant_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PlanCommand::CompletePlan(cmd) => self.handle_complete(cmd),
            PlanCommand::CancelPlan(cmd) => {
                self.ensure_created(cmd.plan_id)?;
                self.status.ensure_transition(PlanStatus::Cancelled)?;
                Ok(vec![PlanEvent::PlanCancelled(PlanCancelled {
                    plan_id: cmd.plan_id,
                    previous_status: self.status,
                    reason: cmd.reason.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl ProductionPlan {
    fn ensure_created(&self, plan_id: PlanId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != plan_id {
            return Err(DomainError::invariant("plan_id mismatch"));
        }
        Ok(())
    }

    /// Progress can be recorded until the plan reaches a terminal status.
    fn ensure_open(&self, plan_id: PlanId) -> Result<(), DomainError> {
        self.ensure_created(plan_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "plan is {} and no longer accepts progress",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_line(&self, line_no: u32) -> Result<(), DomainError> {
        if self.lines.iter().any(|l| l.line_no == line_no) {
            Ok(())
        } else {
            Err(DomainError::validation(format!("unknown line {line_no}")))
        }
    }

    fn handle_create(&self, cmd: &CreatePlan) -> Result<Vec<PlanEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("production plan already exists"));
        }
        if cmd.plan_number.trim().is_empty() {
            return Err(DomainError::validation("plan_number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("plan needs at least one line"));
        }
        if let (Some(start), Some(end)) = (cmd.start_date, cmd.end_date) {
            if end < start {
                return Err(DomainError::validation("end_date precedes start_date"));
            }
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, l) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if l.planned_qty <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: planned_qty must be positive"
                )));
            }
            lines.push(ProductionLine {
                line_no,
                category: l.category.trim().to_string(),
                item_variant_id: l.item_variant_id,
                planned_qty: l.planned_qty,
                produced_qty: 0,
            });
        }

        let mut materials: Vec<MaterialUsage> = Vec::with_capacity(cmd.materials.len());
        for m in &cmd.materials {
            if m.required_qty < 0 {
                return Err(DomainError::validation(format!(
                    "material {}: required_qty cannot be negative",
                    m.material_id
                )));
            }
            if materials.iter().any(|x| x.material_id == m.material_id) {
                return Err(DomainError::validation(format!(
                    "material {} listed more than once",
                    m.material_id
                )));
            }
            materials.push(MaterialUsage {
                material_id: m.material_id,
                required_qty: m.required_qty,
                used_qty: 0,
            });
        }

        Ok(vec![PlanEvent::PlanCreated(PlanCreated {
            plan_id: cmd.plan_id,
            plan_number: cmd.plan_number.trim().to_string(),
            season: cmd.season.clone(),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            lines,
            materials,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompletePlan) -> Result<Vec<PlanEvent>, DomainError> {
        self.ensure_created(cmd.plan_id)?;
        self.status.ensure_transition(PlanStatus::Completed)?;

        let consumption = self
            .materials
            .iter()
            .filter(|m| m.used_qty > 0)
            .map(|m| MaterialConsumption {
                material_id: m.material_id,
                quantity: m.used_qty,
            })
            .collect();

        let outputs = self
            .lines
            .iter()
            .filter(|l| l.produced_qty > 0)
            .filter_map(|l| {
                l.item_variant_id.map(|variant| OutputMovement {
                    line_no: l.line_no,
                    item_variant_id: variant,
                    quantity: l.produced_qty,
                })
            })
            .collect();

        Ok(vec![PlanEvent::PlanCompleted(PlanCompleted {
            plan_id: cmd.plan_id,
            finished_goods_location: cmd.finished_goods_location,
            consumption,
            outputs,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use retailerp_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    struct Fixture {
        plan: ProductionPlan,
        id: PlanId,
        variant: ItemVariantId,
        cotton: MaterialId,
        thread: MaterialId,
        actor: ActorId,
    }

    impl Fixture {
        fn run(&mut self, cmd: PlanCommand) -> Result<Vec<PlanEvent>, DomainError> {
            execute(&mut self.plan, &cmd)
        }
    }

    fn draft() -> Fixture {
        let id = PlanId::new(AggregateId::new());
        let mut fx = Fixture {
            plan: ProductionPlan::empty(id),
            id,
            variant: ItemVariantId::new(),
            cotton: MaterialId::new(),
            thread: MaterialId::new(),
            actor: ActorId::new(),
        };
        let cmd = PlanCommand::CreatePlan(CreatePlan {
            plan_id: id,
            plan_number: "PP-2026-07".to_string(),
            season: Some("FW26".to_string()),
            start_date: NaiveDate::from_ymd_opt(2026, 7, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 15),
            lines: vec![
                NewProductionLine {
                    category: "tops".to_string(),
                    item_variant_id: Some(fx.variant),
                    planned_qty: 100,
                },
                NewProductionLine {
                    category: "bottoms".to_string(),
                    item_variant_id: None,
                    planned_qty: 50,
                },
            ],
            materials: vec![
                NewMaterialUsage {
                    material_id: fx.cotton,
                    required_qty: 40,
                },
                NewMaterialUsage {
                    material_id: fx.thread,
                    required_qty: 5,
                },
            ],
            actor: fx.actor,
            occurred_at: test_time(),
        });
        execute(&mut fx.plan, &cmd).unwrap();
        fx
    }

    fn in_production() -> Fixture {
        let mut fx = draft();
        for cmd in [
            PlanCommand::ConfirmPlan(ConfirmPlan {
                plan_id: fx.id,
                actor: fx.actor,
                occurred_at: test_time(),
            }),
            PlanCommand::StartProduction(StartProduction {
                plan_id: fx.id,
                actor: fx.actor,
                occurred_at: test_time(),
            }),
        ] {
            let events = execute(&mut fx.plan, &cmd).unwrap();
            assert!(events[0].stock_movements().is_empty());
        }
        fx
    }

    fn output(fx: &Fixture, line_no: u32, qty: i64) -> PlanCommand {
        PlanCommand::RecordOutput(RecordOutput {
            plan_id: fx.id,
            line_no,
            produced_qty: qty,
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    fn usage(fx: &Fixture, material_id: MaterialId, qty: i64) -> PlanCommand {
        PlanCommand::RecordMaterialUsage(RecordMaterialUsage {
            plan_id: fx.id,
            material_id,
            used_qty: qty,
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    fn complete(fx: &Fixture, location: LocationId) -> PlanCommand {
        PlanCommand::CompletePlan(CompletePlan {
            plan_id: fx.id,
            finished_goods_location: location,
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn completion_applies_skip_rule() {
        let mut fx = in_production();
        fx.run(output(&fx, 1, 95)).unwrap();
        fx.run(output(&fx, 2, 48)).unwrap();
        fx.run(usage(&fx, fx.cotton, 38)).unwrap();

        let warehouse = LocationId::new();
        let events = fx.run(complete(&fx, warehouse)).unwrap();

        assert_eq!(
            events[0].stock_movements(),
            vec![StockMovement::new(
                warehouse,
                fx.variant,
                95,
                TransactionKind::Production
            )]
        );
        // Thread has used_qty 0 and is skipped.
        assert_eq!(
            events[0].material_consumption(),
            vec![MaterialConsumption {
                material_id: fx.cotton,
                quantity: 38
            }]
        );
        assert_eq!(fx.plan.status(), PlanStatus::Completed);
        assert!(fx.plan.completed_at().is_some());
    }

    #[test]
    fn binding_a_variant_makes_the_line_creditable() {
        let mut fx = in_production();
        let late = ItemVariantId::new();
        execute(
            &mut fx.plan,
            &PlanCommand::BindVariant(BindVariant {
                plan_id: fx.id,
                line_no: 2,
                item_variant_id: late,
                actor: fx.actor,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        fx.run(output(&fx, 2, 10)).unwrap();

        let events = fx.run(complete(&fx, LocationId::new())).unwrap();
        let movements = events[0].stock_movements();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].item_variant_id, late);
    }

    #[test]
    fn cannot_complete_from_confirmed() {
        let mut fx = draft();
        execute(
            &mut fx.plan,
            &PlanCommand::ConfirmPlan(ConfirmPlan {
                plan_id: fx.id,
                actor: fx.actor,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = fx.plan.handle(&complete(&fx, LocationId::new())).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                entity: "production plan",
                from: "CONFIRMED".to_string(),
                to: "COMPLETED".to_string(),
            }
        );
    }

    #[test]
    fn in_production_cannot_be_cancelled() {
        let fx = in_production();
        let err = fx
            .plan
            .handle(&PlanCommand::CancelPlan(CancelPlan {
                plan_id: fx.id,
                reason: None,
                actor: fx.actor,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn completing_twice_is_rejected() {
        let mut fx = in_production();
        fx.run(output(&fx, 1, 5)).unwrap();
        fx.run(complete(&fx, LocationId::new())).unwrap();
        assert!(fx.plan.handle(&complete(&fx, LocationId::new())).is_err());
    }

    #[test]
    fn progress_is_rejected_after_completion() {
        let mut fx = in_production();
        fx.run(complete(&fx, LocationId::new())).unwrap();
        assert!(matches!(
            fx.plan.handle(&output(&fx, 1, 3)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn progress_validation() {
        let fx = draft();
        assert!(matches!(
            fx.plan.handle(&output(&fx, 9, 3)),
            Err(DomainError::Validation(msg)) if msg == "unknown line 9"
        ));
        assert!(fx.plan.handle(&output(&fx, 1, -1)).is_err());
        assert!(fx.plan.handle(&usage(&fx, MaterialId::new(), 3)).is_err());
        assert!(fx.plan.handle(&usage(&fx, fx.thread, 3)).is_ok());
    }

    #[test]
    fn create_rejects_inverted_dates() {
        let id = PlanId::new(AggregateId::new());
        let err = ProductionPlan::empty(id)
            .handle(&PlanCommand::CreatePlan(CreatePlan {
                plan_id: id,
                plan_number: "PP-1".to_string(),
                season: None,
                start_date: NaiveDate::from_ymd_opt(2026, 9, 1),
                end_date: NaiveDate::from_ymd_opt(2026, 8, 1),
                lines: vec![NewProductionLine {
                    category: "tops".to_string(),
                    item_variant_id: None,
                    planned_qty: 1,
                }],
                materials: Vec::new(),
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn nothing_produced_completes_with_no_effects() {
        let mut fx = in_production();
        let events = fx.run(complete(&fx, LocationId::new())).unwrap();
        assert!(events[0].stock_movements().is_empty());
        assert!(events[0].material_consumption().is_empty());
    }
}
