use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use retailerp_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ItemVariantId, LocationId,
    StatusMachine,
};
use retailerp_events::Event;
use retailerp_inventory::{StockEffects, StockMovement, TransactionKind};

/// Default receipt ceiling: a line may receive up to 150% of its request.
pub const DEFAULT_CEILING_PERCENT: u32 = 150;

/// Restock request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestockId(pub AggregateId);

impl RestockId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RestockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestockStatus {
    Draft,
    Approved,
    Ordered,
    Received,
    Cancelled,
}

impl core::fmt::Display for RestockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RestockStatus::Draft => "DRAFT",
            RestockStatus::Approved => "APPROVED",
            RestockStatus::Ordered => "ORDERED",
            RestockStatus::Received => "RECEIVED",
            RestockStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl StatusMachine for RestockStatus {
    const ENTITY: &'static str = "restock";

    fn allowed_next(self) -> &'static [Self] {
        match self {
            RestockStatus::Draft => &[RestockStatus::Approved, RestockStatus::Cancelled],
            RestockStatus::Approved => &[RestockStatus::Ordered, RestockStatus::Cancelled],
            RestockStatus::Ordered => &[RestockStatus::Received, RestockStatus::Cancelled],
            // Receipt is final; stock already credited is never rolled back here.
            RestockStatus::Received => &[],
            RestockStatus::Cancelled => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockLine {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub requested_qty: i64,
    pub received_qty: i64,
    /// Unit cost in minor currency units.
    pub unit_cost: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRestockLine {
    pub item_variant_id: ItemVariantId,
    pub requested_qty: i64,
    pub unit_cost: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub received_qty: i64,
}

/// A received line resolved to its variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptMovement {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
}

/// Aggregate root: RestockRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockRequest {
    id: RestockId,
    request_number: String,
    location_id: Option<LocationId>,
    status: RestockStatus,
    expected_date: Option<NaiveDate>,
    received_date: Option<DateTime<Utc>>,
    memo: Option<String>,
    lines: Vec<RestockLine>,
    version: u64,
    created: bool,
}

impl RestockRequest {
    pub fn empty(id: RestockId) -> Self {
        Self {
            id,
            request_number: String::new(),
            location_id: None,
            status: RestockStatus::Draft,
            expected_date: None,
            received_date: None,
            memo: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RestockId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn request_number(&self) -> &str {
        &self.request_number
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn status(&self) -> RestockStatus {
        self.status
    }

    pub fn expected_date(&self) -> Option<NaiveDate> {
        self.expected_date
    }

    pub fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn lines(&self) -> &[RestockLine] {
        &self.lines
    }
}

impl AggregateRoot for RestockRequest {
    type Id = RestockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRestock {
    pub restock_id: RestockId,
    pub request_number: String,
    pub location_id: LocationId,
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
    pub lines: Vec<NewRestockLine>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRestock {
    pub restock_id: RestockId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRestock {
    pub restock_id: RestockId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Receive goods. `ceiling_percent` caps each line at `requested * pct / 100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRestock {
    pub restock_id: RestockId,
    pub lines: Vec<ReceivedLine>,
    pub ceiling_percent: u32,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Edit metadata only. Never touches quantities or stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRestockMetadata {
    pub restock_id: RestockId,
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRestock {
    pub restock_id: RestockId,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestockCommand {
    CreateRestock(CreateRestock),
    ApproveRestock(ApproveRestock),
    OrderRestock(OrderRestock),
    ReceiveRestock(ReceiveRestock),
    UpdateRestockMetadata(UpdateRestockMetadata),
    CancelRestock(CancelRestock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockCreated {
    pub restock_id: RestockId,
    pub request_number: String,
    pub location_id: LocationId,
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
    pub lines: Vec<RestockLine>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockApproved {
    pub restock_id: RestockId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockOrdered {
    pub restock_id: RestockId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockReceived {
    pub restock_id: RestockId,
    pub location_id: LocationId,
    pub lines: Vec<ReceiptMovement>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockMetadataUpdated {
    pub restock_id: RestockId,
    pub expected_date: Option<NaiveDate>,
    pub memo: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockCancelled {
    pub restock_id: RestockId,
    pub previous_status: RestockStatus,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestockEvent {
    RestockCreated(RestockCreated),
    RestockApproved(RestockApproved),
    RestockOrdered(RestockOrdered),
    RestockReceived(RestockReceived),
    RestockMetadataUpdated(RestockMetadataUpdated),
    RestockCancelled(RestockCancelled),
}

impl Event for RestockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RestockEvent::RestockCreated(_) => "restock.request.created",
            RestockEvent::RestockApproved(_) => "restock.request.approved",
            RestockEvent::RestockOrdered(_) => "restock.request.ordered",
            RestockEvent::RestockReceived(_) => "restock.request.received",
            RestockEvent::RestockMetadataUpdated(_) => "restock.request.metadata_updated",
            RestockEvent::RestockCancelled(_) => "restock.request.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RestockEvent::RestockCreated(e) => e.occurred_at,
            RestockEvent::RestockApproved(e) => e.occurred_at,
            RestockEvent::RestockOrdered(e) => e.occurred_at,
            RestockEvent::RestockReceived(e) => e.occurred_at,
            RestockEvent::RestockMetadataUpdated(e) => e.occurred_at,
            RestockEvent::RestockCancelled(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> ActorId {
        match self {
            RestockEvent::RestockCreated(e) => e.actor,
            RestockEvent::RestockApproved(e) => e.actor,
            RestockEvent::RestockOrdered(e) => e.actor,
            RestockEvent::RestockReceived(e) => e.actor,
            RestockEvent::RestockMetadataUpdated(e) => e.actor,
            RestockEvent::RestockCancelled(e) => e.actor,
        }
    }
}

impl StockEffects for RestockEvent {
    fn stock_movements(&self) -> Vec<StockMovement> {
        match self {
            RestockEvent::RestockReceived(e) => e
                .lines
                .iter()
                .filter(|l| l.quantity != 0)
                .map(|l| {
                    StockMovement::new(
                        e.location_id,
                        l.item_variant_id,
                        l.quantity,
                        TransactionKind::Restock,
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Aggregate for RestockRequest {
    type Command = RestockCommand;
    type Event = RestockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RestockEvent::RestockCreated(e) => {
                self.id = e.restock_id;
                self.request_number = e.request_number.clone();
                self.location_id = Some(e.location_id);
                self.expected_date = e.expected_date;
                self.memo = e.memo.clone();
                self.lines = e.lines.clone();
                self.status = RestockStatus::Draft;
                self.created = true;
            }
            RestockEvent::RestockApproved(_) => {
                self.status = RestockStatus::Approved;
            }
            RestockEvent::RestockOrdered(_) => {
                self.status = RestockStatus::Ordered;
            }
            RestockEvent::RestockReceived(e) => {
                for m in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == m.line_no) {
                        line.received_qty = m.quantity;
                    }
                }
                self.received_date = Some(e.occurred_at);
                self.status = RestockStatus::Received;
            }
            RestockEvent::RestockMetadataUpdated(e) => {
                self.expected_date = e.expected_date;
                self.memo = e.memo.clone();
            }
            RestockEvent::RestockCancelled(_) => {
                self.status = RestockStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RestockCommand::CreateRestock(cmd) => self.handle_create(cmd),
            RestockCommand::ApproveRestock(cmd) => {
                self.ensure_created(cmd.restock_id)?;
                self.status.ensure_transition(RestockStatus::Approved)?;
                Ok(vec![RestockEvent::RestockApproved(RestockApproved {
                    restock_id: cmd.restock_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestockCommand::OrderRestock(cmd) => {
                self.ensure_created(cmd.restock_id)?;
                self.status.ensure_transition(RestockStatus::Ordered)?;
                Ok(vec![RestockEvent::RestockOrdered(RestockOrdered {
                    restock_id: cmd.restock_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestockCommand::ReceiveRestock(cmd) => self.handle_receive(cmd),
            RestockCommand::UpdateRestockMetadata(cmd) => self.handle_update_metadata(cmd),
            RestockCommand::CancelRestock(cmd) => {
                self.ensure_created(cmd.restock_id)?;
                self.status.ensure_transition(RestockStatus::Cancelled)?;
                Ok(vec![RestockEvent::RestockCancelled(RestockCancelled {
                    restock_id: cmd.restock_id,
                    previous_status: self.status,
                    reason: cmd.reason.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl RestockRequest {
    fn ensure_created(&self, restock_id: RestockId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != restock_id {
            return Err(DomainError::invariant("restock_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRestock) -> Result<Vec<RestockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("restock request already exists"));
        }
        if cmd.request_number.trim().is_empty() {
            return Err(DomainError::validation("request_number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "restock request needs at least one line",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, l) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if l.requested_qty <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: requested_qty must be positive"
                )));
            }
            if l.unit_cost < 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_cost cannot be negative"
                )));
            }
            lines.push(RestockLine {
                line_no,
                item_variant_id: l.item_variant_id,
                requested_qty: l.requested_qty,
                received_qty: 0,
                unit_cost: l.unit_cost,
            });
        }

        Ok(vec![RestockEvent::RestockCreated(RestockCreated {
            restock_id: cmd.restock_id,
            request_number: cmd.request_number.trim().to_string(),
            location_id: cmd.location_id,
            expected_date: cmd.expected_date,
            memo: cmd.memo.clone(),
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveRestock) -> Result<Vec<RestockEvent>, DomainError> {
        self.ensure_created(cmd.restock_id)?;
        self.status.ensure_transition(RestockStatus::Received)?;

        let location_id = self
            .location_id
            .ok_or_else(|| DomainError::invariant("restock location must be set"))?;

        let mut by_line: BTreeMap<u32, i64> = BTreeMap::new();
        for r in &cmd.lines {
            if by_line.insert(r.line_no, r.received_qty).is_some() {
                return Err(DomainError::validation(format!(
                    "line {} supplied more than once",
                    r.line_no
                )));
            }
        }

        // Every line is checked before any movement is produced.
        let mut movements = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let received = by_line.remove(&line.line_no).ok_or_else(|| {
                DomainError::validation(format!("missing received_qty for line {}", line.line_no))
            })?;
            if received < 0 {
                return Err(DomainError::quantity_constraint(
                    line.line_no,
                    "received_qty cannot be negative",
                ));
            }
            let ceiling = i128::from(line.requested_qty) * i128::from(cmd.ceiling_percent);
            if i128::from(received) * 100 > ceiling {
                return Err(DomainError::quantity_constraint(
                    line.line_no,
                    format!(
                        "received_qty {received} exceeds {}% of requested_qty {}",
                        cmd.ceiling_percent, line.requested_qty
                    ),
                ));
            }
            movements.push(ReceiptMovement {
                line_no: line.line_no,
                item_variant_id: line.item_variant_id,
                quantity: received,
            });
        }

        if let Some(unknown) = by_line.keys().next() {
            return Err(DomainError::validation(format!("unknown line {unknown}")));
        }

        Ok(vec![RestockEvent::RestockReceived(RestockReceived {
            restock_id: cmd.restock_id,
            location_id,
            lines: movements,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_metadata(
        &self,
        cmd: &UpdateRestockMetadata,
    ) -> Result<Vec<RestockEvent>, DomainError> {
        self.ensure_created(cmd.restock_id)?;
        if self.status == RestockStatus::Cancelled {
            return Err(DomainError::validation(
                "cancelled restock requests cannot be edited",
            ));
        }

        Ok(vec![RestockEvent::RestockMetadataUpdated(
            RestockMetadataUpdated {
                restock_id: cmd.restock_id,
                expected_date: cmd.expected_date,
                memo: cmd.memo.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
