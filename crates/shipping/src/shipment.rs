use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailerp_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ItemVariantId, LocationId,
    StatusMachine,
};
use retailerp_events::Event;
use retailerp_inventory::{StockEffects, StockMovement, TransactionKind};

/// Shipment request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub AggregateId);

impl ShipmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a shipment moves stock for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentKind {
    Outbound,
    Return,
    Transfer,
}

impl ShipmentKind {
    /// Ledger kind used when goods arrive at the destination.
    pub fn receipt_kind(&self) -> TransactionKind {
        match self {
            ShipmentKind::Outbound => TransactionKind::Shipment,
            ShipmentKind::Return => TransactionKind::Return,
            ShipmentKind::Transfer => TransactionKind::Transfer,
        }
    }
}

/// Shipment status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Shipped,
    Received,
    Cancelled,
}

impl core::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Shipped => "SHIPPED",
            ShipmentStatus::Received => "RECEIVED",
            ShipmentStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl StatusMachine for ShipmentStatus {
    const ENTITY: &'static str = "shipment";

    fn allowed_next(self) -> &'static [Self] {
        match self {
            ShipmentStatus::Pending => &[ShipmentStatus::Shipped, ShipmentStatus::Cancelled],
            ShipmentStatus::Shipped => &[ShipmentStatus::Received, ShipmentStatus::Cancelled],
            ShipmentStatus::Received => &[ShipmentStatus::Cancelled],
            ShipmentStatus::Cancelled => &[],
        }
    }
}

/// Shipment line. `shipped_qty` and `received_qty` are each set exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub requested_qty: i64,
    pub shipped_qty: i64,
    pub received_qty: i64,
}

/// Line as supplied on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipmentLine {
    pub item_variant_id: ItemVariantId,
    pub requested_qty: i64,
}

/// Caller-supplied quantity for one line (shipped or received).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub line_no: u32,
    pub quantity: i64,
}

/// A line quantity resolved to its variant, as recorded in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMovement {
    pub line_no: u32,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
}

/// Aggregate root: ShipmentRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    id: ShipmentId,
    request_number: String,
    kind: ShipmentKind,
    status: ShipmentStatus,
    from_location: Option<LocationId>,
    to_location: Option<LocationId>,
    created_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    lines: Vec<ShipmentLine>,
    version: u64,
    created: bool,
}

impl ShipmentRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ShipmentId) -> Self {
        Self {
            id,
            request_number: String::new(),
            kind: ShipmentKind::Outbound,
            status: ShipmentStatus::Pending,
            from_location: None,
            to_location: None,
            created_by: None,
            created_at: None,
            shipped_at: None,
            received_at: None,
            cancelled_at: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ShipmentId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn request_number(&self) -> &str {
        &self.request_number
    }

    pub fn kind(&self) -> ShipmentKind {
        self.kind
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn from_location(&self) -> Option<LocationId> {
        self.from_location
    }

    pub fn to_location(&self) -> Option<LocationId> {
        self.to_location
    }

    pub fn created_by(&self) -> Option<ActorId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn lines(&self) -> &[ShipmentLine] {
        &self.lines
    }
}

impl AggregateRoot for ShipmentRequest {
    type Id = ShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipment {
    pub shipment_id: ShipmentId,
    pub request_number: String,
    pub kind: ShipmentKind,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub lines: Vec<NewShipmentLine>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmShipped. One quantity per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmShipped {
    pub shipment_id: ShipmentId,
    pub lines: Vec<LineQuantity>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmReceived. One quantity per line, each at most shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReceived {
    pub shipment_id: ShipmentId,
    pub lines: Vec<LineQuantity>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelShipment {
    pub shipment_id: ShipmentId,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentCommand {
    CreateShipment(CreateShipment),
    ConfirmShipped(ConfirmShipped),
    ConfirmReceived(ConfirmReceived),
    CancelShipment(CancelShipment),
}

/// Event: ShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub shipment_id: ShipmentId,
    pub request_number: String,
    pub kind: ShipmentKind,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub lines: Vec<ShipmentLine>,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentShipped. Stock leaves `from_location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentShipped {
    pub shipment_id: ShipmentId,
    pub from_location: LocationId,
    pub lines: Vec<LineMovement>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentReceived. Stock arrives at `to_location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentReceived {
    pub shipment_id: ShipmentId,
    pub to_location: LocationId,
    pub receipt_kind: TransactionKind,
    pub lines: Vec<LineMovement>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentCancelled.
///
/// Carries the compensation computed from the recorded quantities:
/// `restore_at_origin` is added back at `from_location`, `withdraw_at_destination`
/// is removed from `to_location`. Both are empty for a pending shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCancelled {
    pub shipment_id: ShipmentId,
    pub previous_status: ShipmentStatus,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub receipt_kind: TransactionKind,
    pub restore_at_origin: Vec<LineMovement>,
    pub withdraw_at_destination: Vec<LineMovement>,
    pub reason: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentEvent {
    ShipmentCreated(ShipmentCreated),
    ShipmentShipped(ShipmentShipped),
    ShipmentReceived(ShipmentReceived),
    ShipmentCancelled(ShipmentCancelled),
}

impl Event for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::ShipmentCreated(_) => "shipping.shipment.created",
            ShipmentEvent::ShipmentShipped(_) => "shipping.shipment.shipped",
            ShipmentEvent::ShipmentReceived(_) => "shipping.shipment.received",
            ShipmentEvent::ShipmentCancelled(_) => "shipping.shipment.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentEvent::ShipmentCreated(e) => e.occurred_at,
            ShipmentEvent::ShipmentShipped(e) => e.occurred_at,
            ShipmentEvent::ShipmentReceived(e) => e.occurred_at,
            ShipmentEvent::ShipmentCancelled(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> ActorId {
        match self {
            ShipmentEvent::ShipmentCreated(e) => e.created_by,
            ShipmentEvent::ShipmentShipped(e) => e.actor,
            ShipmentEvent::ShipmentReceived(e) => e.actor,
            ShipmentEvent::ShipmentCancelled(e) => e.actor,
        }
    }
}

impl StockEffects for ShipmentEvent {
    fn stock_movements(&self) -> Vec<StockMovement> {
        let out = |location: LocationId, lines: &[LineMovement], sign: i64, kind| {
            lines
                .iter()
                .filter(|l| l.quantity != 0)
                .map(|l| StockMovement::new(location, l.item_variant_id, sign * l.quantity, kind))
                .collect::<Vec<_>>()
        };

        match self {
            ShipmentEvent::ShipmentCreated(_) => Vec::new(),
            ShipmentEvent::ShipmentShipped(e) => {
                out(e.from_location, &e.lines, -1, TransactionKind::Shipment)
            }
            ShipmentEvent::ShipmentReceived(e) => out(e.to_location, &e.lines, 1, e.receipt_kind),
            ShipmentEvent::ShipmentCancelled(e) => {
                let mut movements =
                    out(e.from_location, &e.restore_at_origin, 1, TransactionKind::Shipment);
                movements.extend(out(
                    e.to_location,
                    &e.withdraw_at_destination,
                    -1,
                    e.receipt_kind,
                ));
                movements
            }
        }
    }
}

impl Aggregate for ShipmentRequest {
    type Command = ShipmentCommand;
    type Event = ShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentEvent::ShipmentCreated(e) => {
                self.id = e.shipment_id;
                self.request_number = e.request_number.clone();
                self.kind = e.kind;
                self.status = ShipmentStatus::Pending;
                self.from_location = Some(e.from_location);
                self.to_location = Some(e.to_location);
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.lines = e.lines.clone();
                self.created = true;
            }
            ShipmentEvent::ShipmentShipped(e) => {
                for m in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == m.line_no) {
                        line.shipped_qty = m.quantity;
                    }
                }
                self.status = ShipmentStatus::Shipped;
                self.shipped_at = Some(e.occurred_at);
            }
            ShipmentEvent::ShipmentReceived(e) => {
                for m in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == m.line_no) {
                        line.received_qty = m.quantity;
                    }
                }
                self.status = ShipmentStatus::Received;
                self.received_at = Some(e.occurred_at);
            }
            ShipmentEvent::ShipmentCancelled(e) => {
                self.status = ShipmentStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentCommand::CreateShipment(cmd) => self.handle_create(cmd),
            ShipmentCommand::ConfirmShipped(cmd) => self.handle_ship(cmd),
            ShipmentCommand::ConfirmReceived(cmd) => self.handle_receive(cmd),
            ShipmentCommand::CancelShipment(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ShipmentRequest {
    fn ensure_shipment_id(&self, shipment_id: ShipmentId) -> Result<(), DomainError> {
        if self.id != shipment_id {
            return Err(DomainError::invariant("shipment_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, shipment_id: ShipmentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_shipment_id(shipment_id)
    }

    fn locations(&self) -> Result<(LocationId, LocationId), DomainError> {
        match (self.from_location, self.to_location) {
            (Some(from), Some(to)) => Ok((from, to)),
            _ => Err(DomainError::invariant("shipment locations must be set")),
        }
    }

    /// Match caller quantities to lines: every line exactly once, no negatives.
    fn resolve_quantities(&self, provided: &[LineQuantity]) -> Result<Vec<LineMovement>, DomainError> {
        let mut by_line: BTreeMap<u32, i64> = BTreeMap::new();
        for q in provided {
            if !self.lines.iter().any(|l| l.line_no == q.line_no) {
                return Err(DomainError::validation(format!("unknown line {}", q.line_no)));
            }
            if by_line.insert(q.line_no, q.quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "line {} supplied more than once",
                    q.line_no
                )));
            }
            if q.quantity < 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity cannot be negative",
                    q.line_no
                )));
            }
        }

        self.lines
            .iter()
            .map(|line| {
                by_line
                    .get(&line.line_no)
                    .map(|qty| LineMovement {
                        line_no: line.line_no,
                        item_variant_id: line.item_variant_id,
                        quantity: *qty,
                    })
                    .ok_or_else(|| {
                        DomainError::validation(format!("missing quantity for line {}", line.line_no))
                    })
            })
            .collect()
    }

    fn handle_create(&self, cmd: &CreateShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("shipment already exists"));
        }
        if cmd.request_number.trim().is_empty() {
            return Err(DomainError::validation("request_number cannot be empty"));
        }
        if cmd.from_location == cmd.to_location {
            return Err(DomainError::validation(
                "from_location and to_location must differ",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("shipment needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, l) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if l.requested_qty <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: requested_qty must be positive"
                )));
            }
            lines.push(ShipmentLine {
                line_no,
                item_variant_id: l.item_variant_id,
                requested_qty: l.requested_qty,
                shipped_qty: 0,
                received_qty: 0,
            });
        }

        Ok(vec![ShipmentEvent::ShipmentCreated(ShipmentCreated {
            shipment_id: cmd.shipment_id,
            request_number: cmd.request_number.trim().to_string(),
            kind: cmd.kind,
            from_location: cmd.from_location,
            to_location: cmd.to_location,
            lines,
            created_by: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ConfirmShipped) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created(cmd.shipment_id)?;
        self.status.ensure_transition(ShipmentStatus::Shipped)?;

        let (from_location, _) = self.locations()?;
        let lines = self.resolve_quantities(&cmd.lines)?;

        Ok(vec![ShipmentEvent::ShipmentShipped(ShipmentShipped {
            shipment_id: cmd.shipment_id,
            from_location,
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ConfirmReceived) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created(cmd.shipment_id)?;
        self.status.ensure_transition(ShipmentStatus::Received)?;

        let (_, to_location) = self.locations()?;
        let lines = self.resolve_quantities(&cmd.lines)?;

        // Whole batch is checked before anything is applied.
        for m in &lines {
            let shipped = self
                .lines
                .iter()
                .find(|l| l.line_no == m.line_no)
                .map(|l| l.shipped_qty)
                .unwrap_or(0);
            if m.quantity > shipped {
                return Err(DomainError::quantity_constraint(
                    m.line_no,
                    format!("received_qty {} exceeds shipped_qty {}", m.quantity, shipped),
                ));
            }
        }

        Ok(vec![ShipmentEvent::ShipmentReceived(ShipmentReceived {
            shipment_id: cmd.shipment_id,
            to_location,
            receipt_kind: self.kind.receipt_kind(),
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created(cmd.shipment_id)?;
        self.status.ensure_transition(ShipmentStatus::Cancelled)?;

        let (from_location, to_location) = self.locations()?;

        let recorded = |qty: fn(&ShipmentLine) -> i64| {
            self.lines
                .iter()
                .map(|l| LineMovement {
                    line_no: l.line_no,
                    item_variant_id: l.item_variant_id,
                    quantity: qty(l),
                })
                .collect::<Vec<_>>()
        };

        let (restore_at_origin, withdraw_at_destination) = match self.status {
            ShipmentStatus::Pending => (Vec::new(), Vec::new()),
            ShipmentStatus::Shipped => (recorded(|l| l.shipped_qty), Vec::new()),
            ShipmentStatus::Received => {
                (recorded(|l| l.shipped_qty), recorded(|l| l.received_qty))
            }
            ShipmentStatus::Cancelled => {
                return Err(DomainError::invalid_transition(
                    ShipmentStatus::ENTITY,
                    self.status,
                    ShipmentStatus::Cancelled,
                ));
            }
        };

        Ok(vec![ShipmentEvent::ShipmentCancelled(ShipmentCancelled {
            shipment_id: cmd.shipment_id,
            previous_status: self.status,
            from_location,
            to_location,
            receipt_kind: self.kind.receipt_kind(),
            restore_at_origin,
            withdraw_at_destination,
            reason: cmd.reason.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use retailerp_events::execute;

    struct Fixture {
        shipment: ShipmentRequest,
        id: ShipmentId,
        from: LocationId,
        to: LocationId,
        sku_a: ItemVariantId,
        sku_b: ItemVariantId,
        actor: ActorId,
    }

    impl Fixture {
        fn run(&mut self, cmd: ShipmentCommand) -> Result<Vec<ShipmentEvent>, DomainError> {
            execute(&mut self.shipment, &cmd)
        }
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    fn pending(kind: ShipmentKind) -> Fixture {
        let id = ShipmentId::new(AggregateId::new());
        let mut fx = Fixture {
            shipment: ShipmentRequest::empty(id),
            id,
            from: LocationId::new(),
            to: LocationId::new(),
            sku_a: ItemVariantId::new(),
            sku_b: ItemVariantId::new(),
            actor: ActorId::new(),
        };
        let cmd = ShipmentCommand::CreateShipment(CreateShipment {
            shipment_id: id,
            request_number: "SH-0001".to_string(),
            kind,
            from_location: fx.from,
            to_location: fx.to,
            lines: vec![
                NewShipmentLine {
                    item_variant_id: fx.sku_a,
                    requested_qty: 10,
                },
                NewShipmentLine {
                    item_variant_id: fx.sku_b,
                    requested_qty: 4,
                },
            ],
            actor: fx.actor,
            occurred_at: test_time(),
        });
        execute(&mut fx.shipment, &cmd).unwrap();
        fx
    }

    fn ship(fx: &Fixture, a: i64, b: i64) -> ShipmentCommand {
        ShipmentCommand::ConfirmShipped(ConfirmShipped {
            shipment_id: fx.id,
            lines: vec![
                LineQuantity {
                    line_no: 1,
                    quantity: a,
                },
                LineQuantity {
                    line_no: 2,
                    quantity: b,
                },
            ],
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    fn receive(fx: &Fixture, a: i64, b: i64) -> ShipmentCommand {
        ShipmentCommand::ConfirmReceived(ConfirmReceived {
            shipment_id: fx.id,
            lines: vec![
                LineQuantity {
                    line_no: 1,
                    quantity: a,
                },
                LineQuantity {
                    line_no: 2,
                    quantity: b,
                },
            ],
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    fn cancel(fx: &Fixture) -> ShipmentCommand {
        ShipmentCommand::CancelShipment(CancelShipment {
            shipment_id: fx.id,
            reason: Some("customer changed mind".to_string()),
            actor: fx.actor,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_starts_pending_with_zeroed_lines() {
        let fx = pending(ShipmentKind::Transfer);
        assert_eq!(fx.shipment.status(), ShipmentStatus::Pending);
        assert_eq!(fx.shipment.lines().len(), 2);
        assert!(fx
            .shipment
            .lines()
            .iter()
            .all(|l| l.shipped_qty == 0 && l.received_qty == 0));
        assert_eq!(fx.shipment.created_by(), Some(fx.actor));
    }

    #[test]
    fn create_rejects_same_origin_and_destination() {
        let id = ShipmentId::new(AggregateId::new());
        let loc = LocationId::new();
        let err = ShipmentRequest::empty(id)
            .handle(&ShipmentCommand::CreateShipment(CreateShipment {
                shipment_id: id,
                request_number: "SH-2".to_string(),
                kind: ShipmentKind::Transfer,
                from_location: loc,
                to_location: loc,
                lines: vec![NewShipmentLine {
                    item_variant_id: ItemVariantId::new(),
                    requested_qty: 1,
                }],
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_non_positive_requested_qty() {
        let id = ShipmentId::new(AggregateId::new());
        let err = ShipmentRequest::empty(id)
            .handle(&ShipmentCommand::CreateShipment(CreateShipment {
                shipment_id: id,
                request_number: "SH-3".to_string(),
                kind: ShipmentKind::Outbound,
                from_location: LocationId::new(),
                to_location: LocationId::new(),
                lines: vec![NewShipmentLine {
                    item_variant_id: ItemVariantId::new(),
                    requested_qty: -2,
                }],
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("line 1")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn ship_decrements_origin_per_line() {
        let mut fx = pending(ShipmentKind::Outbound);
        let events = fx.run(ship(&fx, 8, 4)).unwrap();

        assert_eq!(fx.shipment.status(), ShipmentStatus::Shipped);
        assert_eq!(fx.shipment.lines()[0].shipped_qty, 8);
        assert_eq!(
            events[0].stock_movements(),
            vec![
                StockMovement::new(fx.from, fx.sku_a, -8, TransactionKind::Shipment),
                StockMovement::new(fx.from, fx.sku_b, -4, TransactionKind::Shipment),
            ]
        );
    }

    #[test]
    fn shipping_more_than_requested_is_allowed() {
        let mut fx = pending(ShipmentKind::Outbound);
        fx.run(ship(&fx, 12, 4)).unwrap();
        assert_eq!(fx.shipment.lines()[0].shipped_qty, 12);
    }

    #[test]
    fn zero_quantity_lines_have_no_movement() {
        let mut fx = pending(ShipmentKind::Outbound);
        let events = fx.run(ship(&fx, 5, 0)).unwrap();
        assert_eq!(events[0].stock_movements().len(), 1);
    }

    #[test]
    fn confirm_shipped_twice_is_an_invalid_transition() {
        let mut fx = pending(ShipmentKind::Outbound);
        fx.run(ship(&fx, 8, 4)).unwrap();

        let err = fx.shipment.handle(&ship(&fx, 8, 4)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                entity: "shipment",
                from: "SHIPPED".to_string(),
                to: "SHIPPED".to_string(),
            }
        );
    }

    #[test]
    fn missing_and_duplicate_lines_are_rejected() {
        let fx = pending(ShipmentKind::Outbound);
        let only_one = ShipmentCommand::ConfirmShipped(ConfirmShipped {
            shipment_id: fx.id,
            lines: vec![LineQuantity {
                line_no: 1,
                quantity: 3,
            }],
            actor: fx.actor,
            occurred_at: test_time(),
        });
        assert!(matches!(
            fx.shipment.handle(&only_one),
            Err(DomainError::Validation(msg)) if msg.contains("missing quantity for line 2")
        ));

        let dup = ShipmentCommand::ConfirmShipped(ConfirmShipped {
            shipment_id: fx.id,
            lines: vec![
                LineQuantity {
                    line_no: 1,
                    quantity: 3,
                },
                LineQuantity {
                    line_no: 1,
                    quantity: 3,
                },
            ],
            actor: fx.actor,
            occurred_at: test_time(),
        });
        assert!(matches!(fx.shipment.handle(&dup), Err(DomainError::Validation(_))));
    }

    #[test]
    fn negative_shipped_qty_is_a_validation_error() {
        let fx = pending(ShipmentKind::Outbound);
        assert!(matches!(
            fx.shipment.handle(&ship(&fx, -1, 4)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn cannot_receive_before_shipping() {
        let fx = pending(ShipmentKind::Transfer);
        let err = fx.shipment.handle(&receive(&fx, 1, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn receive_more_than_shipped_rejects_whole_batch() {
        let mut fx = pending(ShipmentKind::Transfer);
        fx.run(ship(&fx, 8, 4)).unwrap();

        let err = fx.shipment.handle(&receive(&fx, 8, 5)).unwrap_err();
        assert_eq!(
            err,
            DomainError::QuantityConstraint {
                line_no: 2,
                rule: "received_qty 5 exceeds shipped_qty 4".to_string(),
            }
        );
        assert_eq!(fx.shipment.status(), ShipmentStatus::Shipped);
    }

    #[test]
    fn receipt_kind_follows_request_kind() {
        for (kind, expected) in [
            (ShipmentKind::Outbound, TransactionKind::Shipment),
            (ShipmentKind::Return, TransactionKind::Return),
            (ShipmentKind::Transfer, TransactionKind::Transfer),
        ] {
            let mut fx = pending(kind);
            fx.run(ship(&fx, 8, 4)).unwrap();
            let events = fx.run(receive(&fx, 8, 4)).unwrap();
            let movements = events[0].stock_movements();
            assert!(movements.iter().all(|m| m.kind == expected && m.location_id == fx.to));
            assert_eq!(fx.shipment.lines()[0].received_qty, 8);
        }
    }

    #[test]
    fn cancel_pending_has_no_compensation() {
        let mut fx = pending(ShipmentKind::Outbound);
        let events = fx.run(cancel(&fx)).unwrap();
        assert!(events[0].stock_movements().is_empty());
        assert_eq!(fx.shipment.status(), ShipmentStatus::Cancelled);
    }

    #[test]
    fn cancel_shipped_restores_origin_only() {
        let mut fx = pending(ShipmentKind::Outbound);
        fx.run(ship(&fx, 8, 4)).unwrap();
        let events = fx.run(cancel(&fx)).unwrap();
        assert_eq!(
            events[0].stock_movements(),
            vec![
                StockMovement::new(fx.from, fx.sku_a, 8, TransactionKind::Shipment),
                StockMovement::new(fx.from, fx.sku_b, 4, TransactionKind::Shipment),
            ]
        );
    }

    #[test]
    fn cancel_received_undoes_both_sides_with_recorded_quantities() {
        let mut fx = pending(ShipmentKind::Transfer);
        fx.run(ship(&fx, 8, 4)).unwrap();
        fx.run(receive(&fx, 7, 4)).unwrap();
        let events = fx.run(cancel(&fx)).unwrap();

        assert_eq!(
            events[0].stock_movements(),
            vec![
                StockMovement::new(fx.from, fx.sku_a, 8, TransactionKind::Shipment),
                StockMovement::new(fx.from, fx.sku_b, 4, TransactionKind::Shipment),
                StockMovement::new(fx.to, fx.sku_a, -7, TransactionKind::Transfer),
                StockMovement::new(fx.to, fx.sku_b, -4, TransactionKind::Transfer),
            ]
        );
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut fx = pending(ShipmentKind::Outbound);
        fx.run(cancel(&fx)).unwrap();
        let err = fx.shipment.handle(&cancel(&fx)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                entity: "shipment",
                from: "CANCELLED".to_string(),
                to: "CANCELLED".to_string(),
            }
        );
    }

    #[test]
    fn version_increments_on_apply() {
        let mut fx = pending(ShipmentKind::Outbound);
        assert_eq!(fx.shipment.version(), 1);
        fx.run(ship(&fx, 1, 1)).unwrap();
        assert_eq!(fx.shipment.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let fx = pending(ShipmentKind::Outbound);
        let before = fx.shipment.clone();
        let _ = fx.shipment.handle(&ship(&fx, 2, 2)).unwrap();
        assert_eq!(fx.shipment, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: ship, receive, then cancel nets to zero movement per key.
        #[test]
        fn full_round_trip_nets_to_zero(
            shipped_a in 0i64..50,
            shipped_b in 0i64..50,
            recv_pct in 0i64..=100,
        ) {
            let mut fx = pending(ShipmentKind::Transfer);
            let recv_a = shipped_a * recv_pct / 100;
            let recv_b = shipped_b * recv_pct / 100;

            let mut all = Vec::new();
            for cmd in [ship(&fx, shipped_a, shipped_b), receive(&fx, recv_a, recv_b), cancel(&fx)] {
                for ev in execute(&mut fx.shipment, &cmd).unwrap() {
                    all.extend(ev.stock_movements());
                }
            }

            let mut net: BTreeMap<(LocationId, ItemVariantId), i64> = BTreeMap::new();
            for m in all {
                *net.entry((m.location_id, m.item_variant_id)).or_default() += m.delta;
            }
            prop_assert!(net.values().all(|d| *d == 0));
        }
    }
}
