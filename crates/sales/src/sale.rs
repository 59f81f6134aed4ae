use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailerp_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, ItemVariantId,
    LocationId,
};
use retailerp_events::Event;
use retailerp_inventory::{StockEffects, StockMovement, TransactionKind};

/// Sale identifier. Returns are sales of kind `Return`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleKind {
    Sale,
    Return,
}

impl SaleKind {
    /// Sign of the stock change when this record comes into existence:
    /// a sale takes units out, a return brings them back.
    fn direction(self) -> i64 {
        match self {
            SaleKind::Sale => -1,
            SaleKind::Return => 1,
        }
    }
}

/// Aggregate root: Sale (one variant, one location, one quantity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    kind: SaleKind,
    location_id: Option<LocationId>,
    item_variant_id: Option<ItemVariantId>,
    quantity: i64,
    original_sale: Option<SaleId>,
    linked_returns: Vec<SaleId>,
    deleted: bool,
    recorded_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Sale {
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            kind: SaleKind::Sale,
            location_id: None,
            item_variant_id: None,
            quantity: 0,
            original_sale: None,
            linked_returns: Vec::new(),
            deleted: false,
            recorded_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> SaleKind {
        self.kind
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn item_variant_id(&self) -> Option<ItemVariantId> {
        self.item_variant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn original_sale(&self) -> Option<SaleId> {
        self.original_sale
    }

    pub fn linked_returns(&self) -> &[SaleId] {
        &self.linked_returns
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub sale_id: SaleId,
    pub kind: SaleKind,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
    /// Only for returns: the sale being returned against.
    pub original_sale: Option<SaleId>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl RecordSale {
    /// Shape checks that do not depend on aggregate state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        match (self.kind, self.original_sale) {
            (SaleKind::Sale, Some(_)) => Err(DomainError::validation(
                "only returns can reference an original sale",
            )),
            (SaleKind::Return, Some(original)) if original == self.sale_id => Err(
                DomainError::validation("a return cannot reference itself"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSaleQuantity {
    pub sale_id: SaleId,
    pub new_quantity: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSale {
    pub sale_id: SaleId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Attach a return to the sale it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReturn {
    pub sale_id: SaleId,
    pub return_id: SaleId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkReturn {
    pub sale_id: SaleId,
    pub return_id: SaleId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    EditSaleQuantity(EditSaleQuantity),
    DeleteSale(DeleteSale),
    LinkReturn(LinkReturn),
    UnlinkReturn(UnlinkReturn),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub kind: SaleKind,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
    pub original_sale: Option<SaleId>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleQuantityEdited {
    pub sale_id: SaleId,
    pub kind: SaleKind,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDeleted {
    pub sale_id: SaleId,
    pub kind: SaleKind,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub quantity: i64,
    pub original_sale: Option<SaleId>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLinked {
    pub sale_id: SaleId,
    pub return_id: SaleId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUnlinked {
    pub sale_id: SaleId,
    pub return_id: SaleId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleQuantityEdited(SaleQuantityEdited),
    SaleDeleted(SaleDeleted),
    ReturnLinked(ReturnLinked),
    ReturnUnlinked(ReturnUnlinked),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleQuantityEdited(_) => "sales.sale.quantity_edited",
            SaleEvent::SaleDeleted(_) => "sales.sale.deleted",
            SaleEvent::ReturnLinked(_) => "sales.sale.return_linked",
            SaleEvent::ReturnUnlinked(_) => "sales.sale.return_unlinked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::SaleQuantityEdited(e) => e.occurred_at,
            SaleEvent::SaleDeleted(e) => e.occurred_at,
            SaleEvent::ReturnLinked(e) => e.occurred_at,
            SaleEvent::ReturnUnlinked(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> ActorId {
        match self {
            SaleEvent::SaleRecorded(e) => e.actor,
            SaleEvent::SaleQuantityEdited(e) => e.actor,
            SaleEvent::SaleDeleted(e) => e.actor,
            SaleEvent::ReturnLinked(e) => e.actor,
            SaleEvent::ReturnUnlinked(e) => e.actor,
        }
    }
}

impl StockEffects for SaleEvent {
    fn stock_movements(&self) -> Vec<StockMovement> {
        let movement = match self {
            SaleEvent::SaleRecorded(e) => {
                let kind = match e.kind {
                    SaleKind::Sale => TransactionKind::Sale,
                    SaleKind::Return => TransactionKind::Return,
                };
                StockMovement::new(
                    e.location_id,
                    e.item_variant_id,
                    e.kind.direction() * e.quantity,
                    kind,
                )
            }
            // Sale edit: old - new. Return edit: new - old.
            SaleEvent::SaleQuantityEdited(e) => StockMovement::new(
                e.location_id,
                e.item_variant_id,
                e.kind.direction() * (e.new_quantity - e.old_quantity),
                TransactionKind::SaleEdit,
            ),
            SaleEvent::SaleDeleted(e) => StockMovement::new(
                e.location_id,
                e.item_variant_id,
                -e.kind.direction() * e.quantity,
                TransactionKind::SaleDelete,
            ),
            SaleEvent::ReturnLinked(_) | SaleEvent::ReturnUnlinked(_) => return Vec::new(),
        };

        if movement.delta == 0 {
            Vec::new()
        } else {
            vec![movement]
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.kind = e.kind;
                self.location_id = Some(e.location_id);
                self.item_variant_id = Some(e.item_variant_id);
                self.quantity = e.quantity;
                self.original_sale = e.original_sale;
                self.recorded_at = Some(e.occurred_at);
                self.created = true;
            }
            SaleEvent::SaleQuantityEdited(e) => {
                self.quantity = e.new_quantity;
            }
            SaleEvent::SaleDeleted(_) => {
                self.deleted = true;
            }
            SaleEvent::ReturnLinked(e) => {
                if !self.linked_returns.contains(&e.return_id) {
                    self.linked_returns.push(e.return_id);
                }
            }
            SaleEvent::ReturnUnlinked(e) => {
                self.linked_returns.retain(|r| *r != e.return_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::EditSaleQuantity(cmd) => self.handle_edit(cmd),
            SaleCommand::DeleteSale(cmd) => self.handle_delete(cmd),
            SaleCommand::LinkReturn(cmd) => self.handle_link(cmd),
            SaleCommand::UnlinkReturn(cmd) => {
                self.ensure_created(cmd.sale_id)?;
                if !self.linked_returns.contains(&cmd.return_id) {
                    return Err(DomainError::validation(format!(
                        "return {} is not linked to sale {}",
                        cmd.return_id, cmd.sale_id
                    )));
                }
                Ok(vec![SaleEvent::ReturnUnlinked(ReturnUnlinked {
                    sale_id: cmd.sale_id,
                    return_id: cmd.return_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Sale {
    fn ensure_created(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self, sale_id: SaleId) -> Result<(), DomainError> {
        self.ensure_created(sale_id)?;
        if self.deleted {
            return Err(DomainError::validation(format!("sale {sale_id} is deleted")));
        }
        Ok(())
    }

    fn position(&self) -> Result<(LocationId, ItemVariantId), DomainError> {
        match (self.location_id, self.item_variant_id) {
            (Some(location), Some(variant)) => Ok((location, variant)),
            _ => Err(DomainError::invariant("sale location and variant must be set")),
        }
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        cmd.validate()?;

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            sale_id: cmd.sale_id,
            kind: cmd.kind,
            location_id: cmd.location_id,
            item_variant_id: cmd.item_variant_id,
            quantity: cmd.quantity,
            original_sale: cmd.original_sale,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditSaleQuantity) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_live(cmd.sale_id)?;
        if cmd.new_quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let (location_id, item_variant_id) = self.position()?;

        Ok(vec![SaleEvent::SaleQuantityEdited(SaleQuantityEdited {
            sale_id: cmd.sale_id,
            kind: self.kind,
            location_id,
            item_variant_id,
            old_quantity: self.quantity,
            new_quantity: cmd.new_quantity,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_live(cmd.sale_id)?;
        if !self.linked_returns.is_empty() {
            return Err(DomainError::validation(format!(
                "sale {} has {} linked return(s) and cannot be deleted",
                cmd.sale_id,
                self.linked_returns.len()
            )));
        }
        let (location_id, item_variant_id) = self.position()?;

        Ok(vec![SaleEvent::SaleDeleted(SaleDeleted {
            sale_id: cmd.sale_id,
            kind: self.kind,
            location_id,
            item_variant_id,
            quantity: self.quantity,
            original_sale: self.original_sale,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link(&self, cmd: &LinkReturn) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_live(cmd.sale_id)?;
        if self.kind != SaleKind::Sale {
            return Err(DomainError::validation(
                "returns can only be linked to a sale",
            ));
        }
        if self.linked_returns.contains(&cmd.return_id) {
            return Err(DomainError::conflict(format!(
                "return {} already linked",
                cmd.return_id
            )));
        }

        Ok(vec![SaleEvent::ReturnLinked(ReturnLinked {
            sale_id: cmd.sale_id,
            return_id: cmd.return_id,
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

    fn recorded(kind: SaleKind, quantity: i64) -> (Sale, SaleId, LocationId, ItemVariantId) {
        let id = SaleId::new(AggregateId::new());
        let location = LocationId::new();
        let variant = ItemVariantId::new();
        let mut sale = Sale::empty(id);
        execute(
            &mut sale,
            &SaleCommand::RecordSale(RecordSale {
                sale_id: id,
                kind,
                location_id: location,
                item_variant_id: variant,
                quantity,
                original_sale: None,
                actor: ActorId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (sale, id, location, variant)
    }

    fn edit(id: SaleId, new_quantity: i64) -> SaleCommand {
        SaleCommand::EditSaleQuantity(EditSaleQuantity {
            sale_id: id,
            new_quantity,
            actor: ActorId::new(),
            occurred_at: test_time(),
        })
    }

    fn delete(id: SaleId) -> SaleCommand {
        SaleCommand::DeleteSale(DeleteSale {
            sale_id: id,
            actor: ActorId::new(),
            occurred_at: test_time(),
        })
    }

    fn link(id: SaleId, return_id: SaleId) -> SaleCommand {
        SaleCommand::LinkReturn(LinkReturn {
            sale_id: id,
            return_id,
            actor: ActorId::new(),
            occurred_at: test_time(),
        })
    }

    fn single_delta(events: &[SaleEvent]) -> (i64, TransactionKind) {
        let movements = events[0].stock_movements();
        assert_eq!(movements.len(), 1);
        (movements[0].delta, movements[0].kind)
    }

    #[test]
    fn new_sale_takes_stock_out() {
        let id = SaleId::new(AggregateId::new());
        let events = Sale::empty(id)
            .handle(&SaleCommand::RecordSale(RecordSale {
                sale_id: id,
                kind: SaleKind::Sale,
                location_id: LocationId::new(),
                item_variant_id: ItemVariantId::new(),
                quantity: 3,
                original_sale: None,
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(single_delta(&events), (-3, TransactionKind::Sale));
    }

    #[test]
    fn return_brings_stock_back() {
        let id = SaleId::new(AggregateId::new());
        let events = Sale::empty(id)
            .handle(&SaleCommand::RecordSale(RecordSale {
                sale_id: id,
                kind: SaleKind::Return,
                location_id: LocationId::new(),
                item_variant_id: ItemVariantId::new(),
                quantity: 2,
                original_sale: Some(SaleId::new(AggregateId::new())),
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(single_delta(&events), (2, TransactionKind::Return));
    }

    #[test]
    fn edit_sale_uses_old_minus_new() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 5);
        let events = execute(&mut sale, &edit(id, 3)).unwrap();
        assert_eq!(single_delta(&events), (2, TransactionKind::SaleEdit));
        assert_eq!(sale.quantity(), 3);
    }

    #[test]
    fn edit_return_uses_new_minus_old() {
        let (mut sale, id, _, _) = recorded(SaleKind::Return, 5);
        let events = execute(&mut sale, &edit(id, 3)).unwrap();
        assert_eq!(single_delta(&events), (-2, TransactionKind::SaleEdit));
    }

    #[test]
    fn edit_to_same_quantity_has_no_movement() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 5);
        let events = execute(&mut sale, &edit(id, 5)).unwrap();
        assert!(events[0].stock_movements().is_empty());
    }

    #[test]
    fn delete_sale_restores_and_delete_return_withdraws() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 4);
        let events = execute(&mut sale, &delete(id)).unwrap();
        assert_eq!(single_delta(&events), (4, TransactionKind::SaleDelete));
        assert!(sale.is_deleted());

        let (mut ret, rid, _, _) = recorded(SaleKind::Return, 4);
        let events = execute(&mut ret, &delete(rid)).unwrap();
        assert_eq!(single_delta(&events), (-4, TransactionKind::SaleDelete));
    }

    #[test]
    fn sale_with_linked_returns_cannot_be_deleted() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 4);
        let return_id = SaleId::new(AggregateId::new());
        execute(&mut sale, &link(id, return_id)).unwrap();

        let err = sale.handle(&delete(id)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("linked return")));

        execute(
            &mut sale,
            &SaleCommand::UnlinkReturn(UnlinkReturn {
                sale_id: id,
                return_id,
                actor: ActorId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(sale.handle(&delete(id)).is_ok());
    }

    #[test]
    fn deleted_sales_reject_further_changes() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 4);
        execute(&mut sale, &delete(id)).unwrap();
        assert!(matches!(sale.handle(&edit(id, 2)), Err(DomainError::Validation(_))));
        assert!(matches!(sale.handle(&delete(id)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn returns_cannot_be_link_targets() {
        let (sale, id, _, _) = recorded(SaleKind::Return, 1);
        assert!(sale.handle(&link(id, SaleId::new(AggregateId::new()))).is_err());
    }

    #[test]
    fn linking_twice_conflicts() {
        let (mut sale, id, _, _) = recorded(SaleKind::Sale, 4);
        let return_id = SaleId::new(AggregateId::new());
        execute(&mut sale, &link(id, return_id)).unwrap();
        assert!(matches!(
            sale.handle(&link(id, return_id)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn quantities_must_be_positive() {
        let id = SaleId::new(AggregateId::new());
        let cmd = RecordSale {
            sale_id: id,
            kind: SaleKind::Sale,
            location_id: LocationId::new(),
            item_variant_id: ItemVariantId::new(),
            quantity: 0,
            original_sale: None,
            actor: ActorId::new(),
            occurred_at: test_time(),
        };
        assert!(cmd.validate().is_err());

        let (sale, sid, _, _) = recorded(SaleKind::Sale, 4);
        assert!(sale.handle(&edit(sid, 0)).is_err());
    }

    #[test]
    fn plain_sale_cannot_reference_an_original() {
        let cmd = RecordSale {
            sale_id: SaleId::new(AggregateId::new()),
            kind: SaleKind::Sale,
            location_id: LocationId::new(),
            item_variant_id: ItemVariantId::new(),
            quantity: 1,
            original_sale: Some(SaleId::new(AggregateId::new())),
            actor: ActorId::new(),
            occurred_at: test_time(),
        };
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }
}
