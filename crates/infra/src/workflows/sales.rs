use serde_json::Value as JsonValue;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use retailerp_core::{ActorId, AggregateId};
use retailerp_events::{EventBus, EventEnvelope};
use retailerp_sales::{
    DeleteSale, EditSaleQuantity, LinkReturn, RecordSale, Sale, SaleCommand, SaleId, UnlinkReturn,
};

use super::{Workflows, aggregate_types};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::keyed_mutex::KeyedMutex;

fn empty(id: AggregateId) -> Sale {
    Sale::empty(SaleId(id))
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    /// Record a sale (`-qty`) or a return (`+qty`).
    ///
    /// A return that names its original sale is linked to it first, so the
    /// original cannot be deleted underneath it. If recording then fails, the
    /// link is removed again.
    pub fn record_sale(&self, cmd: RecordSale) -> Result<Sale, DispatchError> {
        cmd.validate()?;

        let Some(original) = cmd.original_sale else {
            return self.record(cmd);
        };

        let (return_id, actor, occurred_at) = (cmd.sale_id, cmd.actor, cmd.occurred_at);
        self.dispatcher().dispatch(
            original.0,
            aggregate_types::SALE,
            SaleCommand::LinkReturn(LinkReturn {
                sale_id: original,
                return_id,
                actor,
                occurred_at,
            }),
            empty,
        )?;

        self.record(cmd).inspect_err(|err| {
            let undo = self.dispatcher().dispatch(
                original.0,
                aggregate_types::SALE,
                SaleCommand::UnlinkReturn(UnlinkReturn {
                    sale_id: original,
                    return_id,
                    actor,
                    occurred_at,
                }),
                empty,
            );
            if let Err(undo_err) = undo {
                warn!(
                    sale_id = %original,
                    return_id = %return_id,
                    error = %err,
                    undo_error = %undo_err,
                    "failed to unlink return after recording failed"
                );
            }
        })
    }

    fn record(&self, cmd: RecordSale) -> Result<Sale, DispatchError> {
        let (id, actor) = (cmd.sale_id.0, cmd.actor);
        self.execute(id, aggregate_types::SALE, actor, SaleCommand::RecordSale(cmd), empty)
            .map(|o| o.state)
    }

    /// Change the quantity. Sales move `old - new`, returns `new - old`.
    pub fn edit_sale(&self, cmd: EditSaleQuantity) -> Result<Sale, DispatchError> {
        let (id, actor) = (cmd.sale_id.0, cmd.actor);
        self.execute(id, aggregate_types::SALE, actor, SaleCommand::EditSaleQuantity(cmd), empty)
            .map(|o| o.state)
    }

    /// Delete and reverse the stock movement. Refused while returns are linked.
    ///
    /// Deleting a linked return also unlinks it from its original sale. That
    /// unlink is best-effort; a link left behind by a failed unlink is pruned
    /// here the next time the original is deleted.
    pub fn delete_sale(&self, cmd: DeleteSale) -> Result<Sale, DispatchError> {
        let (id, actor, occurred_at) = (cmd.sale_id, cmd.actor, cmd.occurred_at);
        self.prune_deleted_returns(id, actor, occurred_at)?;

        let sale = self
            .execute(id.0, aggregate_types::SALE, actor, SaleCommand::DeleteSale(cmd), empty)?
            .state;

        if let Some(original) = sale.original_sale() {
            let unlink = self.dispatcher().dispatch(
                original.0,
                aggregate_types::SALE,
                SaleCommand::UnlinkReturn(UnlinkReturn {
                    sale_id: original,
                    return_id: id,
                    actor,
                    occurred_at,
                }),
                empty,
            );
            if let Err(err) = unlink {
                warn!(sale_id = %original, return_id = %id, error = %err, "failed to unlink deleted return");
            }
        }

        Ok(sale)
    }

    /// Unlink returns that were deleted but are still linked to `sale_id`.
    /// Returns that cannot be found stay linked.
    fn prune_deleted_returns(
        &self,
        sale_id: SaleId,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Some(sale) = self.dispatcher().load(sale_id.0, empty)? else {
            return Ok(());
        };

        for &return_id in sale.linked_returns() {
            let deleted = self
                .dispatcher()
                .load(return_id.0, empty)?
                .is_some_and(|r| r.is_deleted());
            if !deleted {
                continue;
            }
            self.dispatcher().dispatch(
                sale_id.0,
                aggregate_types::SALE,
                SaleCommand::UnlinkReturn(UnlinkReturn {
                    sale_id,
                    return_id,
                    actor,
                    occurred_at,
                }),
                empty,
            )?;
            info!(sale_id = %sale_id, return_id = %return_id, "pruned link to deleted return");
        }
        Ok(())
    }

    pub fn sale(&self, sale_id: SaleId) -> Result<Sale, DispatchError> {
        self.require(sale_id.0, empty)
    }

    pub fn sales(&self) -> Result<Vec<Sale>, DispatchError> {
        self.dispatcher().load_all(aggregate_types::SALE, empty)
    }
}
