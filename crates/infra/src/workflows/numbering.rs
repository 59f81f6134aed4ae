//! Request numbers are unique per request kind.
//!
//! Each number is claimed by a single-event stream whose id is derived from the
//! kind and the number. The claim is checked and written under the request
//! gate, so two creates with the same number serialize on the same key even
//! when they run on different nodes.

use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use tracing::error;
use uuid::Uuid;

use retailerp_core::{ActorId, AggregateId, ExpectedVersion};
use retailerp_events::{EventBus, EventEnvelope};

use super::Workflows;
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, UncommittedEvent};
use crate::keyed_mutex::KeyedMutex;

pub const REQUEST_NUMBER: &str = "request_number";
const CLAIMED: &str = "request_number.claimed";

/// Stream id holding the claim on `number` for `aggregate_type`.
pub fn claim_id(aggregate_type: &str, number: &str) -> AggregateId {
    let name = format!("{aggregate_type}:{}", number.trim());
    AggregateId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    /// Run `create` only if `number` is unclaimed, then claim it for `owner`.
    pub(super) fn create_numbered<T>(
        &self,
        aggregate_type: &str,
        number: &str,
        owner: AggregateId,
        actor: ActorId,
        create: impl FnOnce() -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let number = number.trim();
        let claim = claim_id(aggregate_type, number);
        let _gate = self.dispatcher().gate().acquire(&claim)?;

        let store = self.dispatcher().store();
        if !store.load_stream(claim)?.is_empty() {
            return Err(DispatchError::Conflict(format!(
                "{aggregate_type} number '{number}' is already in use"
            )));
        }

        let created = create()?;

        let event = UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: claim,
            aggregate_type: REQUEST_NUMBER.to_string(),
            event_type: CLAIMED.to_string(),
            event_version: 1,
            actor,
            occurred_at: Utc::now(),
            payload: json!({
                "aggregate_type": aggregate_type,
                "request_number": number,
                "aggregate_id": owner,
            }),
        };
        if let Err(err) = store.append(vec![event], ExpectedVersion::Exact(0)) {
            error!(%owner, number, error = %err, "request created but its number was not claimed");
            return Err(err.into());
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_ids_are_stable_and_scoped_by_kind() {
        assert_eq!(claim_id("shipping.shipment", "SH-1"), claim_id("shipping.shipment", " SH-1 "));
        assert_ne!(claim_id("shipping.shipment", "SH-1"), claim_id("restock.request", "SH-1"));
        assert_ne!(claim_id("shipping.shipment", "SH-1"), claim_id("shipping.shipment", "SH-2"));
    }
}
