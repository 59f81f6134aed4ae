//! Command execution pipeline for event-sourced request aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 0. Acquire the request gate (one transition per aggregate at a time)
//!   ↓
//! 1. Load the stream and check its ordering
//!   ↓
//! 2. Rehydrate the aggregate
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Apply stock effects (ledger mutator calls, supplied by the caller)
//!   ↓
//! 5. Append with an exact expected version
//!   ↓
//! 6. Publish committed events (best-effort)
//! ```
//!
//! A rejected command stops at step 3: nothing reaches the ledger and nothing
//! is appended. Publication failures are logged and never fail the command.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use retailerp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use retailerp_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::inventory_store::StoreError;
use crate::keyed_mutex::{InMemoryKeyedMutex, KeyedMutex, LockError};
use crate::ledger_mutator::MutationError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Whole batch rejected before any stock effect.
    #[error("line {line_no}: {rule}")]
    QuantityConstraint { line_no: u32, rule: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    /// The aggregate already exists, or a domain-level duplicate.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency failure on append or a stale stock read.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A keyed gate could not be acquired in time. Retryable.
    #[error("timed out waiting for exclusive access: {0}")]
    ConcurrencyTimeout(String),

    #[error("storage failure: {0}")]
    Storage(String),

    /// Historical payloads did not deserialize into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// A ledger call failed after `applied` earlier calls of the same
    /// transition had already been committed. The transition was not recorded.
    #[error("{applied} stock movement(s) applied before failure: {source}")]
    PartialEffect {
        applied: usize,
        #[source]
        source: MutationError,
    },

    /// Stock effects were applied but the append that records them failed.
    /// Not retryable: the ledger already carries the movements.
    #[error("{applied} stock movement(s) applied but the transition was not recorded: {source}")]
    UnrecordedEffects {
        applied: usize,
        #[source]
        source: EventStoreError,
    },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Concurrency(_) | DispatchError::ConcurrencyTimeout(_)
        )
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidTransition { entity, from, to } => {
                DispatchError::InvalidTransition { entity, from, to }
            }
            DomainError::QuantityConstraint { line_no, rule } => {
                DispatchError::QuantityConstraint { line_no, rule }
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
        }
    }
}

impl From<LockError> for DispatchError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Timeout { .. } => DispatchError::ConcurrencyTimeout(value.to_string()),
            LockError::Backend(msg) => DispatchError::Storage(msg),
        }
    }
}

impl From<MutationError> for DispatchError {
    fn from(value: MutationError) -> Self {
        match value {
            MutationError::Lock(e) => e.into(),
            MutationError::Store(e @ StoreError::Conflict { .. }) => {
                DispatchError::Concurrency(e.to_string())
            }
            MutationError::Store(StoreError::Storage(msg)) => DispatchError::Storage(msg),
        }
    }
}

/// Rehydrated state after a dispatch, plus what was appended.
#[derive(Debug, Clone)]
pub struct Outcome<A> {
    pub state: A,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for request aggregates.
///
/// `G` is the request gate, keyed by aggregate id. It serializes transitions
/// of one request so two concurrent confirmations cannot both apply effects.
#[derive(Debug)]
pub struct CommandDispatcher<S, B, G = InMemoryKeyedMutex<AggregateId>> {
    store: S,
    bus: B,
    gate: G,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self::with_gate(store, bus, InMemoryKeyedMutex::default())
    }
}

impl<S, B, G> CommandDispatcher<S, B, G> {
    pub fn with_gate(store: S, bus: B, gate: G) -> Self {
        Self { store, bus, gate }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }
}

impl<S, B, G> CommandDispatcher<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    /// Dispatch a command with no stock effects.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Outcome<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: retailerp_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_with_effects(aggregate_id, aggregate_type, command, make_aggregate, |_| Ok(0))
    }

    /// Dispatch a command, running `effects` on the decided events before
    /// they are appended.
    ///
    /// If `effects` fails the events are not appended and the error is
    /// returned as is.
    #[instrument(
        skip_all,
        fields(aggregate_id = %aggregate_id, aggregate_type = aggregate_type),
        err
    )]
    pub fn dispatch_with_effects<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
        effects: impl FnOnce(&[A::Event]) -> Result<usize, DispatchError>,
    ) -> Result<Outcome<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: retailerp_events::Event + Serialize + DeserializeOwned,
    {
        let _gate = self.gate.acquire(&aggregate_id)?;

        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Outcome {
                state: aggregate,
                committed: vec![],
            });
        }

        // Serialize before touching stock so an encoding error cannot strand effects.
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        // 4) Stock effects
        let applied = effects(&decided)?;

        // 5) Persist
        let committed = match self.store.append(uncommitted, expected) {
            Ok(committed) => committed,
            Err(source) if applied > 0 => {
                error!(
                    aggregate_id = %aggregate_id,
                    applied,
                    error = %source,
                    "stock movements applied but transition not recorded"
                );
                return Err(DispatchError::UnrecordedEffects { applied, source });
            }
            Err(source) => return Err(source.into()),
        };

        for ev in &decided {
            aggregate.apply(ev);
        }
        info!(
            events = ?committed.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
            version = stream_version(&committed),
            "request transition committed"
        );

        // 6) Publish
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "failed to publish request event"
                );
            }
        }

        Ok(Outcome {
            state: aggregate,
            committed,
        })
    }

    /// Rehydrate an aggregate without dispatching. `None` if it has no events.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(Some(aggregate))
    }

    /// Every aggregate of one type, rehydrated.
    pub fn load_all<A>(
        &self,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let mut out = Vec::new();
        for id in self.store.aggregate_ids(aggregate_type)? {
            if let Some(aggregate) = self.load(id, &make_aggregate)? {
                out.push(aggregate);
            }
        }
        Ok(out)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::InvariantViolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::Utc;
    use retailerp_core::{ActorId, AggregateRoot, ItemVariantId, LocationId};
    use retailerp_events::InMemoryEventBus;
    use retailerp_sales::{RecordSale, Sale, SaleCommand, SaleId, SaleKind};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn record(sale_id: SaleId, quantity: i64) -> SaleCommand {
        SaleCommand::RecordSale(RecordSale {
            sale_id,
            kind: SaleKind::Sale,
            location_id: LocationId::new(),
            item_variant_id: ItemVariantId::new(),
            quantity,
            original_sale: None,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_publishes_and_returns_new_state() {
        let dispatcher = dispatcher();
        let sub = dispatcher.bus().subscribe();
        let sale_id = SaleId::new(AggregateId::new());

        let outcome = dispatcher
            .dispatch(sale_id.0, "sales.sale", record(sale_id, 3), |id| Sale::empty(SaleId::new(id)))
            .unwrap();

        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.state.version(), 1);
        assert_eq!(outcome.state.quantity(), 3);
        let published = sub.try_recv().unwrap();
        assert_eq!(published.event_type(), "sales.sale.recorded");
    }

    #[test]
    fn rejected_command_appends_nothing_and_skips_effects() {
        let dispatcher = dispatcher();
        let sale_id = SaleId::new(AggregateId::new());
        dispatcher
            .dispatch(sale_id.0, "sales.sale", record(sale_id, 3), |id| Sale::empty(SaleId::new(id)))
            .unwrap();

        let mut effects_ran = false;
        let err = dispatcher
            .dispatch_with_effects(
                sale_id.0,
                "sales.sale",
                record(sale_id, 3),
                |id| Sale::empty(SaleId::new(id)),
                |_| {
                    effects_ran = true;
                    Ok(0)
                },
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::Conflict(_)));
        assert!(!effects_ran);
        assert_eq!(dispatcher.store().load_stream(sale_id.0).unwrap().len(), 1);
    }

    #[test]
    fn failed_effects_leave_the_stream_unchanged() {
        let dispatcher = dispatcher();
        let sale_id = SaleId::new(AggregateId::new());

        let err = dispatcher
            .dispatch_with_effects(
                sale_id.0,
                "sales.sale",
                record(sale_id, 3),
                |id| Sale::empty(SaleId::new(id)),
                |_| Err(DispatchError::Storage("disk full".to_string())),
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::Storage(_)));
        assert!(dispatcher.store().load_stream(sale_id.0).unwrap().is_empty());
        assert!(
            dispatcher
                .load(sale_id.0, |id| Sale::empty(SaleId::new(id)))
                .unwrap()
                .is_none()
        );
    }

    /// Loads from memory, refuses every append.
    struct ReadOnlyStore(InMemoryEventStore);

    impl EventStore for ReadOnlyStore {
        fn append(
            &self,
            _events: Vec<UncommittedEvent>,
            _expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            Err(EventStoreError::Storage("connection reset".to_string()))
        }

        fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.0.load_stream(aggregate_id)
        }

        fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
            self.0.aggregate_ids(aggregate_type)
        }
    }

    #[test]
    fn append_failure_after_effects_reports_unrecorded_movements() {
        let dispatcher = CommandDispatcher::new(
            ReadOnlyStore(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        );
        let sale_id = SaleId::new(AggregateId::new());

        let err = dispatcher
            .dispatch_with_effects(
                sale_id.0,
                "sales.sale",
                record(sale_id, 3),
                |id| Sale::empty(SaleId::new(id)),
                |_| Ok(2),
            )
            .unwrap_err();

        match err {
            DispatchError::UnrecordedEffects { applied, ref source } => {
                assert_eq!(applied, 2);
                assert!(matches!(source, EventStoreError::Storage(_)));
            }
            other => panic!("expected unrecorded effects, got {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn append_failure_without_effects_is_a_plain_store_error() {
        let dispatcher = CommandDispatcher::new(
            ReadOnlyStore(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        );
        let sale_id = SaleId::new(AggregateId::new());

        let err = dispatcher
            .dispatch(sale_id.0, "sales.sale", record(sale_id, 3), |id| Sale::empty(SaleId::new(id)))
            .unwrap_err();

        assert!(matches!(err, DispatchError::Store(EventStoreError::Storage(_))));
    }

    #[test]
    fn lock_timeout_maps_to_retryable_concurrency_timeout() {
        let err: DispatchError = LockError::Timeout {
            key: "k".to_string(),
            waited: std::time::Duration::from_millis(5),
        }
        .into();
        assert!(matches!(err, DispatchError::ConcurrencyTimeout(_)));
        assert!(err.is_retryable());
    }
}
