use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use retailerp_core::{AggregateId, ExpectedVersion};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug)]
struct Stream {
    aggregate_type: String,
    events: Vec<StoredEvent>,
}

impl Stream {
    fn version(&self) -> u64 {
        self.events.last().map_or(0, |e| e.sequence_number)
    }
}

#[derive(Debug, Default)]
struct Streams {
    by_id: HashMap<AggregateId, Stream>,
    /// First-append order, so listings are oldest request first.
    opened: Vec<AggregateId>,
}

/// Request streams held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Streams>, EventStoreError> {
        self.streams
            .read()
            .map_err(|_| EventStoreError::Storage("event store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Streams>, EventStoreError> {
        self.streams
            .write()
            .map_err(|_| EventStoreError::Storage("event store lock poisoned".to_string()))
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&events)?;
        let Some((aggregate_id, aggregate_type)) = events
            .first()
            .map(|e| (e.aggregate_id, e.aggregate_type.clone()))
        else {
            return Ok(vec![]);
        };

        let mut streams = self.write()?;
        let current = match streams.by_id.get(&aggregate_id) {
            Some(stream) if stream.aggregate_type != aggregate_type => {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream {aggregate_id} is '{}', not '{aggregate_type}'",
                    stream.aggregate_type
                )));
            }
            Some(stream) => stream.version(),
            None => 0,
        };
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {aggregate_id}: expected {expected_version:?}, at {current}"
            )));
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, seq)| e.into_stored(seq))
            .collect();

        if !streams.by_id.contains_key(&aggregate_id) {
            streams.opened.push(aggregate_id);
        }
        streams
            .by_id
            .entry(aggregate_id)
            .or_insert_with(|| Stream {
                aggregate_type,
                events: Vec::new(),
            })
            .events
            .extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        Ok(self
            .read()?
            .by_id
            .get(&aggregate_id)
            .map(|s| s.events.clone())
            .unwrap_or_default())
    }

    fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        let streams = self.read()?;
        Ok(streams
            .opened
            .iter()
            .filter(|id| {
                streams
                    .by_id
                    .get(*id)
                    .is_some_and(|s| s.aggregate_type == aggregate_type)
            })
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use retailerp_core::ActorId;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "restock.request.approved".to_string(),
            event_version: 1,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn sequence_numbers_continue_across_batches() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(id, "restock.request"), event(id, "restock.request")], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store
            .append(vec![event(id, "restock.request")], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn racing_writer_with_a_stale_version_is_refused() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "shipping.shipment")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "shipping.shipment")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn a_stream_cannot_change_type() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "shipping.shipment")], ExpectedVersion::Any)
            .unwrap();

        let err = store
            .append(vec![event(id, "sales.sale")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn listing_is_per_type_oldest_first() {
        let store = InMemoryEventStore::new();
        let (a, b, c) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        for (id, ty) in [(a, "production.plan"), (b, "sales.sale"), (c, "production.plan")] {
            store.append(vec![event(id, ty)], ExpectedVersion::Exact(0)).unwrap();
        }
        store
            .append(vec![event(a, "production.plan")], ExpectedVersion::Exact(1))
            .unwrap();

        assert_eq!(store.aggregate_ids("production.plan").unwrap(), vec![a, c]);
        assert_eq!(store.aggregate_ids("sales.sale").unwrap(), vec![b]);
        assert!(store.load_stream(AggregateId::new()).unwrap().is_empty());
    }
}
