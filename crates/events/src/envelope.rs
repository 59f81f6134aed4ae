use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use retailerp_core::{ActorId, AggregateId};

/// Where a committed event sits: which request stream and at what position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// 1-based, gapless within one stream.
    pub sequence_number: u64,
}

/// A committed request event as seen by notification consumers.
///
/// Delivery is at-least-once, so the same envelope may arrive twice.
/// Consumers keep the last sequence number seen per request and skip
/// anything at or below it (see [`EventEnvelope::is_after`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    #[serde(flatten)]
    position: StreamPosition,
    event_type: String,
    actor: ActorId,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        position: StreamPosition,
        event_type: impl Into<String>,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            position,
            event_type: event_type.into(),
            actor,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn position(&self) -> &StreamPosition {
        &self.position
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.position.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.position.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.position.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Who performed the transition.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// True when this envelope is newer than `last_seen` for its stream.
    pub fn is_after(&self, last_seen: Option<u64>) -> bool {
        last_seen.is_none_or(|seen| self.position.sequence_number > seen)
    }
}
