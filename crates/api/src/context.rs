use retailerp_core::ActorId;

/// Who a request acts on behalf of.
///
/// Identity is supplied by the caller (`x-actor-id`); verifying it is the
/// job of whatever sits in front of this service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: ActorId,
}

impl ActorContext {
    pub fn new(actor_id: ActorId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }
}
