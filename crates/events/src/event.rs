use chrono::{DateTime, Utc};

use retailerp_core::ActorId;

/// An accepted request transition. Immutable once decided.
///
/// Every request event records who caused it; the actor travels with the
/// stored event and with the notification published for it.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<module>.<entity>.<transition>`, e.g. `restock.request.received`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the transition.
    fn occurred_at(&self) -> DateTime<Utc>;

    fn actor(&self) -> ActorId;
}
