//! Event-sourced request aggregates.

/// Identity and stream revision of a request aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Events applied so far. Zero for a request that does not exist yet.
    fn version(&self) -> u64;
}

/// Revision a writer expects a stream to be at when it appends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }
}

/// A request state machine.
///
/// `handle` checks a command against the current status and returns the
/// events of the accepted transition without touching `self`. `apply` folds
/// one event into the state and advances `version` by one.
///
/// Stock movements are data on the events. Executing them is the caller's
/// job, so replaying history never moves stock twice.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
