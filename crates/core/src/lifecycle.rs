//! Status machine contract shared by the request workflows.

use crate::error::{DomainError, DomainResult};

/// A closed status enum with an explicit transition table.
///
/// Implementors list the allowed successor states per status; everything not
/// listed is rejected with [`DomainError::InvalidTransition`] naming the
/// offending pair. Terminal states have no successors.
pub trait StatusMachine: Copy + Eq + core::fmt::Debug + core::fmt::Display + 'static {
    /// Entity name used in transition errors (e.g. "shipment").
    const ENTITY: &'static str;

    fn allowed_next(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }

    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    fn ensure_transition(self, next: Self) -> DomainResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(Self::ENTITY, self, next))
        }
    }
}
