use retailerp_core::Aggregate;

/// Run one command against an aggregate in memory: decide, then evolve.
///
/// Nothing is persisted and no stock moves. State-machine tests use this to
/// walk a request through its statuses.
pub fn execute<A: Aggregate>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error> {
    let decided = aggregate.handle(command)?;
    decided.iter().for_each(|ev| aggregate.apply(ev));
    Ok(decided)
}
