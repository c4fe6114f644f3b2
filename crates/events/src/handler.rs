/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: calls `aggregate.handle(command)` to get events (pure)
/// 2. **Evolve**: applies each event via `aggregate.apply(event)`
///
/// This is primarily useful in unit tests and inline workflows; the full
/// pipeline (persistence, optimistic concurrency, publication) lives in the
/// infra `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: shopforge_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
