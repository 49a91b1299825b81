use dam_core::VirtualTime;

/// The read-only view of a node's clock that a channel needs in order to
/// reconcile time across the producer/consumer boundary.
///
/// A channel never gets to mutate a node's clock; it only ever reads it or
/// blocks on it. Implementations (leaf node runtimes, composite contexts)
/// live in `dam-runtime`, one layer above this crate.
pub trait TimeView: Send + Sync {
    /// A snapshot of the lower bound on this context's current virtual time.
    fn tick_lower_bound(&self) -> VirtualTime;

    /// Blocks the calling thread until this context's clock has reached at
    /// least `deadline`, then returns the clock value observed. A context
    /// that has already finished (clock at `Infinite`) returns immediately.
    fn block_until(&self, deadline: VirtualTime) -> VirtualTime;
}
