use thiserror::Error;

/// Fatal kernel errors. These are never returned through `Result` on the hot
/// path — user-facing `run_func` bodies are infallible closures, mirroring the
/// original simulator's choice to surface them as unwinds rather than threading
/// a `Result` through every tick. See [`fatal`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DamError {
    #[error("enqueue on a channel whose output side is already closed")]
    ChannelClosed,

    #[error("send_recv_delta left the range [0, {capacity}]: got {delta}")]
    CapacityInvariant { capacity: usize, delta: i64 },

    #[error("EntryHistory write out of order: new time {new} <= last write time {last}")]
    HistoryNotMonotonic { last: String, new: String },

    #[error("context already had a parent set, cannot set another")]
    DoubleParent,

    #[error("scatter addr/data width mismatch: {addr_width} vs {data_width}")]
    WidthMismatch { addr_width: usize, data_width: usize },

    #[error("out-of-bounds address {index} (capacity {capacity}) under NO_MOD_ADDRESS policy")]
    OutOfBounds { index: i64, capacity: i64 },

    #[error("read at time {time} before any write, and USE_DEFAULT_VALUE is not set")]
    ReadBeforeWrite { time: String },

    #[error("payload did not match the expected variant: {expected}")]
    PayloadMismatch { expected: &'static str },
}

/// Logs the error at `error` level and unwinds the current thread with it as
/// the panic payload. The owning composite context's `run` re-raises the first
/// such panic it observes after joining all child threads (see
/// `dam_runtime::context::CompositeContext::run`).
#[track_caller]
pub fn fatal(err: DamError) -> ! {
    tracing::error!(error = %err, "fatal invariant violation");
    std::panic::panic_any(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_unwinds_with_the_error_as_payload() {
        let result = std::panic::catch_unwind(|| {
            fatal(DamError::ChannelClosed);
        });
        let payload = result.expect_err("fatal must panic");
        let err = payload
            .downcast_ref::<DamError>()
            .expect("panic payload should be a DamError");
        assert_eq!(*err, DamError::ChannelClosed);
    }
}
