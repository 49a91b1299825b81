/// Result of a non-blocking peek or dequeue attempt on a channel.
///
/// These are ordinary control flow, not errors: a caller that sees `Nothing` is
/// expected to advance its clock and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A token was available at or before the caller's current time.
    Ok,
    /// Nothing is available yet, but the producer hasn't fallen behind either.
    Nothing,
    /// The channel is drained and its output side has been closed. Terminal.
    Closed,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Status::Closed)
    }
}

/// Result of an `enqueue` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Accepted,
    /// The channel was full; `next_time` is a best-effort hint for when a slot
    /// is expected to free, if the channel was able to compute one.
    Full { next_time: Option<crate::VirtualTime> },
}

impl EnqueueResult {
    pub fn is_accepted(self) -> bool {
        matches!(self, EnqueueResult::Accepted)
    }
}
