use std::fmt::Debug;

use crate::VirtualTime;

/// The capability every token payload must provide. Opaque to the kernel
/// otherwise: a channel never interprets `P` beyond these two queries.
pub trait Payload: Debug + Clone + Send + Sync + 'static {
    /// Whether this value is well-formed for its declared type (e.g. a fixed
    /// point value within its type's representable range).
    fn validate(&self) -> bool;

    /// Size of this value in bits, for bandwidth/area accounting by callers.
    fn size_bits(&self) -> u64;
}

/// A `(time, payload)` token. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelElement<P: Payload> {
    pub time: VirtualTime,
    pub payload: P,
}

impl<P: Payload> ChannelElement<P> {
    pub fn new(time: VirtualTime, payload: P) -> Self {
        Self { time, payload }
    }
}

impl Payload for bool {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        1
    }
}

impl Payload for u64 {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        64
    }
}

impl Payload for i64 {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        64
    }
}
