use dam_core::{ChannelElement, EnqueueResult, Payload, VirtualTime};

use crate::channel::Channel;
use crate::inner::Peeked;

/// The consumer-side capability set of a channel, as a `dyn`-safe trait
/// object. Parameterized by the payload type at the trait level (not via a
/// generic method) so `dyn InputChannel<P>` stays a valid trait object even
/// though `P` varies across channels in a bundle.
pub trait InputChannel<P: Payload>: Send + Sync {
    fn peek(&self) -> Peeked<P>;
    fn dequeue(&self) -> Peeked<P>;
    fn next_time(&self) -> Option<VirtualTime>;
    fn is_closed(&self) -> bool;
}

/// The producer-side capability set.
pub trait OutputChannel<P: Payload>: Send + Sync {
    fn enqueue(&self, elem: ChannelElement<P>) -> EnqueueResult;
    fn is_full(&self) -> bool;
    fn next_time(&self) -> Option<VirtualTime>;
    fn close_output(&self);
}

/// A type-erased "please close yourself" handle, used by a node runtime to
/// close every output it owns during cleanup without needing to know each
/// channel's payload type.
pub trait Closeable: Send + Sync {
    fn close(&self);
}

impl<P: Payload> InputChannel<P> for Channel<P> {
    fn peek(&self) -> Peeked<P> {
        Channel::peek(self)
    }

    fn dequeue(&self) -> Peeked<P> {
        Channel::dequeue(self)
    }

    fn next_time(&self) -> Option<VirtualTime> {
        Channel::next_time(self)
    }

    fn is_closed(&self) -> bool {
        Channel::is_closed(self)
    }
}

impl<P: Payload> OutputChannel<P> for Channel<P> {
    fn enqueue(&self, elem: ChannelElement<P>) -> EnqueueResult {
        Channel::enqueue(self, elem)
    }

    fn is_full(&self) -> bool {
        Channel::is_full(self)
    }

    fn next_time(&self) -> Option<VirtualTime> {
        Channel::next_time(self)
    }

    fn close_output(&self) {
        Channel::close_output(self)
    }
}

impl<P: Payload> Closeable for Channel<P> {
    fn close(&self) {
        Channel::close_output(self)
    }
}
