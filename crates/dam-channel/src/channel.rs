use std::sync::{Arc, Mutex, OnceLock, Weak};

use dam_core::{ChannelElement, EnqueueResult, Payload, VirtualTime};

use crate::inner::{ChannelInner, PeekAttempt, Peeked};
use crate::view::TimeView;

struct Shared<P: Payload> {
    inner: Mutex<ChannelInner<P>>,
    src: OnceLock<Weak<dyn TimeView>>,
    dst: OnceLock<Weak<dyn TimeView>>,
}

/// A timestamped, back-pressured, bounded FIFO between exactly one producer
/// and one consumer.
///
/// An `Arc`-shared handle around a `Mutex`-protected unlocked core
/// ([`ChannelInner`]). Nothing here waits on a `Condvar` of its own — all
/// blocking is delegated to the endpoints' own clocks through
/// [`TimeView::block_until`], since a channel's "wake up" condition is
/// always "some node's virtual time advanced," never an event local to the
/// channel itself.
pub struct Channel<P: Payload> {
    shared: Arc<Shared<P>>,
}

impl<P: Payload> Clone for Channel<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Payload> Channel<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(ChannelInner::new(capacity)),
                src: OnceLock::new(),
                dst: OnceLock::new(),
            }),
        }
    }

    /// Wires the producer's clock view. Idempotent-on-first-call only: a
    /// channel's endpoints are fixed at graph-construction time, before any
    /// context's `Run` begins.
    pub fn connect_source(&self, view: Weak<dyn TimeView>) {
        let _ = self.shared.src.set(view);
    }

    /// Wires the consumer's clock view.
    pub fn connect_sink(&self, view: Weak<dyn TimeView>) {
        let _ = self.shared.dst.set(view);
    }

    pub fn capacity(&self) -> usize {
        self.shared.inner.lock().unwrap().capacity()
    }

    fn src_view(&self) -> Option<Arc<dyn TimeView>> {
        self.shared.src.get().and_then(Weak::upgrade)
    }

    fn dst_view(&self) -> Option<Arc<dyn TimeView>> {
        self.shared.dst.get().and_then(Weak::upgrade)
    }

    /// The `is_full` algorithm from §4.1: short-circuit on a cached
    /// `next_time` hint, else block the consumer up to the producer's own
    /// time and refresh the ack FIFO.
    pub fn is_full(&self) -> bool {
        let producer_time = self
            .src_view()
            .map(|v| v.tick_lower_bound())
            .unwrap_or(VirtualTime::ZERO);

        {
            let guard = self.shared.inner.lock().unwrap();
            if let Some(next_time) = guard.next_time() {
                if next_time > producer_time {
                    return true;
                }
            }
        }

        if let Some(dst) = self.dst_view() {
            dst.block_until(producer_time);
        }

        self.shared
            .inner
            .lock()
            .unwrap()
            .refresh_and_check_full(producer_time)
    }

    /// Hint for the next virtual time at which this channel might accept a
    /// send, if known.
    pub fn next_time(&self) -> Option<VirtualTime> {
        self.shared.inner.lock().unwrap().next_time()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().unwrap().is_closed()
    }

    /// Producer side. Never blocks: a full channel returns `Full` with a
    /// best-effort retry hint and leaves suspension to the caller (the
    /// `advance_until_can_enqueue` bundle primitive in `dam-runtime`).
    pub fn enqueue(&self, elem: ChannelElement<P>) -> EnqueueResult {
        if self.is_full() {
            return EnqueueResult::Full {
                next_time: self.next_time(),
            };
        }
        self.shared.inner.lock().unwrap().enqueue(elem);
        EnqueueResult::Accepted
    }

    pub fn close_output(&self) {
        self.shared.inner.lock().unwrap().close_output();
    }

    fn consumer_time(&self) -> VirtualTime {
        self.dst_view()
            .map(|v| v.tick_lower_bound())
            .unwrap_or(VirtualTime::ZERO)
    }

    fn producer_time(&self) -> VirtualTime {
        self.src_view()
            .map(|v| v.tick_lower_bound())
            .unwrap_or(VirtualTime::ZERO)
    }

    /// Consumer side, non-destructive. Blocks the producer forward (via its
    /// `TimeView`) when the consumer is ahead of everything the producer has
    /// committed to so far.
    pub fn peek(&self) -> Peeked<P> {
        loop {
            let consumer_time = self.consumer_time();
            let producer_time = self.producer_time();
            let attempt = self.shared.inner.lock().unwrap().peek(consumer_time, producer_time);
            match attempt {
                PeekAttempt::Resolved(peeked) => return peeked,
                PeekAttempt::NeedsProducerAdvance { target } => match self.src_view() {
                    Some(src) => {
                        src.block_until(target);
                    }
                    None => return Peeked::nothing_at(target),
                },
            }
        }
    }

    /// Consumer side, destructive: pops the head on `Ok` and posts the ack
    /// that the producer's `is_full` will eventually observe.
    pub fn dequeue(&self) -> Peeked<P> {
        loop {
            let consumer_time = self.consumer_time();
            let producer_time = self.producer_time();
            let attempt = self
                .shared
                .inner
                .lock()
                .unwrap()
                .dequeue(consumer_time, producer_time);
            match attempt {
                PeekAttempt::Resolved(peeked) => return peeked,
                PeekAttempt::NeedsProducerAdvance { target } => match self.src_view() {
                    Some(src) => {
                        src.block_until(target);
                    }
                    None => return Peeked::nothing_at(target),
                },
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use dam_core::Status;

    use super::*;

    struct FixedClock(StdMutex<VirtualTime>);

    impl TimeView for FixedClock {
        fn tick_lower_bound(&self) -> VirtualTime {
            *self.0.lock().unwrap()
        }

        fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
            let mut guard = self.0.lock().unwrap();
            if *guard < deadline {
                *guard = deadline;
            }
            *guard
        }
    }

    #[test]
    fn unconnected_channel_enqueues_freely_up_to_capacity() {
        let chan: Channel<u64> = Channel::new(2);
        assert_eq!(
            chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 1)),
            EnqueueResult::Accepted
        );
        assert_eq!(
            chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 2)),
            EnqueueResult::Accepted
        );
        assert!(matches!(
            chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 3)),
            EnqueueResult::Full { .. }
        ));
    }

    #[test]
    fn dequeue_unblocks_capacity_via_ack() {
        let producer = Arc::new(FixedClock(StdMutex::new(VirtualTime::ZERO)));
        let consumer = Arc::new(FixedClock(StdMutex::new(VirtualTime::ZERO)));
        let chan: Channel<u64> = Channel::new(1);
        chan.connect_source(Arc::downgrade(&producer) as Weak<dyn TimeView>);
        chan.connect_sink(Arc::downgrade(&consumer) as Weak<dyn TimeView>);

        assert_eq!(
            chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 1)),
            EnqueueResult::Accepted
        );
        assert!(chan.is_full());

        let peeked = chan.dequeue();
        assert_eq!(peeked.status, Status::Ok);
        assert_eq!(peeked.payload, Some(1));
        assert!(!chan.is_full());
    }
}
