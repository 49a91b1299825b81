use std::collections::VecDeque;

use dam_core::{fatal, ChannelElement, DamError, Payload, Status, VirtualTime};

/// The outcome of a `peek`/`dequeue` attempt that already reached a status the
/// caller can observe.
#[derive(Debug, Clone)]
pub struct Peeked<P: Payload> {
    pub time: VirtualTime,
    pub status: Status,
    pub payload: Option<P>,
}

impl<P: Payload> Peeked<P> {
    fn ok(elem: &ChannelElement<P>) -> Self {
        Peeked {
            time: elem.time,
            status: Status::Ok,
            payload: Some(elem.payload.clone()),
        }
    }

    fn nothing(time: VirtualTime) -> Self {
        Peeked {
            time,
            status: Status::Nothing,
            payload: None,
        }
    }

    /// Public constructor for callers (the `Channel` wrapper) that need to
    /// report "nothing yet" when there is no producer wired to advance.
    pub fn nothing_at(time: VirtualTime) -> Self {
        Self::nothing(time)
    }

    fn closed() -> Self {
        Peeked {
            time: VirtualTime::infinite(),
            status: Status::Closed,
            payload: None,
        }
    }

    pub fn into_element(self) -> Option<ChannelElement<P>> {
        let payload = self.payload?;
        Some(ChannelElement::new(self.time, payload))
    }
}

/// A `peek`/`dequeue` either resolves to a status the caller can act on, or
/// reports that the consumer is ahead of a producer that simply hasn't caught
/// up yet — in which case the caller (the `Channel` wrapper, one layer up)
/// must block the producer to `target` and retry.
#[derive(Debug)]
pub enum PeekAttempt<P: Payload> {
    Resolved(Peeked<P>),
    NeedsProducerAdvance { target: VirtualTime },
}

/// The unlocked, single-threaded core of a channel: a bounded FIFO of tokens
/// plus the reverse ack FIFO that drives time reconciliation (§4.1). No
/// method here blocks or takes a lock — the blocking wrapper lives one layer
/// up, in [`crate::Channel`].
pub struct ChannelInner<P: Payload> {
    capacity: usize,
    underlying: VecDeque<ChannelElement<P>>,
    resp: VecDeque<VirtualTime>,
    send_recv_delta: usize,
    next_time: Option<VirtualTime>,
    peek_head: Option<Peeked<P>>,
    closed: bool,
}

impl<P: Payload> ChannelInner<P> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be >= 1");
        Self {
            capacity,
            underlying: VecDeque::new(),
            resp: VecDeque::new(),
            send_recv_delta: 0,
            next_time: None,
            peek_head: None,
            closed: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn next_time(&self) -> Option<VirtualTime> {
        self.next_time
    }

    pub fn len(&self) -> usize {
        self.underlying.len()
    }

    pub fn is_empty(&self) -> bool {
        self.underlying.is_empty()
    }

    /// Step 1+3+4 of the `is_full` algorithm (§4.1): the step-2 block on the
    /// consumer's clock happens in the wrapper, outside this lock.
    pub fn refresh_and_check_full(&mut self, producer_time: VirtualTime) -> bool {
        if let Some(nt) = self.next_time {
            if nt > producer_time {
                return true;
            }
        }
        self.next_time = None;
        while let Some(&ack) = self.resp.front() {
            if ack <= producer_time {
                self.resp.pop_front();
                self.send_recv_delta -= 1;
            } else {
                self.next_time = Some(ack);
                break;
            }
        }
        debug_assert!(self.send_recv_delta <= self.capacity);
        self.send_recv_delta == self.capacity
    }

    /// Assumes the caller already confirmed (via `refresh_and_check_full`)
    /// that there is room; this never blocks on fullness itself.
    pub fn enqueue(&mut self, elem: ChannelElement<P>) {
        if self.closed {
            fatal(DamError::ChannelClosed);
        }
        if self.send_recv_delta >= self.capacity {
            fatal(DamError::CapacityInvariant {
                capacity: self.capacity,
                delta: self.send_recv_delta as i64 + 1,
            });
        }
        self.underlying.push_back(elem);
        self.send_recv_delta += 1;
    }

    pub fn close_output(&mut self) {
        self.closed = true;
    }

    fn compute_peek(&self, consumer_time: VirtualTime, producer_time: VirtualTime) -> PeekAttempt<P> {
        if let Some(elem) = self.underlying.front() {
            return if elem.time <= consumer_time {
                PeekAttempt::Resolved(Peeked::ok(elem))
            } else {
                // A real future token is already queued; its own timestamp is
                // a tighter hint than the producer's current clock (the
                // producer can only be at or ahead of it).
                PeekAttempt::Resolved(Peeked::nothing(elem.time))
            };
        }
        if self.closed {
            return PeekAttempt::Resolved(Peeked::closed());
        }
        if producer_time >= consumer_time {
            PeekAttempt::Resolved(Peeked::nothing(producer_time))
        } else {
            PeekAttempt::NeedsProducerAdvance { target: consumer_time }
        }
    }

    /// Idempotent within a turn: repeated calls with no intervening
    /// `dequeue` return the identical cached result.
    pub fn peek(&mut self, consumer_time: VirtualTime, producer_time: VirtualTime) -> PeekAttempt<P> {
        if let Some(cached) = &self.peek_head {
            return PeekAttempt::Resolved(cached.clone());
        }
        let attempt = self.compute_peek(consumer_time, producer_time);
        if let PeekAttempt::Resolved(ref resolved) = attempt {
            self.peek_head = Some(resolved.clone());
        }
        attempt
    }

    pub fn dequeue(&mut self, consumer_time: VirtualTime, producer_time: VirtualTime) -> PeekAttempt<P> {
        match self.peek(consumer_time, producer_time) {
            PeekAttempt::Resolved(peeked) => {
                self.peek_head = None;
                if peeked.status == Status::Ok {
                    let elem = self.underlying.pop_front().expect("peek reported Ok");
                    let ack_time = elem.time.max(consumer_time);
                    self.resp.push_back(ack_time);
                }
                PeekAttempt::Resolved(peeked)
            }
            needs_advance => needs_advance,
        }
    }
}
