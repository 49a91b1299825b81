use dam_channel::{InputChannel, OutputChannel, Peeked};
use dam_core::{ChannelElement, Payload, Status, VirtualTime};

use crate::node::NodeRuntime;

/// §4.4: waits until every one of `channels` is peekable (`Ok` or `Closed`),
/// advancing `node`'s clock as it goes, then dequeues all of them at one
/// consistent node time. Never returns with any entry still `Nothing`.
pub fn dequeue_input_channels<P: Payload>(
    node: &NodeRuntime,
    channels: &[&dyn InputChannel<P>],
) -> Vec<Peeked<P>> {
    for chan in channels {
        loop {
            let peeked = chan.peek();
            node.advance_to(peeked.time);
            if peeked.status != Status::Nothing {
                break;
            }
            node.incr_cycles(1);
        }
    }
    channels.iter().map(|chan| chan.dequeue()).collect()
}

/// §4.4: given a list of channels and a list of bundles (each a set of
/// indices into `channels`), finds the first bundle (in index order) whose
/// every channel is simultaneously `Ok` at or before `node`'s current time,
/// and dequeues exactly that bundle. Returns `None` ("`(-1, ∅)`" in the
/// original formulation) once every channel's next-possible time is
/// `Infinite` — no bundle can ever become ready again.
pub fn dequeue_input_bundles<P: Payload>(
    node: &NodeRuntime,
    channels: &[&dyn InputChannel<P>],
    bundles: &[Vec<usize>],
) -> Option<(usize, Vec<ChannelElement<P>>)> {
    loop {
        let current = node.current();
        let peeks: Vec<Peeked<P>> = channels.iter().map(|c| c.peek()).collect();

        for (bundle_idx, bundle) in bundles.iter().enumerate() {
            let ready = bundle
                .iter()
                .all(|&idx| peeks[idx].status == Status::Ok && peeks[idx].time <= current);
            if ready {
                let elems = bundle
                    .iter()
                    .map(|&idx| {
                        channels[idx]
                            .dequeue()
                            .into_element()
                            .expect("bundle channel was confirmed ready")
                    })
                    .collect();
                return Some((bundle_idx, elems));
            }
        }

        let target = bundles
            .iter()
            .map(|bundle| {
                bundle
                    .iter()
                    .map(|&idx| {
                        let peeked = &peeks[idx];
                        if peeked.status == Status::Nothing {
                            peeked.time.saturating_add_ticks(1)
                        } else {
                            peeked.time
                        }
                    })
                    .max()
                    .unwrap_or_else(VirtualTime::infinite)
            })
            .min();

        match target {
            None => return None,
            Some(t) if t.is_infinite() => return None,
            Some(t) => node.advance_to(t),
        }
    }
}

/// §4.4: loops over `outputs`, advancing `node`'s clock past whichever ones
/// are full, until every one of them would accept an enqueue.
pub fn advance_until_can_enqueue<P: Payload>(node: &NodeRuntime, outputs: &[&dyn OutputChannel<P>]) {
    loop {
        let mut all_ready = true;
        for out in outputs {
            if out.is_full() {
                all_ready = false;
                match out.next_time() {
                    Some(t) => node.advance_to(t),
                    None => node.incr_cycles(1),
                }
            }
        }
        if all_ready {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use dam_channel::Channel;

    use super::*;

    #[test]
    fn dequeue_input_channels_collects_all_tokens_at_one_time() {
        use std::sync::{Arc, Weak};

        let node = Arc::new(NodeRuntime::new("consumer"));
        let a: Channel<u64> = Channel::new(4);
        let b: Channel<u64> = Channel::new(4);
        a.connect_sink(Arc::downgrade(&node) as Weak<dyn dam_channel::TimeView>);
        b.connect_sink(Arc::downgrade(&node) as Weak<dyn dam_channel::TimeView>);
        let _ = a.enqueue(ChannelElement::new(VirtualTime::new(3), 10));
        let _ = b.enqueue(ChannelElement::new(VirtualTime::new(5), 20));

        let results = dequeue_input_channels(&node, &[&a, &b]);
        assert_eq!(results[0].payload, Some(10));
        assert_eq!(results[1].payload, Some(20));
        assert!(node.current() >= VirtualTime::new(5));
    }

    #[test]
    fn dequeue_input_bundles_picks_first_ready_in_index_order() {
        use std::sync::{Arc, Weak};

        let node = Arc::new(NodeRuntime::new("consumer"));
        let a: Channel<u64> = Channel::new(4);
        let b: Channel<u64> = Channel::new(4);
        a.connect_sink(Arc::downgrade(&node) as Weak<dyn dam_channel::TimeView>);
        b.connect_sink(Arc::downgrade(&node) as Weak<dyn dam_channel::TimeView>);
        let _ = b.enqueue(ChannelElement::new(VirtualTime::ZERO, 99));
        let channels: [&dyn InputChannel<u64>; 2] = [&a, &b];
        let bundles = vec![vec![0usize], vec![1usize]];

        let (idx, elems) = dequeue_input_bundles(&node, &channels, &bundles).expect("bundle 1 ready");
        assert_eq!(idx, 1);
        assert_eq!(elems[0].payload, 99);
    }

    #[test]
    fn dequeue_input_bundles_returns_none_once_all_closed() {
        let node = NodeRuntime::new("consumer");
        let a: Channel<u64> = Channel::new(4);
        a.close_output();
        let channels: [&dyn InputChannel<u64>; 1] = [&a];
        let bundles = vec![vec![0usize]];
        assert!(dequeue_input_bundles(&node, &channels, &bundles).is_none());
    }

    #[test]
    fn advance_until_can_enqueue_waits_for_consumer_ack() {
        use std::sync::{Arc, Weak};

        let producer = Arc::new(NodeRuntime::new("producer"));
        let consumer = Arc::new(NodeRuntime::new("consumer"));
        let chan: Channel<u64> = Channel::new(1);
        chan.connect_source(Arc::downgrade(&producer) as Weak<dyn dam_channel::TimeView>);
        chan.connect_sink(Arc::downgrade(&consumer) as Weak<dyn dam_channel::TimeView>);

        let _ = chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 1));
        assert!(chan.is_full());

        let outputs: [&dyn OutputChannel<u64>; 1] = [&chan];
        let consumer_for_thread = Arc::clone(&consumer);
        let chan_for_thread = chan.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            // Pin the consumer far ahead so the producer's subsequent
            // `next_time` hint resolves in a single jump rather than racing
            // a second round of `block_until` against this one-shot thread.
            consumer_for_thread.advance_to(VirtualTime::new(1_000_000));
            let _ = chan_for_thread.dequeue();
        });
        advance_until_can_enqueue(&producer, &outputs);
        handle.join().unwrap();
        assert!(!chan.is_full());
    }
}
