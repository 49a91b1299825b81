use std::sync::{Arc, Weak};

use dam_channel::{Channel, InputChannel, OutputChannel, TimeView};
use dam_core::{ChannelElement, Payload, Status};

use crate::bundle::{advance_until_can_enqueue, dequeue_input_channels};
use crate::context::LeafContext;
use crate::node::NodeRuntime;

/// Builds the one built-in network primitive (§6): an "ideal" point-to-point
/// link that forwards every token from `input` to `output`, stamping it one
/// virtual tick later.
///
/// This is just another leaf node — wired and scheduled the same way as any
/// user context, so its thread joins and its output closes through the same
/// `Context`/`NodeRuntime` lifecycle as the rest of the graph, with no
/// separate link-lifetime bookkeeping.
pub fn ideal_link<P: Payload>(name: impl Into<String>, input: Channel<P>, output: Channel<P>) -> LeafContext {
    let body_input = input.clone();
    let body_output = output.clone();

    let leaf = LeafContext::new(name, move |node: &NodeRuntime| loop {
        let inputs: [&dyn InputChannel<P>; 1] = [&body_input];
        let peeked = &dequeue_input_channels(node, &inputs)[0];
        match peeked.status {
            Status::Ok => {
                let payload = peeked
                    .payload
                    .clone()
                    .expect("Ok peek always carries a payload");
                let elem = ChannelElement::new(peeked.time.saturating_add_ticks(1), payload);
                let outs: [&dyn OutputChannel<P>; 1] = [&body_output];
                advance_until_can_enqueue(node, &outs);
                let _ = body_output.enqueue(elem);
            }
            Status::Closed => return,
            Status::Nothing => unreachable!("dequeue_input_channels never leaves an entry Nothing"),
        }
    });

    let runtime = leaf.runtime();
    let view: Weak<dyn TimeView> = Arc::downgrade(&runtime) as Weak<dyn TimeView>;
    input.connect_sink(view.clone());
    output.connect_source(view);
    runtime.register_output(&output);
    leaf
}

#[cfg(test)]
mod tests {
    use dam_core::VirtualTime;

    use super::*;
    use crate::context::Context;

    #[test]
    fn ideal_link_stamps_one_tick_later_and_closes_on_drain() {
        let input: Channel<u64> = Channel::new(4);
        let output: Channel<u64> = Channel::new(4);

        let link = ideal_link("link", input.clone(), output.clone());

        // Stand in for a downstream consumer already far ahead in virtual
        // time, so this test's direct `output.dequeue()` calls resolve `Ok`
        // instead of `Nothing`.
        let sink = Arc::new(NodeRuntime::new("sink"));
        sink.advance_to(VirtualTime::new(100));
        output.connect_sink(Arc::downgrade(&sink) as Weak<dyn TimeView>);

        let _ = input.enqueue(ChannelElement::new(VirtualTime::new(3), 7));
        input.close_output();

        link.run();

        let first = output.dequeue();
        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.payload, Some(7));
        assert_eq!(first.time, VirtualTime::new(4));

        let second = output.dequeue();
        assert_eq!(second.status, Status::Closed);
    }
}
