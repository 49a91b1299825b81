use std::sync::Mutex;

use dam_channel::{Closeable, TimeView};
use dam_core::{Payload, VirtualTime};

use crate::clock::Clock;

/// What a leaf node body (`run_func`) gets handed: its own clock and a place
/// to register the output channels that must be closed on cleanup.
///
/// This is the "stable handles + time primitives" half of §4.2; the
/// "automatic cleanup" half is [`NodeRuntime::finish`], called once by the
/// owning [`crate::context::LeafContext`] right after `run_func` returns.
pub struct NodeRuntime {
    name: String,
    clock: Clock,
    outputs: Mutex<Vec<Box<dyn Closeable>>>,
}

impl NodeRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock: Clock::new(),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> VirtualTime {
        self.clock.current()
    }

    pub fn incr_cycles(&self, delta: u64) {
        self.clock.incr_cycles(delta);
    }

    pub fn advance_to(&self, t: VirtualTime) {
        self.clock.advance_to(t);
    }

    pub fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        self.clock.block_until(deadline)
    }

    /// Registers a channel this node produces on, so `finish` closes it.
    /// `Channel<P>` is cheap to clone (an `Arc` handle), so the registered
    /// copy and the one `run_func` writes to share the same underlying state.
    pub fn register_output<P: Payload>(&self, chan: &dam_channel::Channel<P>) {
        self.outputs.lock().unwrap().push(Box::new(chan.clone()));
    }

    /// Cleanup ordering from §4.2: wake every `block_until` waiter with
    /// Infinity *before* closing outputs, so a consumer never observes
    /// `Closed` while still believing the producer might advance further.
    pub fn finish(&self) {
        self.clock.set_infinite();
        for out in self.outputs.lock().unwrap().iter() {
            out.close();
        }
    }
}

impl TimeView for NodeRuntime {
    fn tick_lower_bound(&self) -> VirtualTime {
        self.clock.tick_lower_bound()
    }

    fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        self.clock.block_until(deadline)
    }
}

#[cfg(test)]
mod tests {
    use dam_channel::Channel;
    use dam_core::ChannelElement;

    use super::*;

    #[test]
    fn finish_sets_infinite_before_closing_outputs() {
        let node = NodeRuntime::new("producer");
        let chan: Channel<u64> = Channel::new(4);
        node.register_output(&chan);
        let _ = chan.enqueue(ChannelElement::new(VirtualTime::ZERO, 1));

        node.finish();

        assert!(node.current().is_infinite());
        assert!(chan.is_closed());
    }
}
