//! ADMM basis pursuit: a minimal stub (§10.4). There is no real linear
//! algebra here, just the iteration structure: two alternating update nodes
//! trading a token once per ADMM round, with no computation of substance.

use std::sync::{Arc, Weak};

use clap::Parser;
use dam_channel::{Channel, InputChannel, OutputChannel, TimeView};
use dam_core::{ChannelElement, Payload, VirtualTime};
use dam_runtime::{advance_until_can_enqueue, dequeue_input_channels, CompositeContext, Context, LeafContext, NodeRuntime};

#[derive(Debug, Clone, Copy, Parser)]
pub struct BasisPursuitConfig {
    #[arg(long, default_value_t = 50)]
    pub iterations: u64,
}

impl Default for BasisPursuitConfig {
    fn default() -> Self {
        Self { iterations: 50 }
    }
}

/// Placeholder payload standing in for a matrix update: real size is
/// unknowable without the linear algebra this stub doesn't perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round(pub u64);

impl Payload for Round {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        64
    }
}

fn build_updater(name: impl Into<String>, iterations: u64, input: Channel<Round>, output: Channel<Round>) -> LeafContext {
    LeafContext::new(name, move |node: &NodeRuntime| {
        for round in 0..iterations {
            if round > 0 {
                let ins: [&dyn InputChannel<Round>; 1] = [&input];
                let _ = dequeue_input_channels(node, &ins);
            }
            let outs: [&dyn OutputChannel<Round>; 1] = [&output];
            advance_until_can_enqueue(node, &outs);
            let _ = output.enqueue(ChannelElement::new(node.tick_lower_bound(), Round(round)));
            node.incr_cycles(1);
        }
    })
}

/// Runs `iterations` alternating rounds of the x-update/z-update handshake
/// and returns the final virtual time.
pub fn run_basis_pursuit(conf: BasisPursuitConfig) -> VirtualTime {
    let mut composite = CompositeContext::new("basis-pursuit");

    let x_to_z: Channel<Round> = Channel::new(1);
    let z_to_x: Channel<Round> = Channel::new(1);

    let x_updater = build_updater("x-update", conf.iterations, z_to_x.clone(), x_to_z.clone());
    let x_runtime = x_updater.runtime();
    let x_view: Weak<dyn TimeView> = Arc::downgrade(&x_runtime) as Weak<dyn TimeView>;
    x_to_z.connect_source(x_view.clone());
    z_to_x.connect_sink(x_view);
    x_runtime.register_output(&x_to_z);

    let z_updater = build_updater("z-update", conf.iterations, x_to_z.clone(), z_to_x.clone());
    let z_runtime = z_updater.runtime();
    let z_view: Weak<dyn TimeView> = Arc::downgrade(&z_runtime) as Weak<dyn TimeView>;
    z_to_x.connect_source(z_view.clone());
    x_to_z.connect_sink(z_view);
    z_runtime.register_output(&z_to_x);

    composite.add_child(Arc::new(x_updater));
    composite.add_child(Arc::new(z_updater));

    composite.init();
    composite.run();

    composite.tick_lower_bound()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_to_completion_and_advances_time() {
        let final_tick = run_basis_pursuit(BasisPursuitConfig { iterations: 10 });
        assert!(final_tick.is_infinite());
    }
}
