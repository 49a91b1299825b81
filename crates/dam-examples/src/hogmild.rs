//! Hogwild!-style asynchronous SGD: one parameter server folding gradients
//! from `n-workers` independent workers into a shared weight version,
//! modeled as two kinds of nodes wired through per-worker sample/update
//! channel pairs (§10.4).
//!
//! Gradients fold through a small pipeline: up to `n_folders` folds may be
//! in flight at once, admitted no faster than every `fold_ii` ticks, each
//! retiring (and bumping the visible weight version) `fold_latency` ticks
//! after admission. With `n_folders = 1` and `fold_ii >= fold_latency` this
//! collapses to one fold in flight at a time, paced purely by its own
//! latency.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use clap::Parser;
use dam_channel::{Channel, InputChannel, TimeView};
use dam_core::{ChannelElement, Payload, Status, VirtualTime};
use dam_runtime::{dequeue_input_bundles, CompositeContext, Context, LeafContext, NodeRuntime};

/// One unit of work flowing from the parameter server to a worker and back:
/// a sample id to compute a gradient for, and the weight version it was
/// dispatched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub sample_id: u64,
    pub weight_version: u64,
}

impl Payload for Sample {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        128
    }
}

#[derive(Debug, Clone, Copy, Parser)]
pub struct HogmildConfig {
    #[arg(long = "sending-time", default_value_t = 8)]
    pub sending_time: u64,
    #[arg(long = "network-delay", default_value_t = 16)]
    pub network_delay: u64,
    #[arg(long = "fold-latency", default_value_t = 32)]
    pub fold_latency: u64,
    #[arg(long = "fold-ii", default_value_t = 4)]
    pub fold_ii: u64,
    #[arg(long = "gradient-latency", default_value_t = 64)]
    pub gradient_latency: u64,
    #[arg(long = "gradient-ii", default_value_t = 4)]
    pub gradient_ii: u64,
    #[arg(long = "fifo-depth", default_value_t = 8)]
    pub fifo_depth: usize,
    #[arg(long = "n-samples", default_value_t = 128)]
    pub n_samples: u64,
    #[arg(long = "n-workers", default_value_t = 1)]
    pub n_workers: u64,
    #[arg(long = "n-weight-banks", default_value_t = 8)]
    pub n_weight_banks: usize,
    #[arg(long = "n-folders", default_value_t = 8)]
    pub n_folders: usize,
}

impl Default for HogmildConfig {
    fn default() -> Self {
        Self {
            sending_time: 8,
            network_delay: 16,
            fold_latency: 32,
            fold_ii: 4,
            gradient_latency: 64,
            gradient_ii: 4,
            fifo_depth: 8,
            n_samples: 128,
            n_workers: 1,
            n_weight_banks: 8,
            n_folders: 8,
        }
    }
}

struct PendingFold {
    retire_at: VirtualTime,
    sample: Sample,
}

struct ParamsServerState {
    conf: HogmildConfig,
    next_sample: u64,
    curr_weight_version: u64,
    /// Time each outstanding weight bank becomes free to carry another
    /// dispatched sample, capped at `n_weight_banks` entries.
    bank_states: Vec<VirtualTime>,
    pending_folds: VecDeque<PendingFold>,
    last_fold_admit: Option<VirtualTime>,
    update_log: Vec<Sample>,
}

/// Drops bank reservations whose dispatch has already cleared the node's
/// current tick. A bank counts as "busy" while its reservation time is
/// strictly ahead of now, freeing on the same tick it was due rather than
/// one tick later.
fn clear_free_banks(node: &NodeRuntime, state: &mut ParamsServerState) {
    let current = node.current();
    state.bank_states.retain(|t| *t > current);
}

fn send_samples(node: &NodeRuntime, state: &mut ParamsServerState, outputs: &[Channel<Sample>]) {
    if state.next_sample == state.conf.n_samples || state.bank_states.len() == state.conf.n_weight_banks {
        return;
    }

    for out in outputs {
        if out.is_full() {
            continue;
        }

        let s = Sample {
            sample_id: state.next_sample,
            weight_version: state.curr_weight_version,
        };
        let _ = out.enqueue(ChannelElement::new(node.tick_lower_bound(), s));
        state.next_sample += 1;

        let ready_at = node.tick_lower_bound().saturating_add_ticks(state.conf.sending_time);
        state.bank_states.push(ready_at);

        if state.bank_states.len() == state.conf.n_weight_banks || state.next_sample == state.conf.n_samples {
            break;
        }
    }
}

/// Retires any fold whose latency has elapsed, bumping the visible weight
/// version and appending to the update log in admission order (retire
/// times are monotonic since `fold_latency` is constant per sample).
fn retire_folds(node: &NodeRuntime, state: &mut ParamsServerState) {
    let current = node.current();
    while let Some(front) = state.pending_folds.front() {
        if front.retire_at > current {
            break;
        }
        let fold = state.pending_folds.pop_front().expect("front just checked Some");
        state.update_log.push(fold.sample);
        state.curr_weight_version += 1;
    }
}

/// Admits newly-arrived gradients into the fold pipeline, gated by how many
/// folds are already in flight (`n_folders`) and how recently one was last
/// admitted (`fold_ii`). Channels with no capacity to admit are left
/// untouched (peeked, not dequeued) so their tokens are still there next
/// tick.
fn try_admit_folds(node: &NodeRuntime, state: &mut ParamsServerState, update_chans: &[Channel<Sample>]) {
    for chan in update_chans {
        if state.pending_folds.len() >= state.conf.n_folders {
            return;
        }
        if let Some(last) = state.last_fold_admit {
            if last.saturating_add_ticks(state.conf.fold_ii) > node.current() {
                return;
            }
        }

        let peeked = chan.peek();
        if peeked.status != Status::Ok || peeked.time > node.current() {
            continue;
        }
        let elem = chan.dequeue().into_element().expect("peek confirmed Ok");
        state.last_fold_admit = Some(node.current());
        state.pending_folds.push_back(PendingFold {
            retire_at: node.current().saturating_add_ticks(state.conf.fold_latency),
            sample: elem.payload,
        });
    }
}

fn run_params_server(node: &NodeRuntime, mut state: ParamsServerState, sample_outputs: Vec<Channel<Sample>>, update_inputs: Vec<Channel<Sample>>) -> Vec<Sample> {
    while state.next_sample < state.conf.n_samples {
        clear_free_banks(node, &mut state);
        retire_folds(node, &mut state);
        send_samples(node, &mut state, &sample_outputs);
        try_admit_folds(node, &mut state, &update_inputs);
        node.incr_cycles(1);
    }

    let channels: Vec<&dyn InputChannel<Sample>> = update_inputs.iter().map(|c| c as &dyn InputChannel<Sample>).collect();
    let bundles: Vec<Vec<usize>> = (0..channels.len()).map(|i| vec![i]).collect();

    while (state.update_log.len() as u64) < state.conf.n_samples {
        retire_folds(node, &mut state);
        if (state.update_log.len() as u64) >= state.conf.n_samples {
            break;
        }
        if state.pending_folds.len() < state.conf.n_folders {
            match dequeue_input_bundles(node, &channels, &bundles) {
                Some((_idx, elems)) => {
                    for elem in elems {
                        state.last_fold_admit = Some(node.current());
                        state.pending_folds.push_back(PendingFold {
                            retire_at: node.current().saturating_add_ticks(state.conf.fold_latency),
                            sample: elem.payload,
                        });
                    }
                }
                None => panic!("did not receive all of the gradients"),
            }
        } else {
            node.incr_cycles(1);
        }
    }

    state.update_log
}

fn compute_gradient(node: &NodeRuntime, conf: &HogmildConfig, elem: ChannelElement<Sample>, output: &Channel<Sample>) {
    let total_latency = conf.gradient_latency + conf.sending_time + conf.network_delay;
    let stamp = elem.time.saturating_add_ticks(total_latency);
    let _ = output.enqueue(ChannelElement::new(stamp, elem.payload));
    node.incr_cycles(conf.gradient_ii);
}

fn run_worker(node: &NodeRuntime, conf: &HogmildConfig, input: Channel<Sample>, output: Channel<Sample>) {
    loop {
        let chans: [&dyn InputChannel<Sample>; 1] = [&input];
        let peeked = &dequeue_input_channels_one(node, &chans);
        match peeked.status {
            Status::Ok => {
                let elem = ChannelElement::new(peeked.time, peeked.payload.clone().expect("Ok peek carries a payload"));
                compute_gradient(node, conf, elem, &output);
            }
            Status::Closed => return,
            Status::Nothing => unreachable!("dequeue always resolves Ok or Closed"),
        }
    }
}

fn dequeue_input_channels_one(node: &NodeRuntime, chans: &[&dyn InputChannel<Sample>; 1]) -> dam_channel::Peeked<Sample> {
    dam_runtime::dequeue_input_channels(node, chans).remove(0)
}

/// Builds and runs the full hogmild graph: one parameter-server leaf plus
/// `n_workers` worker leaves, each pair wired through its own sample/update
/// channel. Returns the update log in retirement order and the final tick.
pub fn run_hogmild(conf: HogmildConfig) -> (Vec<Sample>, VirtualTime) {
    let mut composite = CompositeContext::new("hogmild");

    let mut sample_outputs = Vec::with_capacity(conf.n_workers as usize);
    let mut update_inputs = Vec::with_capacity(conf.n_workers as usize);
    let mut worker_leaves: Vec<Arc<LeafContext>> = Vec::with_capacity(conf.n_workers as usize);

    for w in 0..conf.n_workers {
        let sample_chan: Channel<Sample> = Channel::new(conf.fifo_depth);
        let update_chan: Channel<Sample> = Channel::new(conf.fifo_depth);

        let worker_conf = conf;
        let worker_sample_chan = sample_chan.clone();
        let worker_update_chan = update_chan.clone();
        let leaf = LeafContext::new(format!("worker-{w}"), move |node: &NodeRuntime| {
            run_worker(node, &worker_conf, worker_sample_chan.clone(), worker_update_chan.clone());
        });
        let runtime = leaf.runtime();
        let view: Weak<dyn TimeView> = Arc::downgrade(&runtime) as Weak<dyn TimeView>;
        sample_chan.connect_sink(view.clone());
        update_chan.connect_source(view);
        runtime.register_output(&update_chan);

        sample_outputs.push(sample_chan);
        update_inputs.push(update_chan);
        worker_leaves.push(Arc::new(leaf));
    }

    let state = ParamsServerState {
        conf,
        next_sample: 0,
        curr_weight_version: 0,
        bank_states: Vec::new(),
        pending_folds: VecDeque::new(),
        last_fold_admit: None,
        update_log: Vec::new(),
    };

    let result = Arc::new(Mutex::new(Vec::new()));
    let result_for_server = Arc::clone(&result);
    let server_sample_outputs = sample_outputs.clone();
    let server_update_inputs = update_inputs.clone();
    let mut state = Some(state);
    let server_leaf = LeafContext::new("params-server", move |node: &NodeRuntime| {
        let state = state.take().expect("leaf body runs exactly once");
        let log = run_params_server(node, state, server_sample_outputs.clone(), server_update_inputs.clone());
        *result_for_server.lock().expect("result lock poisoned") = log;
    });
    let server_runtime = server_leaf.runtime();
    let server_view: Weak<dyn TimeView> = Arc::downgrade(&server_runtime) as Weak<dyn TimeView>;
    for out in &sample_outputs {
        out.connect_source(server_view.clone());
        server_runtime.register_output(out);
    }
    for input in &update_inputs {
        input.connect_sink(server_view.clone());
    }

    composite.add_child(Arc::new(server_leaf));
    for leaf in worker_leaves {
        composite.add_child(leaf);
    }

    composite.init();
    composite.run();

    let final_tick = composite.tick_lower_bound();
    let log = result.lock().expect("result lock poisoned").clone();
    (log, final_tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_single_worker_single_folder_preserves_order() {
        let conf = HogmildConfig {
            sending_time: 8,
            network_delay: 32,
            fold_latency: 32,
            fold_ii: 32,
            gradient_latency: 64,
            gradient_ii: 64,
            fifo_depth: 8,
            n_samples: 4,
            n_workers: 1,
            n_weight_banks: 1,
            n_folders: 1,
        };

        let (log, _final_tick) = run_hogmild(conf);

        assert_eq!(log.len(), 4);
        for (i, s) in log.iter().enumerate() {
            assert_eq!(s.sample_id, i as u64);
            assert_eq!(s.weight_version, i as u64);
        }
    }

    #[test]
    fn pipelined_folding_still_accounts_for_every_sample() {
        let conf = HogmildConfig {
            n_samples: 16,
            n_workers: 4,
            n_weight_banks: 4,
            n_folders: 4,
            fold_ii: 2,
            fold_latency: 10,
            ..HogmildConfig::default()
        };

        let (log, _final_tick) = run_hogmild(conf);

        assert_eq!(log.len(), 16);
        let mut ids: Vec<u64> = log.iter().map(|s| s.sample_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }
}
