use std::sync::{Arc, Mutex};

use dam_channel::Channel;
use dam_core::{ChannelElement, Status, VirtualTime};
use dam_types::DamValue;
use num_traits::ToPrimitive;

use dam_runtime::{LeafContext, NodeRuntime};

use crate::access::AccessType;
use crate::datastore::PmuDataStore;

pub(crate) struct ReadPort {
    pub addr: Channel<DamValue>,
    pub outputs: Vec<Channel<DamValue>>,
    pub access: AccessType,
}

struct ReadBacklog {
    port: usize,
    time: VirtualTime,
    addr_value: DamValue,
}

fn to_index(value: &DamValue) -> i64 {
    value
        .as_fixed()
        .expect("PMU address must be a fixed-point value")
        .to_int()
        .to_i64()
        .expect("PMU address out of range")
}

fn handle_read(datastore: &PmuDataStore<DamValue>, addr: &DamValue, access: AccessType, time: VirtualTime) -> DamValue {
    match access {
        AccessType::Gather => {
            let addrs = addr.as_vector().expect("gather address must be a vector");
            DamValue::Vector(addrs.iter().map(|a| datastore.read(to_index(a), time)).collect())
        }
        AccessType::Scalar => datastore.read(to_index(addr), time),
        AccessType::Vector { width } => {
            let base = to_index(addr);
            DamValue::Vector((0..width as i64).map(|i| datastore.read(base + i, time)).collect())
        }
        AccessType::Scatter => unreachable!("Scatter is a write-only access pattern"),
    }
}

/// Picks the earliest-time peek among `ports`' address channels, dropping
/// any whose channel is `Closed`. Ties favor a port that's actually ready
/// (`Ok`) over one that's merely stalled (`Nothing`). Returns `None` once
/// every port is closed.
fn select_earliest(ports: &[ReadPort]) -> Option<(usize, Status, VirtualTime)> {
    ports
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let peeked = p.addr.peek();
            (peeked.status != Status::Closed).then_some((i, peeked.status, peeked.time))
        })
        .min_by(|(_, sa, ta), (_, sb, tb)| match ta.cmp(tb) {
            std::cmp::Ordering::Equal => match (sa, sb) {
                (Status::Nothing, Status::Ok) => std::cmp::Ordering::Greater,
                (Status::Ok, Status::Nothing) => std::cmp::Ordering::Less,
                _ => std::cmp::Ordering::Equal,
            },
            other => other,
        })
}

/// One iteration of the read pipeline's loop (§4.5). Returns `false` once
/// every reader port has been closed and has no backlog left to drain.
fn read_tick(
    node: &NodeRuntime,
    writer: &NodeRuntime,
    datastore: &PmuDataStore<DamValue>,
    ports: &[ReadPort],
    backlog: &mut Option<ReadBacklog>,
    latency: u64,
) -> bool {
    if let Some(entry) = backlog {
        let port = &ports[entry.port];
        let can_write = port.outputs.iter().all(|o| !o.is_full());
        if can_write {
            tracing::debug!(port = entry.port, time = %entry.time, "pmu read resolving");
            writer.block_until(entry.time);
            let value = handle_read(datastore, &entry.addr_value, port.access, entry.time);
            let stamp = node.current();
            for out in &port.outputs {
                let _ = out.enqueue(ChannelElement::new(stamp, value.clone()));
            }
            *backlog = None;
        } else {
            for out in &port.outputs {
                if let Some(t) = out.next_time() {
                    node.advance_to(t);
                }
            }
            node.incr_cycles(1);
        }
        return true;
    }

    let Some((idx, status, time)) = select_earliest(ports) else {
        return false;
    };
    node.advance_to(time);
    if status == Status::Nothing {
        node.incr_cycles(1);
        return true;
    }

    let dequeued = ports[idx].addr.dequeue();
    let elem = dequeued.into_element().expect("selected port was confirmed Ok");
    *backlog = Some(ReadBacklog {
        port: idx,
        time: node.current().saturating_add_ticks(latency),
        addr_value: elem.payload,
    });
    node.incr_cycles(1);
    true
}

pub(crate) fn build_reader_leaf(
    name: impl Into<String>,
    datastore: Arc<PmuDataStore<DamValue>>,
    ports: Arc<Mutex<Vec<ReadPort>>>,
    writer: Arc<NodeRuntime>,
    latency: u64,
) -> LeafContext {
    LeafContext::new(name, move |node: &NodeRuntime| {
        let mut backlog: Option<ReadBacklog> = None;
        let guard = ports.lock().expect("reader port list poisoned");
        while read_tick(node, &writer, &datastore, &guard, &mut backlog, latency) {}
    })
}

