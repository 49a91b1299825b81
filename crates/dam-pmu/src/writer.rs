use std::sync::{Arc, Mutex};

use dam_channel::Channel;
use dam_core::{fatal, ChannelElement, DamError, Status, VirtualTime};
use dam_types::{Bit, DamValue};
use num_traits::ToPrimitive;

use dam_runtime::{advance_until_can_enqueue, dequeue_input_channels, LeafContext, NodeRuntime};

use crate::access::AccessType;
use crate::datastore::PmuDataStore;

pub(crate) struct WritePort {
    pub addr: Channel<DamValue>,
    pub data: Channel<DamValue>,
    pub enable: Option<Channel<DamValue>>,
    pub ack: Vec<Channel<DamValue>>,
    pub access: AccessType,
}

/// A write whose commit already happened; only its ack broadcast is still
/// pending output space.
struct WriteBacklog {
    port: usize,
    ack_time: VirtualTime,
}

fn to_index(value: &DamValue) -> i64 {
    value
        .as_fixed()
        .expect("PMU address must be a fixed-point value")
        .to_int()
        .to_i64()
        .expect("PMU address out of range")
}

fn broadcast_enable(enable: Option<&DamValue>, width: usize) -> Vec<bool> {
    match enable {
        None => vec![true; width],
        Some(DamValue::Bit(b)) => vec![b.value(); width],
        Some(DamValue::Vector(lanes)) => lanes
            .iter()
            .map(|lane| match lane {
                DamValue::Bit(b) => b.value(),
                _ => fatal(DamError::PayloadMismatch { expected: "Bit" }),
            })
            .collect(),
        Some(_) => fatal(DamError::PayloadMismatch {
            expected: "Bit or Vector<Bit>",
        }),
    }
}

fn handle_write(datastore: &PmuDataStore<DamValue>, addr: &DamValue, data: &DamValue, enable: Option<&DamValue>, access: AccessType, time: VirtualTime) {
    match access {
        AccessType::Scalar => {
            if broadcast_enable(enable, 1)[0] {
                datastore.write(to_index(addr), data.clone(), time);
            }
        }
        AccessType::Vector { width } => {
            let values = data.as_vector().expect("vector write data must be a vector");
            let enables = broadcast_enable(enable, width);
            let base = to_index(addr);
            for (i, value) in values.iter().enumerate() {
                if enables[i] {
                    datastore.write(base + i as i64, value.clone(), time);
                }
            }
        }
        AccessType::Scatter => {
            let addrs = addr.as_vector().expect("scatter address must be a vector");
            let values = data.as_vector().expect("scatter data must be a vector");
            if addrs.len() != values.len() {
                fatal(DamError::WidthMismatch {
                    addr_width: addrs.len(),
                    data_width: values.len(),
                });
            }
            let enables = broadcast_enable(enable, values.len());
            for (i, (addr_lane, value)) in addrs.iter().zip(values.iter()).enumerate() {
                if enables[i] {
                    datastore.write(to_index(addr_lane), value.clone(), time);
                }
            }
        }
        AccessType::Gather => unreachable!("Gather is a read-only access pattern"),
    }
}

/// A write packet's combined readiness: `Closed` if any of its channels is
/// closed, `Nothing` if any hasn't reached a value yet, else `Ok` at the max
/// of the three (or two) channels' times.
fn peek_write_packet(port: &WritePort) -> (Status, VirtualTime) {
    let mut status = Status::Ok;
    let mut time = VirtualTime::ZERO;
    for peeked in [Some(port.addr.peek()), Some(port.data.peek()), port.enable.as_ref().map(Channel::peek)]
        .into_iter()
        .flatten()
    {
        time = time.max(peeked.time);
        match peeked.status {
            Status::Closed => status = Status::Closed,
            Status::Nothing if status != Status::Closed => status = Status::Nothing,
            _ => {}
        }
    }
    (status, time)
}

fn select_earliest(ports: &[WritePort]) -> Option<(usize, Status, VirtualTime)> {
    ports
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (status, time) = peek_write_packet(p);
            (i, status, time)
        })
        .filter(|(_, status, _)| *status != Status::Closed)
        .min_by(|(_, sa, ta), (_, sb, tb)| match ta.cmp(tb) {
            std::cmp::Ordering::Equal => match (sa, sb) {
                (Status::Nothing, Status::Ok) => std::cmp::Ordering::Greater,
                (Status::Ok, Status::Nothing) => std::cmp::Ordering::Less,
                _ => std::cmp::Ordering::Equal,
            },
            other => other,
        })
}

fn write_tick(
    node: &NodeRuntime,
    datastore: &PmuDataStore<DamValue>,
    ports: &[WritePort],
    backlog: &mut Option<WriteBacklog>,
    latency: u64,
) -> bool {
    if let Some(entry) = backlog {
        let port = &ports[entry.port];
        let outs: Vec<&dyn dam_channel::OutputChannel<DamValue>> = port.ack.iter().map(|c| c as &dyn dam_channel::OutputChannel<DamValue>).collect();
        let can_write = outs.iter().all(|o| !o.is_full());
        if can_write {
            for ack in &port.ack {
                let _ = ack.enqueue(ChannelElement::new(entry.ack_time, DamValue::Bit(Bit::new(true))));
            }
            *backlog = None;
        } else {
            advance_until_can_enqueue(node, &outs);
        }
        node.incr_cycles(1);
        return true;
    }

    let Some((idx, status, time)) = select_earliest(ports) else {
        return false;
    };
    if status == Status::Nothing {
        node.advance_to(time);
        node.incr_cycles(1);
        return true;
    }

    let port = &ports[idx];
    let mut chans: Vec<&dam_channel::Channel<DamValue>> = vec![&port.addr, &port.data];
    if let Some(enable) = &port.enable {
        chans.push(enable);
    }
    let inputs: Vec<&dyn dam_channel::InputChannel<DamValue>> = chans.iter().map(|c| *c as &dyn dam_channel::InputChannel<DamValue>).collect();
    let mut dequeued = dequeue_input_channels(node, &inputs);
    let enable_elem = if port.enable.is_some() { dequeued.pop() } else { None };
    let data_elem = dequeued.pop().expect("write packet always has a data channel");
    let addr_elem = dequeued.pop().expect("write packet always has an addr channel");

    let addr = addr_elem.into_element().expect("addr channel confirmed Ok").payload;
    let data = data_elem.into_element().expect("data channel confirmed Ok").payload;
    let enable = enable_elem.and_then(|e| e.into_element()).map(|e| e.payload);

    let write_time = node.current().saturating_add_ticks(latency.saturating_sub(1));
    handle_write(datastore, &addr, &data, enable.as_ref(), port.access, write_time);

    *backlog = Some(WriteBacklog {
        port: idx,
        ack_time: write_time,
    });
    node.incr_cycles(1);
    true
}

pub(crate) fn build_writer_leaf(
    name: impl Into<String>,
    datastore: Arc<PmuDataStore<DamValue>>,
    ports: Arc<Mutex<Vec<WritePort>>>,
    latency: u64,
) -> LeafContext {
    LeafContext::new(name, move |node: &NodeRuntime| {
        let mut backlog: Option<WriteBacklog> = None;
        let guard = ports.lock().expect("writer port list poisoned");
        while write_tick(node, &datastore, &guard, &mut backlog, latency) {}
    })
}
