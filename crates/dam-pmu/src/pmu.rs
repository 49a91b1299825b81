use std::sync::{Arc, Mutex, Weak};

use dam_channel::{Channel, TimeView};
use dam_core::VirtualTime;
use dam_runtime::{CompositeContext, Context, NodeRuntime};
use dam_types::DamValue;

use crate::access::{AccessType, PmuBehavior};
use crate::datastore::PmuDataStore;
use crate::reader::{build_reader_leaf, ReadPort};
use crate::writer::{build_writer_leaf, WritePort};

/// A banked memory unit: two independently-stalling pipelines (read, write)
/// sharing one versioned backing store (§4.5). A composite context with
/// exactly two children — it owns no clock of its own and delegates its
/// whole `Context`/`TimeView` surface to them.
pub struct Pmu {
    composite: CompositeContext,
    reader_ports: Arc<Mutex<Vec<ReadPort>>>,
    writer_ports: Arc<Mutex<Vec<WritePort>>>,
    reader_runtime: Arc<NodeRuntime>,
    writer_runtime: Arc<NodeRuntime>,
}

impl Pmu {
    pub fn new(name: impl Into<String>, capacity: i64, latency: u64, behavior: PmuBehavior) -> Self {
        let name = name.into();
        let default_value = DamValue::Bit(dam_types::Bit::new(false));
        let datastore = Arc::new(PmuDataStore::<DamValue>::new(capacity, behavior, default_value));
        let reader_ports: Arc<Mutex<Vec<ReadPort>>> = Arc::new(Mutex::new(Vec::new()));
        let writer_ports: Arc<Mutex<Vec<WritePort>>> = Arc::new(Mutex::new(Vec::new()));

        let writer_leaf = Arc::new(build_writer_leaf(
            format!("{name}.writer"),
            Arc::clone(&datastore),
            Arc::clone(&writer_ports),
            latency,
        ));
        let writer_runtime = writer_leaf.runtime();

        let reader_leaf = Arc::new(build_reader_leaf(
            format!("{name}.reader"),
            Arc::clone(&datastore),
            Arc::clone(&reader_ports),
            Arc::clone(&writer_runtime),
            latency,
        ));
        let reader_runtime = reader_leaf.runtime();

        let mut composite = CompositeContext::new(name);
        composite.add_child(reader_leaf);
        composite.add_child(writer_leaf);

        Self {
            composite,
            reader_ports,
            writer_ports,
            reader_runtime,
            writer_runtime,
        }
    }

    fn reader_view(&self) -> Weak<dyn TimeView> {
        Arc::downgrade(&self.reader_runtime) as Weak<dyn TimeView>
    }

    fn writer_view(&self) -> Weak<dyn TimeView> {
        Arc::downgrade(&self.writer_runtime) as Weak<dyn TimeView>
    }

    /// Registers a read port. `outputs` receive a broadcast copy of every
    /// resolved read, stamped at the reader pipeline's time.
    pub fn add_reader(&self, addr: Channel<DamValue>, outputs: Vec<Channel<DamValue>>, access: AccessType) {
        addr.connect_sink(self.reader_view());
        for out in &outputs {
            out.connect_source(self.reader_view());
            self.reader_runtime.register_output(out);
        }
        self.reader_ports.lock().expect("reader port list poisoned").push(ReadPort { addr, outputs, access });
    }

    /// Registers a write port. `enable` is optional (absent enable means
    /// every lane is active); `ack` channels each receive a `Bit` once the
    /// write has committed.
    pub fn add_writer(
        &self,
        addr: Channel<DamValue>,
        data: Channel<DamValue>,
        enable: Option<Channel<DamValue>>,
        ack: Vec<Channel<DamValue>>,
        access: AccessType,
    ) {
        addr.connect_sink(self.writer_view());
        data.connect_sink(self.writer_view());
        if let Some(enable) = &enable {
            enable.connect_sink(self.writer_view());
        }
        for a in &ack {
            a.connect_source(self.writer_view());
            self.writer_runtime.register_output(a);
        }
        self.writer_ports
            .lock()
            .expect("writer port list poisoned")
            .push(WritePort { addr, data, enable, ack, access });
    }
}

impl TimeView for Pmu {
    fn tick_lower_bound(&self) -> VirtualTime {
        self.composite.tick_lower_bound()
    }

    fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        self.composite.block_until(deadline)
    }
}

impl Context for Pmu {
    fn name(&self) -> &str {
        self.composite.name()
    }

    fn init(&self) {
        self.composite.init();
    }

    fn run(&self) {
        self.composite.run();
    }

    fn cleanup(&self) {
        self.composite.cleanup();
    }

    fn assign_parent(&self, id: usize) {
        self.composite.assign_parent(id);
    }
}

#[cfg(test)]
mod tests {
    use dam_channel::InputChannel;
    use dam_core::ChannelElement;
    use dam_types::{FixedPoint, FixedPointType};
    use num_bigint::BigInt;

    use super::*;

    fn fixed_addr(i: i64) -> DamValue {
        DamValue::Fixed(FixedPoint::from_int(FixedPointType::new(false, 16, 0), &BigInt::from(i)))
    }

    #[test]
    fn scalar_write_then_scalar_read_round_trips() {
        let pmu = Pmu::new("pmu", 8, 1, PmuBehavior::default());

        let write_addr: Channel<DamValue> = Channel::new(4);
        let write_data: Channel<DamValue> = Channel::new(4);
        let ack: Channel<DamValue> = Channel::new(4);
        pmu.add_writer(write_addr.clone(), write_data.clone(), None, vec![ack.clone()], AccessType::Scalar);

        let read_addr: Channel<DamValue> = Channel::new(4);
        let read_out: Channel<DamValue> = Channel::new(4);
        pmu.add_reader(read_addr.clone(), vec![read_out.clone()], AccessType::Scalar);

        // Stand in for downstream consumers already far ahead in virtual
        // time, so this test's direct `dequeue()` calls resolve `Ok` instead
        // of `Nothing` against an unconnected (time-zero) consumer default.
        let sink = Arc::new(NodeRuntime::new("sink"));
        sink.advance_to(VirtualTime::new(1_000_000));
        let sink_view: Weak<dyn TimeView> = Arc::downgrade(&sink) as Weak<dyn TimeView>;
        ack.connect_sink(sink_view.clone());
        read_out.connect_sink(sink_view);

        let _ = write_addr.enqueue(ChannelElement::new(VirtualTime::ZERO, fixed_addr(3)));
        let _ = write_data.enqueue(ChannelElement::new(VirtualTime::ZERO, fixed_addr(42)));
        write_addr.close_output();
        write_data.close_output();

        let _ = read_addr.enqueue(ChannelElement::new(VirtualTime::new(10), fixed_addr(3)));
        read_addr.close_output();

        pmu.init();
        pmu.run();

        let ack_elem = InputChannel::dequeue(&ack);
        assert_eq!(ack_elem.status, dam_core::Status::Ok);

        let result = InputChannel::dequeue(&read_out);
        assert_eq!(result.payload, Some(fixed_addr(42)));
    }

    #[test]
    fn vector_write_respects_per_lane_enable() {
        use dam_types::Bit;

        let behavior = PmuBehavior {
            use_default_value: true,
            ..PmuBehavior::default()
        };
        let pmu = Pmu::new("pmu", 8, 1, behavior);

        let write_addr: Channel<DamValue> = Channel::new(4);
        let write_data: Channel<DamValue> = Channel::new(4);
        let write_enable: Channel<DamValue> = Channel::new(4);
        let ack: Channel<DamValue> = Channel::new(4);
        pmu.add_writer(
            write_addr.clone(),
            write_data.clone(),
            Some(write_enable.clone()),
            vec![ack.clone()],
            AccessType::Vector { width: 2 },
        );

        let read_addr: Channel<DamValue> = Channel::new(4);
        let read_out: Channel<DamValue> = Channel::new(4);
        pmu.add_reader(read_addr.clone(), vec![read_out.clone()], AccessType::Vector { width: 2 });

        let sink = Arc::new(NodeRuntime::new("sink"));
        sink.advance_to(VirtualTime::new(1_000_000));
        let sink_view: Weak<dyn TimeView> = Arc::downgrade(&sink) as Weak<dyn TimeView>;
        ack.connect_sink(sink_view.clone());
        read_out.connect_sink(sink_view);

        let data = DamValue::Vector(vec![fixed_addr(7), fixed_addr(9)]);
        let enable = DamValue::Vector(vec![DamValue::Bit(Bit::new(true)), DamValue::Bit(Bit::new(false))]);

        let _ = write_addr.enqueue(ChannelElement::new(VirtualTime::ZERO, fixed_addr(0)));
        let _ = write_data.enqueue(ChannelElement::new(VirtualTime::ZERO, data));
        let _ = write_enable.enqueue(ChannelElement::new(VirtualTime::ZERO, enable));
        write_addr.close_output();
        write_data.close_output();
        write_enable.close_output();

        let _ = read_addr.enqueue(ChannelElement::new(VirtualTime::new(10), fixed_addr(0)));
        read_addr.close_output();

        pmu.init();
        pmu.run();

        let _ = InputChannel::dequeue(&ack);
        let result = InputChannel::dequeue(&read_out);
        match result.payload {
            Some(DamValue::Vector(values)) => {
                assert_eq!(values[0], fixed_addr(7));
                // Lane 1's enable was false, so its default (never-written)
                // value surfaces instead of 9.
                assert_ne!(values[1], fixed_addr(9));
            }
            other => panic!("expected a vector read result, got {other:?}"),
        }
    }
}
