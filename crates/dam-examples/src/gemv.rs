//! Matrix-vector product: a PMU-backed worked example (§8 scenario 2).
//! A matrix producer streams rows into a banked [`Pmu`], a vector producer
//! broadcasts the fixed vector once, and a dot-product node reads rows back
//! out through the PMU's read port and accumulates `row · vector`. Routing
//! the matrix through the PMU rather than a plain channel means the
//! matrix-storage half of the pipeline exercises the banked-memory kernel
//! directly instead of bypassing it.

use std::sync::{Arc, Weak};

use clap::Parser;
use dam_channel::{Channel, InputChannel, OutputChannel, TimeView};
use dam_core::{ChannelElement, VirtualTime};
use dam_pmu::{AccessType, Pmu, PmuBehavior};
use dam_runtime::{advance_until_can_enqueue, dequeue_input_channels, CompositeContext, Context, LeafContext, NodeRuntime};
use dam_types::{add as fixed_add, mul_full, DamValue, FixedPoint, FixedPointType};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

#[derive(Debug, Clone, Copy, Parser)]
pub struct GemvConfig {
    #[arg(long, default_value_t = 1024)]
    pub rows: usize,
    #[arg(long, default_value_t = 16)]
    pub cols: usize,
    #[arg(long = "row-delay", default_value_t = 32)]
    pub row_delay: u64,
}

impl Default for GemvConfig {
    fn default() -> Self {
        Self {
            rows: 1024,
            cols: 16,
            row_delay: 32,
        }
    }
}

fn matrix_fpt() -> FixedPointType {
    FixedPointType::new(true, 32, 0)
}

fn addr_fpt() -> FixedPointType {
    FixedPointType::new(false, 32, 0)
}

fn fixed(i: i64) -> DamValue {
    DamValue::Fixed(FixedPoint::from_int(matrix_fpt(), &BigInt::from(i)))
}

fn addr(i: i64) -> DamValue {
    DamValue::Fixed(FixedPoint::from_int(addr_fpt(), &BigInt::from(i)))
}

/// `floor(log2(n)) + 1`, the dot-product latency a black-box `n`-wide
/// reduction is assumed to take.
fn dot_latency(n: usize) -> u64 {
    (n as f64).log2() as u64 + 1
}

fn build_vector_producer(cols: usize, output: Channel<DamValue>) -> LeafContext {
    LeafContext::new("vector-producer", move |node: &NodeRuntime| {
        let values: Vec<DamValue> = (0..cols as i64).map(fixed).collect();
        let _ = output.enqueue(ChannelElement::new(node.tick_lower_bound(), DamValue::Vector(values)));
    })
}

fn build_matrix_producer(rows: usize, cols: usize, row_delay: u64, addr_out: Channel<DamValue>, data_out: Channel<DamValue>) -> LeafContext {
    LeafContext::new("matrix-producer", move |node: &NodeRuntime| {
        for row in 0..rows as i64 {
            let values: Vec<DamValue> = (0..cols as i64).map(|i| fixed(i + row)).collect();
            let next_tick = node.tick_lower_bound().saturating_add_ticks(row_delay);

            let outs: [&dyn OutputChannel<DamValue>; 2] = [&addr_out, &data_out];
            advance_until_can_enqueue(node, &outs);
            let now = node.tick_lower_bound();
            let _ = addr_out.enqueue(ChannelElement::new(now, addr(row * cols as i64)));
            let _ = data_out.enqueue(ChannelElement::new(now, DamValue::Vector(values)));

            node.advance_to(next_tick);
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn build_dot_product(
    rows: usize,
    cols: usize,
    vec_in: Channel<DamValue>,
    read_addr: Channel<DamValue>,
    read_out: Channel<DamValue>,
    output: Channel<DamValue>,
) -> LeafContext {
    let latency = dot_latency(cols);
    LeafContext::new("dot-product", move |node: &NodeRuntime| {
        let mut vector: Option<Vec<DamValue>> = None;
        for row in 0..rows as i64 {
            if vector.is_none() {
                let chans: [&dyn InputChannel<DamValue>; 1] = [&vec_in];
                let elem = dequeue_input_channels(node, &chans)
                    .remove(0)
                    .into_element()
                    .expect("vector producer always sends one Ok token");
                vector = Some(elem.payload.as_vector().expect("vector producer sends a Vector").to_vec());
            }

            let addr_outs: [&dyn OutputChannel<DamValue>; 1] = [&read_addr];
            advance_until_can_enqueue(node, &addr_outs);
            let _ = read_addr.enqueue(ChannelElement::new(node.tick_lower_bound(), addr(row * cols as i64)));

            let read_ins: [&dyn InputChannel<DamValue>; 1] = [&read_out];
            let row_elem = dequeue_input_channels(node, &read_ins)
                .remove(0)
                .into_element()
                .expect("pmu read resolves Ok while rows remain");
            let row_values = row_elem.payload.as_vector().expect("pmu read returns a Vector").to_vec();

            let mut sum = FixedPoint::zero(matrix_fpt());
            for (a, b) in row_values.iter().zip(vector.as_ref().expect("vector initialized above").iter()) {
                let a = a.as_fixed().expect("row cell is Fixed");
                let b = b.as_fixed().expect("vector cell is Fixed");
                let product = mul_full(a, b).cast_to(matrix_fpt());
                sum = fixed_add(&sum, &product);
            }

            let out_outs: [&dyn OutputChannel<DamValue>; 1] = [&output];
            advance_until_can_enqueue(node, &out_outs);
            let _ = output.enqueue(ChannelElement::new(node.tick_lower_bound(), DamValue::Fixed(sum)));
            node.incr_cycles(latency);
        }
    })
}

/// Wires and runs the whole pipeline, returning each row's dot-product
/// result (as a plain integer, since the matrix/vector entries are all
/// integral) in row order, plus the final virtual time.
pub fn run_gemv(conf: GemvConfig) -> (Vec<i64>, VirtualTime) {
    let mut composite = CompositeContext::new("gemv");

    let vec_chan: Channel<DamValue> = Channel::new(1);
    let write_addr: Channel<DamValue> = Channel::new(4);
    let write_data: Channel<DamValue> = Channel::new(4);
    let read_addr: Channel<DamValue> = Channel::new(4);
    let read_out: Channel<DamValue> = Channel::new(4);
    let output: Channel<DamValue> = Channel::new(conf.rows.max(1));

    let pmu = Arc::new(Pmu::new("matrix", (conf.rows * conf.cols) as i64, 1, PmuBehavior::default()));
    pmu.add_writer(write_addr.clone(), write_data.clone(), None, Vec::new(), AccessType::Vector { width: conf.cols });
    pmu.add_reader(read_addr.clone(), vec![read_out.clone()], AccessType::Vector { width: conf.cols });

    let vec_leaf = build_vector_producer(conf.cols, vec_chan.clone());
    let vec_runtime = vec_leaf.runtime();
    let vec_view: Weak<dyn TimeView> = Arc::downgrade(&vec_runtime) as Weak<dyn TimeView>;
    vec_chan.connect_source(vec_view);
    vec_runtime.register_output(&vec_chan);

    let matrix_leaf = build_matrix_producer(conf.rows, conf.cols, conf.row_delay, write_addr.clone(), write_data.clone());
    let matrix_runtime = matrix_leaf.runtime();
    let matrix_view: Weak<dyn TimeView> = Arc::downgrade(&matrix_runtime) as Weak<dyn TimeView>;
    write_addr.connect_source(matrix_view.clone());
    write_data.connect_source(matrix_view);
    matrix_runtime.register_output(&write_addr);
    matrix_runtime.register_output(&write_data);

    let dot_leaf = build_dot_product(conf.rows, conf.cols, vec_chan.clone(), read_addr.clone(), read_out.clone(), output.clone());
    let dot_runtime = dot_leaf.runtime();
    let dot_view: Weak<dyn TimeView> = Arc::downgrade(&dot_runtime) as Weak<dyn TimeView>;
    vec_chan.connect_sink(dot_view.clone());
    read_addr.connect_source(dot_view.clone());
    read_out.connect_sink(dot_view.clone());
    output.connect_source(dot_view);
    dot_runtime.register_output(&read_addr);
    dot_runtime.register_output(&output);

    // Stand in for a downstream consumer already far ahead in virtual time,
    // so this function's own post-run `dequeue` calls below resolve `Ok`
    // instead of `Nothing` against the output channel's zero-default
    // consumer time.
    let sink = Arc::new(NodeRuntime::new("sink"));
    sink.advance_to(VirtualTime::new(1_000_000_000));
    output.connect_sink(Arc::downgrade(&sink) as Weak<dyn TimeView>);

    composite.add_child(Arc::new(vec_leaf));
    composite.add_child(Arc::new(matrix_leaf));
    composite.add_child(Arc::new(dot_leaf));
    composite.add_child(pmu);

    composite.init();
    composite.run();

    let final_tick = composite.tick_lower_bound();

    let mut results = Vec::with_capacity(conf.rows);
    for _ in 0..conf.rows {
        let elem = output.dequeue().into_element().expect("dot-product sends exactly one result per row");
        let value = elem.payload.as_fixed().expect("dot-product result is Fixed").to_int().to_i64().expect("result fits in i64");
        results.push(value);
    }

    (results, final_tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_matrix_vector_product_matches_closed_form() {
        let conf = GemvConfig { rows: 4, cols: 4, row_delay: 4 };
        let (results, _final_tick) = run_gemv(conf);

        assert_eq!(results.len(), 4);
        for (i, got) in results.iter().enumerate() {
            let expected: i64 = (0..4i64).map(|a| a * (a + i as i64)).sum();
            assert_eq!(*got, expected);
        }
    }
}
