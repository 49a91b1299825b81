//! Micro-benchmark: raw enqueue->dequeue latency & throughput, with clean
//! shutdown that is EXCLUDED from the measurement window.
//!
//! Measurement window:
//! - Start when producers are released by a barrier.
//! - Stop after we've collected exactly N Data latencies on the aggregator.
//! - Then shut down (poison pills) OUTSIDE the window.
//!
//! Implementations compared:
//! - damchan : this crate's `dam_channel::Channel`, a single-producer/
//!             single-consumer timestamped link (connect_source/
//!             connect_sink each accept exactly one endpoint, so this mode
//!             requires `--producers 1 --consumers 1`).
//! - xbeam   : crossbeam::bounded MPMC.
//! - mpsc    : std::sync::mpsc::sync_channel bounded (single real consumer).
//!
//! Output CSV:
//! impl,producers,consumers,n_items,capacity,p50_ns,p95_ns,p99_ns,throughput_items_per_s
//!
//! Run (build release to reduce noise):
//!   cargo build --release
//!   target/release/dam-bench --implm damchan --producers 1 --consumers 1 --n-items 200000 --capacity 1024
//!   target/release/dam-bench --implm xbeam   --producers 4 --consumers 4 --n-items 500000 --capacity 1024
//!   target/release/dam-bench --implm mpsc    --producers 4 --consumers 4 --n-items 500000 --capacity 1024

use anyhow::Result;
use clap::Parser;
use crossbeam_channel as xbeam;
use dam_channel::{Channel, InputChannel, OutputChannel, TimeView};
use dam_core::{ChannelElement, Payload};
use dam_runtime::{advance_until_can_enqueue, NodeRuntime};
use std::{
    sync::{mpsc as stdmpsc, Arc, Barrier, Mutex, Weak},
    thread,
    time::Instant,
};

#[derive(Parser, Debug, Clone)]
struct Args {
    /// "damchan" | "xbeam" | "mpsc"
    #[arg(long, default_value = "damchan")]
    implm: String,

    /// number of producers ("damchan" only supports 1)
    #[arg(long, default_value_t = 1)]
    producers: usize,

    /// number of consumers ("damchan" only supports 1)
    #[arg(long, default_value_t = 1)]
    consumers: usize,

    /// total items (Data messages) to measure
    #[arg(long, default_value_t = 200_000)]
    n_items: usize,

    /// queue depth / capacity
    #[arg(long, default_value_t = 1024)]
    capacity: usize,

    /// CPU work per item in nanoseconds (busy-wait), executed by consumers after each message
    #[arg(long, default_value_t = 0u64)]
    work_ns: u64,
}

#[derive(Debug, Clone)]
struct Stamp {
    t: Instant,
}

/// Unified message so we can send poison pills without polluting metrics.
#[derive(Debug, Clone)]
enum Msg {
    Data(Stamp),
    Stop,
}

impl Payload for Msg {
    fn validate(&self) -> bool {
        true
    }

    fn size_bits(&self) -> u64 {
        128
    }
}

// ---------- Adapter trait: enqueue/dequeue, blocking -------------------------

trait QueueAdapter: Send + Sync + 'static {
    fn enqueue_data(&self, m: Msg);
    fn dequeue(&self) -> Msg; // blocking
}

// ------------------------ Crossbeam -----------------------------------------

struct XBeamAdapter {
    tx: xbeam::Sender<Msg>,
    rx: xbeam::Receiver<Msg>,
}
impl QueueAdapter for XBeamAdapter {
    fn enqueue_data(&self, m: Msg) {
        self.tx.send(m).unwrap();
    }
    fn dequeue(&self) -> Msg {
        self.rx.recv().unwrap()
    }
}

// ------------------------ std::mpsc -----------------------------------------

struct MpscAdapter {
    tx: stdmpsc::SyncSender<Msg>,
    // Receiver<T> is not Sync -> protect it; this also matches single-consumer semantics.
    rx: Mutex<stdmpsc::Receiver<Msg>>,
}
impl QueueAdapter for MpscAdapter {
    fn enqueue_data(&self, m: Msg) {
        self.tx.send(m).unwrap();
    }
    fn dequeue(&self) -> Msg {
        let rx = self.rx.lock().unwrap();
        rx.recv().unwrap()
    }
}

// ------------------------ dam_channel::Channel -------------------------------
//
// Unlike the other two, this channel is a fixed point-to-point link: capacity
// is native (no separate gate needed), but only one producer and one consumer
// clock can ever be wired in. Each side carries its own `NodeRuntime` purely
// as the clock the channel's back-pressure protocol needs to reconcile
// against; it advances one tick per item, independent of the wall-clock
// `Stamp` the payload itself carries for latency measurement.

struct DamChanAdapter {
    chan: Channel<Msg>,
    producer: Arc<NodeRuntime>,
    consumer: Arc<NodeRuntime>,
}

impl DamChanAdapter {
    fn new(capacity: usize) -> Self {
        let chan: Channel<Msg> = Channel::new(capacity);
        let producer = Arc::new(NodeRuntime::new("bench-producer"));
        let consumer = Arc::new(NodeRuntime::new("bench-consumer"));
        chan.connect_source(Arc::downgrade(&producer) as Weak<dyn TimeView>);
        chan.connect_sink(Arc::downgrade(&consumer) as Weak<dyn TimeView>);
        Self { chan, producer, consumer }
    }
}

impl QueueAdapter for DamChanAdapter {
    fn enqueue_data(&self, m: Msg) {
        let outs: [&dyn OutputChannel<Msg>; 1] = [&self.chan];
        advance_until_can_enqueue(&self.producer, &outs);
        let t = self.producer.current();
        let _ = self.chan.enqueue(ChannelElement::new(t, m));
        self.producer.incr_cycles(1);
    }

    fn dequeue(&self) -> Msg {
        let peeked = self.chan.dequeue();
        self.consumer.incr_cycles(1);
        peeked
            .into_element()
            .expect("benchmark never closes the channel, so dequeue never resolves Closed")
            .payload
    }
}

// ------------------------------------------------------------------------------

fn busy_work_ns(ns: u64) {
    if ns == 0 {
        return;
    }
    let start = Instant::now();
    while start.elapsed().as_nanos() < ns as u128 {
        std::hint::spin_loop();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.implm == "damchan" && (args.producers != 1 || args.consumers != 1) {
        eprintln!("--implm=damchan requires --producers 1 --consumers 1 (dam_channel::Channel is point-to-point)");
        std::process::exit(2);
    }

    let adapter: Box<dyn QueueAdapter> = match args.implm.as_str() {
        "xbeam" => {
            let (tx, rx) = xbeam::bounded::<Msg>(args.capacity);
            Box::new(XBeamAdapter { tx, rx })
        }
        "mpsc" => {
            let (tx, rx) = stdmpsc::sync_channel::<Msg>(args.capacity);
            Box::new(MpscAdapter {
                tx,
                rx: Mutex::new(rx),
            })
        }
        "damchan" => Box::new(DamChanAdapter::new(args.capacity)),
        other => {
            eprintln!("Unknown --implm={other}. Use 'damchan' | 'xbeam' | 'mpsc'.");
            std::process::exit(2);
        }
    };
    let q = Arc::new(adapter);

    // Barrier to start all producers at once (stable contention).
    let start_barrier = Arc::new(Barrier::new(args.producers + 1));

    // Latency aggregator (nanoseconds)
    let (lat_tx, lat_rx) = xbeam::unbounded::<u64>();

    // Consumers: block, record Data latencies, exit upon receiving Stop.
    let mut consumer_handles = Vec::with_capacity(args.consumers);
    for _ in 0..args.consumers {
        let q = Arc::clone(&q);
        let lat_tx = lat_tx.clone();
        let work_ns = args.work_ns;
        consumer_handles.push(thread::spawn(move || {
            while let Msg::Data(stamp) = q.dequeue() {
                let ns = stamp.t.elapsed().as_nanos() as u64;
                let _ = lat_tx.send(ns);
                busy_work_ns(work_ns);
            }
        }));
    }

    // Split Data items across producers
    let base = args.n_items / args.producers;
    let extra = args.n_items % args.producers;

    // Producers
    let mut producers = Vec::with_capacity(args.producers);
    for pid in 0..args.producers {
        let q = Arc::clone(&q);
        let n = base + if pid < extra { 1 } else { 0 };
        let sb = Arc::clone(&start_barrier);
        producers.push(thread::spawn(move || {
            sb.wait();
            for _ in 0..n {
                q.enqueue_data(Msg::Data(Stamp { t: Instant::now() }));
            }
        }));
    }

    // Start the measurement window: when we release producers.
    let t0 = Instant::now();
    start_barrier.wait();

    // Collect exactly N Data latencies -> end of measurement window.
    let mut lats = Vec::with_capacity(args.n_items);
    for _ in 0..args.n_items {
        let ns = lat_rx.recv().unwrap();
        lats.push(ns);
    }
    let elapsed = t0.elapsed();

    // After measurement: clean shutdown (excluded from metrics).
    for _ in 0..args.consumers {
        q.enqueue_data(Msg::Stop);
    }
    for h in producers {
        h.join().unwrap();
    }
    for h in consumer_handles {
        h.join().unwrap();
    }

    // Compute metrics
    lats.sort_unstable();
    let p50 = percentile(&lats, 50.0);
    let p95 = percentile(&lats, 95.0);
    let p99 = percentile(&lats, 99.0);
    let tps = args.n_items as f64 / elapsed.as_secs_f64();

    println!("impl,producers,consumers,n_items,capacity,p50_ns,p95_ns,p99_ns,throughput_items_per_s");
    println!(
        "{},{},{},{},{},{},{},{},{}",
        args.implm,
        args.producers,
        args.consumers,
        args.n_items,
        args.capacity,
        p50 as u64,
        p95 as u64,
        p99 as u64,
        tps as u64
    );

    Ok(())
}

/// Percentile (nearest-rank) on sorted ns
fn percentile(sorted_ns: &[u64], p: f64) -> f64 {
    if sorted_ns.is_empty() {
        return 0.0;
    }
    let n = sorted_ns.len();
    let rank = ((p / 100.0) * (n as f64 - 1.0)).round() as usize;
    sorted_ns[rank] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_on_sorted_data_matches_nearest_rank() {
        let data: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&data, 50.0), 50.0);
        assert_eq!(percentile(&data, 99.0), 99.0);
    }

    #[test]
    fn percentile_of_empty_slice_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn damchan_adapter_round_trips_a_handful_of_items() {
        let adapter = DamChanAdapter::new(4);
        for i in 0..4u64 {
            adapter.enqueue_data(Msg::Data(Stamp { t: Instant::now() }));
            match adapter.dequeue() {
                Msg::Data(_) => {}
                Msg::Stop => panic!("unexpected Stop at item {i}"),
            }
        }
        adapter.enqueue_data(Msg::Stop);
        assert!(matches!(adapter.dequeue(), Msg::Stop));
    }
}
