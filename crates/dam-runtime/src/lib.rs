//! The node-level runtime: virtual clocks, the context lifecycle, and the
//! bundle primitives user node bodies use to couple to channel
//! back-pressure (§4.2–§4.4).

mod bundle;
mod clock;
mod context;
mod network;
mod node;

pub use bundle::{advance_until_can_enqueue, dequeue_input_bundles, dequeue_input_channels};
pub use clock::Clock;
pub use context::{CompositeContext, Context, LeafContext};
pub use network::ideal_link;
pub use node::NodeRuntime;
