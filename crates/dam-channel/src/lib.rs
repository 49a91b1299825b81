//! Timestamped, back-pressured channels: the edges of a dataflow graph.
//!
//! A [`Channel`] connects exactly one producer to exactly one consumer and
//! reconciles their virtual clocks (§4.1) without either side ever touching
//! the other's lock directly — all cross-node visibility goes through the
//! object-safe [`TimeView`] capability.

mod channel;
mod inner;
mod traits;
mod view;

pub use channel::Channel;
pub use inner::Peeked;
pub use traits::{Closeable, InputChannel, OutputChannel};
pub use view::TimeView;
