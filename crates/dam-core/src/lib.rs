//! Foundational types shared by every other `dam-*` crate: virtual time,
//! tokens, transient-status/result enums, and the fatal error kind.
//!
//! Nothing in this crate spawns a thread or takes a lock; it's pure data.

mod error;
mod payload;
mod status;
mod time;

pub use error::{fatal, DamError};
pub use payload::{ChannelElement, Payload};
pub use status::{EnqueueResult, Status};
pub use time::VirtualTime;
