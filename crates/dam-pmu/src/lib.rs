//! A banked memory unit (§4.5): a composite context built from independent
//! read and write pipelines sharing one versioned backing store, as a
//! worked example of a non-trivial node built on `dam-runtime`.

mod access;
mod datastore;
mod pmu;
mod reader;
mod writer;

pub use access::{AccessType, PmuBehavior};
pub use pmu::Pmu;
