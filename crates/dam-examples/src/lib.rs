//! Thin worked-example drivers wired on top of the kernel crates (§10.4):
//! `hogmild` (asynchronous SGD parameter server), `gemv` (a PMU-backed
//! matrix-vector product), and `basis_pursuit` (an ADMM iteration-structure
//! stub). None of this is part of the kernel's public surface; it exists to
//! give the crate a runnable end-to-end story.

pub mod basis_pursuit;
pub mod gemv;
pub mod hogmild;

pub use basis_pursuit::{run_basis_pursuit, BasisPursuitConfig};
pub use gemv::{run_gemv, GemvConfig};
pub use hogmild::{run_hogmild, HogmildConfig};
