//! Concrete payload kinds: scaled fixed-point numbers, vectors of
//! homogeneous elements, opaque bit-width placeholders, and single bits,
//! plus a tagged union over all four for channels that need to carry more
//! than one shape.

mod abstract_value;
mod bit;
mod fixed;
mod value;

pub use abstract_value::AbstractValue;
pub use bit::Bit;
pub use fixed::{add, mul_full, FixedPoint, FixedPointType};
pub use value::DamValue;
