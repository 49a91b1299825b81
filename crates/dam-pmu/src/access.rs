/// How a port addresses the backing store (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// One cell, indexed by a scalar address.
    Scalar,
    /// `width` contiguous cells starting at a scalar address.
    Vector { width: usize },
    /// Address is a vector; result (or data) is a vector of the same width,
    /// one independent cell per lane.
    Gather,
    /// Like `Gather`, for writes: vector address, vector data, one write per
    /// lane, each lane independently enable-gated.
    Scatter,
}

impl AccessType {
    pub fn width(self) -> usize {
        match self {
            AccessType::Scalar => 1,
            AccessType::Vector { width } => width,
            AccessType::Gather | AccessType::Scatter => 0,
        }
    }
}

/// Behavior flags for a PMU instance. Every flag defaults to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PmuBehavior {
    /// Reject out-of-bounds addresses instead of wrapping them modulo
    /// capacity.
    pub no_mod_address: bool,
    /// Return a default value for a read before any write instead of
    /// raising `ReadBeforeWrite`.
    pub use_default_value: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_vector_widths() {
        assert_eq!(AccessType::Scalar.width(), 1);
        assert_eq!(AccessType::Vector { width: 4 }.width(), 4);
    }

    #[test]
    fn behavior_defaults_are_all_off() {
        let b = PmuBehavior::default();
        assert!(!b.no_mod_address);
        assert!(!b.use_default_value);
    }
}
