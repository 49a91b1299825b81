use dam_core::Payload;

use crate::abstract_value::AbstractValue;
use crate::bit::Bit;
use crate::fixed::FixedPoint;

/// Tagged union over the kinds of value a channel carrying heterogeneous
/// shapes (the PMU, most notably) needs to move: a scaled fixed-point
/// number, a homogeneous bundle of them, an opaque bit-width placeholder,
/// or a single bit.
///
/// Closed to variants outside this crate — callers match on the kinds the
/// kernel actually understands rather than growing their own.
#[derive(Debug, Clone, PartialEq)]
pub enum DamValue {
    Fixed(FixedPoint),
    Vector(Vec<DamValue>),
    Abstract(AbstractValue),
    Bit(Bit),
}

impl DamValue {
    pub fn as_fixed(&self) -> Option<&FixedPoint> {
        match self {
            DamValue::Fixed(fp) => Some(fp),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[DamValue]> {
        match self {
            DamValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl Payload for DamValue {
    fn validate(&self) -> bool {
        match self {
            DamValue::Fixed(fp) => fp.validate(),
            DamValue::Vector(elems) => !elems.is_empty() && elems.iter().all(DamValue::validate),
            DamValue::Abstract(a) => a.validate(),
            DamValue::Bit(b) => b.validate(),
        }
    }

    fn size_bits(&self) -> u64 {
        match self {
            DamValue::Fixed(fp) => (fp.tp.integer_bits + fp.tp.fraction_bits) as u64,
            DamValue::Vector(elems) => elems.iter().map(DamValue::size_bits).sum(),
            DamValue::Abstract(a) => a.size_bits(),
            DamValue::Bit(b) => b.size_bits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedPointType;

    #[test]
    fn vector_size_bits_sums_its_elements() {
        let tp = FixedPointType::new(true, 8, 8);
        let elem = DamValue::Fixed(FixedPoint::zero(tp));
        let vec = DamValue::Vector(vec![elem.clone(), elem]);
        assert_eq!(vec.size_bits(), 32);
    }

    #[test]
    fn empty_vector_is_invalid() {
        assert!(!DamValue::Vector(vec![]).validate());
    }

    #[test]
    fn as_fixed_rejects_other_variants() {
        assert!(DamValue::Bit(Bit::new(true)).as_fixed().is_none());
    }
}
