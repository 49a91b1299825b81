use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

/// A fixed-point format: `Q(integer_bits).(fraction_bits)`, optionally
/// signed. The format itself carries no value — it's the type two
/// [`FixedPoint`]s must share before they can be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPointType {
    pub signed: bool,
    pub integer_bits: u32,
    pub fraction_bits: u32,
}

impl FixedPointType {
    pub fn new(signed: bool, integer_bits: u32, fraction_bits: u32) -> Self {
        Self {
            signed,
            integer_bits,
            fraction_bits,
        }
    }

    /// A signed format needs at least one integer bit for its sign.
    pub fn is_valid(&self) -> bool {
        !self.signed || self.integer_bits > 0
    }

    pub fn min_value(&self) -> FixedPoint {
        let underlying = if self.signed {
            -(BigInt::from(1) << (self.integer_bits - 1 + self.fraction_bits))
        } else {
            BigInt::zero()
        };
        FixedPoint {
            tp: *self,
            underlying,
        }
    }

    pub fn max_value(&self) -> FixedPoint {
        let shift = self.integer_bits + self.fraction_bits - u32::from(self.signed);
        let underlying = (BigInt::from(1) << shift) - BigInt::from(1);
        FixedPoint {
            tp: *self,
            underlying,
        }
    }
}

impl fmt::Display for FixedPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fix[{}, {}, {}]", self.signed, self.integer_bits, self.fraction_bits)
    }
}

/// A value in a [`FixedPointType`]'s format, stored as its raw scaled
/// integer (`value * 2^fraction_bits`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPoint {
    pub tp: FixedPointType,
    underlying: BigInt,
}

impl FixedPoint {
    pub fn from_raw(tp: FixedPointType, underlying: BigInt) -> Self {
        Self { tp, underlying }
    }

    pub fn zero(tp: FixedPointType) -> Self {
        Self {
            tp,
            underlying: BigInt::zero(),
        }
    }

    pub fn from_int(tp: FixedPointType, integer: &BigInt) -> Self {
        assert!(
            tp.signed || !integer.is_negative(),
            "cannot represent a negative integer in an unsigned fixed-point format"
        );
        Self {
            tp,
            underlying: integer << tp.fraction_bits,
        }
    }

    /// Rounds `value * 2^fraction_bits` to the nearest integer (ties away
    /// from zero), via an exact [`BigRational`] rather than floating point.
    pub fn from_rational(tp: FixedPointType, value: &BigRational) -> Self {
        assert!(
            tp.signed || !value.is_negative(),
            "cannot represent a negative value in an unsigned fixed-point format"
        );
        let scale = BigRational::from_integer(BigInt::from(1) << tp.fraction_bits);
        let scaled = value * scale;
        let underlying = round_half_away_from_zero(&scaled);
        Self { tp, underlying }
    }

    pub fn from_f64(tp: FixedPointType, value: f64) -> Self {
        let rational = BigRational::from_float(value).expect("value must be finite");
        Self::from_rational(tp, &rational)
    }

    pub fn raw(&self) -> &BigInt {
        &self.underlying
    }

    pub fn to_rational(&self) -> BigRational {
        BigRational::new(self.underlying.clone(), BigInt::from(1) << self.tp.fraction_bits)
    }

    pub fn to_f64(&self) -> f64 {
        self.to_rational().to_f64().unwrap_or(f64::NAN)
    }

    /// Truncates towards negative infinity (arithmetic right shift).
    pub fn to_int(&self) -> BigInt {
        &self.underlying >> self.tp.fraction_bits
    }

    /// Reinterprets this value in a different format, truncating or
    /// zero/sign-extending the fractional part as needed.
    pub fn cast_to(&self, new_type: FixedPointType) -> FixedPoint {
        let underlying = if new_type.fraction_bits >= self.tp.fraction_bits {
            &self.underlying << (new_type.fraction_bits - self.tp.fraction_bits)
        } else {
            &self.underlying >> (self.tp.fraction_bits - new_type.fraction_bits)
        };
        FixedPoint {
            tp: new_type,
            underlying,
        }
    }

    pub fn validate(&self) -> bool {
        self.tp.is_valid()
    }
}

fn check_same_format(values: &[&FixedPoint]) {
    if let [first, rest @ ..] = values {
        for v in rest {
            assert_eq!(
                first.tp, v.tp,
                "fixed point type mismatch: {} vs {}",
                first.tp, v.tp
            );
        }
    }
}

fn round_half_away_from_zero(value: &BigRational) -> BigInt {
    let floor = value.floor().to_integer();
    let fraction = value - BigRational::from_integer(floor.clone());
    let half = BigRational::new(BigInt::from(1), BigInt::from(2));
    match fraction.cmp(&half) {
        std::cmp::Ordering::Less => floor,
        std::cmp::Ordering::Greater => floor + BigInt::from(1),
        std::cmp::Ordering::Equal => {
            // Exactly halfway: round up in magnitude, not just toward +infinity,
            // so negative ties go further negative instead of toward zero.
            if value.is_negative() {
                floor
            } else {
                floor + BigInt::from(1)
            }
        }
    }
}

/// `a + b`, both in the same format. Panics on a format mismatch.
pub fn add(a: &FixedPoint, b: &FixedPoint) -> FixedPoint {
    check_same_format(&[a, b]);
    FixedPoint {
        tp: a.tp,
        underlying: &a.underlying + &b.underlying,
    }
}

/// `a * b`, widening to a format with combined integer and fraction widths
/// so no precision is lost.
pub fn mul_full(a: &FixedPoint, b: &FixedPoint) -> FixedPoint {
    let tp = FixedPointType {
        signed: a.tp.signed || b.tp.signed,
        integer_bits: a.tp.integer_bits + b.tp.integer_bits,
        fraction_bits: a.tp.fraction_bits + b.tp.fraction_bits,
    };
    FixedPoint {
        tp,
        underlying: &a.underlying * &b.underlying,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q16_16(signed: bool) -> FixedPointType {
        FixedPointType::new(signed, 16, 16)
    }

    #[test]
    fn int_round_trip_is_exact() {
        let tp = q16_16(true);
        let x = BigInt::from(-42);
        let fp = FixedPoint::from_int(tp, &x);
        assert_eq!(fp.to_int(), x);
    }

    #[test]
    fn float_round_trip_is_within_one_ulp_of_the_format() {
        let tp = q16_16(true);
        let f = 3.14159;
        let fp = FixedPoint::from_f64(tp, f);
        let epsilon = 2f64.powi(-(tp.fraction_bits as i32));
        assert!((fp.to_f64() - f).abs() < epsilon);
    }

    #[test]
    fn add_requires_matching_formats() {
        let a = FixedPoint::from_int(q16_16(true), &BigInt::from(1));
        let b = FixedPoint::from_int(q16_16(true), &BigInt::from(2));
        let sum = add(&a, &b);
        assert_eq!(sum.to_int(), BigInt::from(3));
    }

    #[test]
    #[should_panic(expected = "fixed point type mismatch")]
    fn add_panics_on_format_mismatch() {
        let a = FixedPoint::from_int(q16_16(true), &BigInt::from(1));
        let b = FixedPoint::from_int(FixedPointType::new(true, 8, 8), &BigInt::from(1));
        let _ = add(&a, &b);
    }

    #[test]
    fn mul_full_widens_both_halves() {
        let tp = FixedPointType::new(true, 4, 4);
        let a = FixedPoint::from_int(tp, &BigInt::from(3));
        let b = FixedPoint::from_int(tp, &BigInt::from(5));
        let product = mul_full(&a, &b);
        assert_eq!(product.tp.integer_bits, 8);
        assert_eq!(product.tp.fraction_bits, 8);
        assert_eq!(product.to_int(), BigInt::from(15));
    }

    #[test]
    fn cast_to_narrower_fraction_truncates() {
        let wide = FixedPointType::new(true, 8, 8);
        let narrow = FixedPointType::new(true, 8, 4);
        let value = FixedPoint::from_rational(wide, &BigRational::new(BigInt::from(3), BigInt::from(2)));
        let cast = value.cast_to(narrow);
        assert_eq!(cast.tp, narrow);
        assert!((cast.to_f64() - 1.5).abs() < 2f64.powi(-4));
    }

    #[test]
    fn min_and_max_bound_the_format() {
        let tp = FixedPointType::new(true, 4, 0);
        assert_eq!(tp.min_value().to_int(), BigInt::from(-8));
        assert_eq!(tp.max_value().to_int(), BigInt::from(7));
    }

    #[test]
    fn exact_half_ties_round_away_from_zero_on_both_signs() {
        let tp = FixedPointType::new(true, 8, 0);

        let positive = FixedPoint::from_rational(tp, &BigRational::new(BigInt::from(5), BigInt::from(2)));
        assert_eq!(positive.to_int(), BigInt::from(3));

        let negative = FixedPoint::from_rational(tp, &BigRational::new(BigInt::from(-5), BigInt::from(2)));
        assert_eq!(negative.to_int(), BigInt::from(-3));
    }

    proptest::proptest! {
        #[test]
        fn int_round_trips_exactly(x in -100_000i64..100_000i64) {
            let tp = q16_16(true);
            let fp = FixedPoint::from_int(tp, &BigInt::from(x));
            prop_assert_eq!(fp.to_int(), BigInt::from(x));
        }

        #[test]
        fn float_round_trips_within_one_format_ulp(f in -1000.0f64..1000.0f64) {
            let tp = q16_16(true);
            let fp = FixedPoint::from_f64(tp, f);
            let epsilon = 2f64.powi(-(tp.fraction_bits as i32));
            prop_assert!((fp.to_f64() - f).abs() <= epsilon);
        }

        #[test]
        fn add_is_commutative(a in -1000i64..1000i64, b in -1000i64..1000i64) {
            let tp = q16_16(true);
            let fa = FixedPoint::from_int(tp, &BigInt::from(a));
            let fb = FixedPoint::from_int(tp, &BigInt::from(b));
            prop_assert_eq!(add(&fa, &fb), add(&fb, &fa));
        }
    }
}
