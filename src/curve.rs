//! BabyJubJub curve arithmetic over the BN254 scalar field.
//!
//! The curve is the twisted Edwards curve `a*x^2 + y^2 = 1 + d*x^2*y^2` with
//! `a = 168700`, `d = 168696`, defined over Fq (the BN254 scalar field). The
//! generator is the circomlib Base8 point; its prime-order subgroup is the
//! scalar ring Fr.

use ark_ff::{BigInteger, Field, MontFp, PrimeField};
use ark_std::{One, Zero};
use num_bigint::BigUint;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

/// Base field of BabyJubJub: the BN254 scalar field, prime
/// 21888242871839275222246405745257275088548364400416034343698204186575808495617.
pub type Fq = ark_bn254::Fr;

/// Scalar ring of the prime-order subgroup, modulus
/// 2736030358979909402780800718157159386076813972158567259200215660948447373041.
pub type Fr = ark_ed_on_bn254::Fr;

/// Twisted Edwards coefficient `a`.
pub const COEFF_A: Fq = MontFp!("168700");

/// Twisted Edwards coefficient `d`.
pub const COEFF_D: Fq = MontFp!("168696");

/// The subgroup generator (circomlib's Base8 point).
pub const GENERATOR: Point = Point {
    x: MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553"),
    y: MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203"),
};

/// The group identity (0, 1).
pub const IDENTITY: Point = Point {
    x: MontFp!("0"),
    y: MontFp!("1"),
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CurveError {
    #[error("Cannot invert zero field element")]
    NonInvertible,

    #[error("Zero denominator in point addition")]
    ZeroDenominator,

    #[error("Point ({x}, {y}) is not on the curve")]
    NotOnCurve { x: String, y: String },

    #[error("Invalid decimal field element: {0}")]
    InvalidDecimal(String),
}

/// Modular inverse in Fq. Fails on zero, the only non-invertible residue of a
/// prime field.
pub fn mod_inv(a: Fq) -> Result<Fq, CurveError> {
    a.inverse().ok_or(CurveError::NonInvertible)
}

/// An affine BabyJubJub point.
///
/// Hashing and equality are structural over the two field coordinates, which
/// is what the baby-step table of the discrete-log solver keys on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: Fq,
    pub y: Fq,
}

impl Point {
    pub fn new(x: Fq, y: Fq) -> Self {
        Self { x, y }
    }

    /// Unified twisted Edwards addition:
    ///
    /// ```text
    /// x3 = (x1*y2 + y1*x2) / (1 + d*x1*x2*y1*y2)
    /// y3 = (y1*y2 - a*x1*x2) / (1 - d*x1*x2*y1*y2)
    /// ```
    ///
    /// The formula is complete on the curve (it handles doubling without a
    /// branch); a zero denominator can only come from an off-curve input and
    /// is surfaced rather than folded into a wrong result.
    pub fn add(&self, other: &Point) -> Result<Point, CurveError> {
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let dxxyy = COEFF_D * x1x2 * y1y2;

        let x3_den = Fq::one() + dxxyy;
        let y3_den = Fq::one() - dxxyy;
        if x3_den.is_zero() || y3_den.is_zero() {
            return Err(CurveError::ZeroDenominator);
        }

        let x3 = (self.x * other.y + self.y * other.x) * mod_inv(x3_den)?;
        let y3 = (y1y2 - COEFF_A * x1x2) * mod_inv(y3_den)?;
        Ok(Point { x: x3, y: y3 })
    }

    /// Point negation: -(x, y) = (-x, y). The identity maps to itself.
    pub fn neg(&self) -> Point {
        Point {
            x: -self.x,
            y: self.y,
        }
    }

    pub fn sub(&self, other: &Point) -> Result<Point, CurveError> {
        self.add(&other.neg())
    }

    /// Scalar multiplication by double-and-add, LSB first.
    ///
    /// The scalar lives in Fr, so it is already reduced mod the subgroup
    /// order; zero yields the identity.
    pub fn mul_scalar(&self, scalar: &Fr) -> Result<Point, CurveError> {
        if scalar.is_zero() {
            return Ok(IDENTITY);
        }

        let mut bits = scalar.into_bigint().to_bits_le();
        while bits.last() == Some(&false) {
            bits.pop();
        }

        let mut result = IDENTITY;
        let mut current = *self;
        let last = bits.len() - 1;
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                result = result.add(&current)?;
            }
            if i < last {
                current = current.add(&current)?;
            }
        }
        Ok(result)
    }

    /// Check the curve equation `a*x^2 + y^2 = 1 + d*x^2*y^2`.
    pub fn is_on_curve(&self) -> bool {
        let x2 = self.x * self.x;
        let y2 = self.y * self.y;
        COEFF_A * x2 + y2 == Fq::one() + COEFF_D * x2 * y2
    }

    /// Parse a point from two decimal coordinate strings, enforcing curve
    /// membership.
    pub fn from_decimal(x: &str, y: &str) -> Result<Point, CurveError> {
        let point = Point {
            x: fq_from_decimal(x)?,
            y: fq_from_decimal(y)?,
        };
        if !point.is_on_curve() {
            return Err(CurveError::NotOnCurve {
                x: x.to_string(),
                y: y.to_string(),
            });
        }
        Ok(point)
    }

    /// The two decimal coordinate strings `[x, y]`.
    pub fn to_decimal(&self) -> [String; 2] {
        [fq_to_decimal(&self.x), fq_to_decimal(&self.y)]
    }
}

/// Render a base-field element as its canonical decimal string.
pub fn fq_to_decimal(value: &Fq) -> String {
    let repr: BigUint = (*value).into();
    repr.to_str_radix(10)
}

/// Parse a base-field element from a decimal string, reducing mod p.
pub fn fq_from_decimal(s: &str) -> Result<Fq, CurveError> {
    let digits =
        BigUint::from_str(s).map_err(|_| CurveError::InvalidDecimal(s.to_string()))?;
    Ok(Fq::from_le_bytes_mod_order(&digits.to_bytes_le()))
}

/// Render a scalar as its canonical decimal string.
pub fn fr_to_decimal(value: &Fr) -> String {
    let repr: BigUint = (*value).into();
    repr.to_str_radix(10)
}

/// Parse a scalar from a decimal string, reducing mod the subgroup order.
pub fn fr_from_decimal(s: &str) -> Result<Fr, CurveError> {
    let digits =
        BigUint::from_str(s).map_err(|_| CurveError::InvalidDecimal(s.to_string()))?;
    Ok(Fr::from_le_bytes_mod_order(&digits.to_bytes_le()))
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_decimal().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [x, y] = <[String; 2]>::deserialize(deserializer)?;
        Point::from_decimal(&x, &y).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mul_u64(k: u64, point: &Point) -> Point {
        point.mul_scalar(&Fr::from(k)).unwrap()
    }

    #[test]
    fn generator_and_identity_are_on_curve() {
        assert!(GENERATOR.is_on_curve());
        assert!(IDENTITY.is_on_curve());
    }

    #[test]
    fn add_identity_is_noop() {
        assert_eq!(GENERATOR.add(&IDENTITY).unwrap(), GENERATOR);
    }

    #[test]
    fn addition_is_commutative() {
        let p = mul_u64(7, &GENERATOR);
        let q = mul_u64(13, &GENERATOR);
        assert_eq!(p.add(&q).unwrap(), q.add(&p).unwrap());
    }

    #[test]
    fn addition_is_associative() {
        let p = mul_u64(3, &GENERATOR);
        let q = mul_u64(5, &GENERATOR);
        let r = mul_u64(11, &GENERATOR);
        let lhs = p.add(&q).unwrap().add(&r).unwrap();
        let rhs = p.add(&q.add(&r).unwrap()).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn unified_formula_doubles() {
        assert_eq!(GENERATOR.add(&GENERATOR).unwrap(), mul_u64(2, &GENERATOR));
    }

    #[test]
    fn negation_cancels() {
        assert_eq!(GENERATOR.add(&GENERATOR.neg()).unwrap(), IDENTITY);
        assert_eq!(GENERATOR.sub(&GENERATOR).unwrap(), IDENTITY);
    }

    #[test]
    fn scalar_mul_zero_and_one() {
        assert_eq!(GENERATOR.mul_scalar(&Fr::from(0u64)).unwrap(), IDENTITY);
        assert_eq!(GENERATOR.mul_scalar(&Fr::from(1u64)).unwrap(), GENERATOR);
    }

    #[test]
    fn generator_has_subgroup_order() {
        // The subgroup order reduces to zero in Fr, so n*G is the zero-scalar case;
        // check via (n - 1)*G + G instead to exercise the group law.
        let n_minus_one = -Fr::one();
        let almost = GENERATOR.mul_scalar(&n_minus_one).unwrap();
        assert_eq!(almost.add(&GENERATOR).unwrap(), IDENTITY);
    }

    #[test]
    fn scalar_mul_distributes_over_addition() {
        let lhs = mul_u64(42 + 58, &GENERATOR);
        let rhs = mul_u64(42, &GENERATOR)
            .add(&mul_u64(58, &GENERATOR))
            .unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn operations_stay_on_curve() {
        let p = mul_u64(12345, &GENERATOR);
        assert!(p.is_on_curve());
        assert!(p.add(&GENERATOR).unwrap().is_on_curve());
        assert!(p.neg().is_on_curve());
    }

    #[test]
    fn mod_inv_rejects_zero() {
        assert_eq!(mod_inv(Fq::zero()), Err(CurveError::NonInvertible));
        let seven = Fq::from(7u64);
        assert_eq!(seven * mod_inv(seven).unwrap(), Fq::one());
    }

    #[test]
    fn decimal_round_trip() {
        let p = mul_u64(99, &GENERATOR);
        let [x, y] = p.to_decimal();
        assert_eq!(Point::from_decimal(&x, &y).unwrap(), p);
    }

    #[test]
    fn off_curve_decimal_is_rejected() {
        let err = Point::from_decimal("1", "1").unwrap_err();
        assert!(matches!(err, CurveError::NotOnCurve { .. }));
    }

    #[test]
    fn point_serde_round_trip() {
        let p = mul_u64(17, &GENERATOR);
        let json = serde_json::to_string(&p).unwrap();
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
