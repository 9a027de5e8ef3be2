//! Exact rational arithmetic for periodic clock intervals and shifts.
//!
//! FMI3 exposes clock timing both as a decimal (`f64`) and as a counter /
//! resolution pair. To keep the two views consistent, timing is stored as a
//! reduced fraction and the decimal conversion goes through the shortest
//! decimal rendering of the float, never through binary-float
//! multiplication. `1.5` becomes exactly 3/2, `0.1` exactly 1/10.

use thiserror::Error;

/// Interval qualifier reported on every timing query: the interval is
/// exact and was (re)computed this query (`fmi3IntervalChanged`).
pub const INTERVAL_QUALIFIER_CHANGED: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("decimal {value} is not a valid clock time (finite, >= 0 required)")]
    InvalidDecimal { value: String },
    #[error("clock time too large to represent exactly")]
    Overflow,
    #[error("fraction denominator must be non-zero")]
    ZeroDenominator,
}

/// A non-negative rational, always kept in lowest terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fraction {
    numerator: u64,
    denominator: u64,
}

impl Fraction {
    /// One second per tick, the default timing of a periodic clock.
    pub const ONE: Fraction = Fraction {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u64, denominator: u64) -> Result<Self, ClockError> {
        if denominator == 0 {
            return Err(ClockError::ZeroDenominator);
        }
        let g = gcd(numerator, denominator);
        Ok(Self {
            numerator: numerator / g,
            denominator: denominator / g,
        })
    }

    pub fn numerator(self) -> u64 {
        self.numerator
    }

    pub fn denominator(self) -> u64 {
        self.denominator
    }

    /// Convert a decimal clock time to an exact fraction.
    ///
    /// Parses the shortest decimal rendering of the float (Rust's `Display`
    /// for `f64` never uses scientific notation and round-trips), so
    /// `0.1` yields 1/10 rather than the nearest binary expansion.
    pub fn from_decimal(value: f64) -> Result<Self, ClockError> {
        if !value.is_finite() || value.is_sign_negative() && value != 0.0 {
            return Err(ClockError::InvalidDecimal {
                value: value.to_string(),
            });
        }
        // -0.0 compares equal to zero but renders as "-0"
        let value = if value == 0.0 { 0.0 } else { value };
        let rendered = value.to_string();
        let (integral, fractional) = match rendered.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rendered.as_str(), ""),
        };

        let scale = 10u128
            .checked_pow(fractional.len() as u32)
            .ok_or(ClockError::Overflow)?;
        let integral: u128 = integral.parse().map_err(|_| ClockError::InvalidDecimal {
            value: rendered.clone(),
        })?;
        let fractional: u128 = if fractional.is_empty() {
            0
        } else {
            fractional.parse().map_err(|_| ClockError::InvalidDecimal {
                value: rendered.clone(),
            })?
        };
        let numerator = integral
            .checked_mul(scale)
            .and_then(|n| n.checked_add(fractional))
            .ok_or(ClockError::Overflow)?;

        let g = gcd_u128(numerator, scale);
        let numerator = u64::try_from(numerator / g).map_err(|_| ClockError::Overflow)?;
        let denominator = u64::try_from(scale / g).map_err(|_| ClockError::Overflow)?;
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// One division, the closest double to the exact rational.
    pub fn as_decimal(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    if a == 0 {
        return b.max(1);
    }
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn gcd_u128(mut a: u128, mut b: u128) -> u128 {
    if a == 0 {
        return b.max(1);
    }
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimals_become_exact_fractions() {
        assert_eq!(Fraction::from_decimal(1.5).unwrap(), fraction(3, 2));
        assert_eq!(Fraction::from_decimal(0.1).unwrap(), fraction(1, 10));
        assert_eq!(Fraction::from_decimal(2.0).unwrap(), fraction(2, 1));
        assert_eq!(Fraction::from_decimal(0.0).unwrap(), fraction(0, 1));
        assert_eq!(Fraction::from_decimal(-0.0).unwrap(), fraction(0, 1));
    }

    #[test]
    fn fraction_to_decimal_round_trips() {
        assert_eq!(fraction(5, 2).as_decimal(), 2.5);
        assert_eq!(Fraction::from_decimal(2.5).unwrap(), fraction(5, 2));
        // set-by-decimal then read both ways
        let f = Fraction::from_decimal(1.5).unwrap();
        assert_eq!((f.numerator(), f.denominator()), (3, 2));
        assert_eq!(f.as_decimal(), 1.5);
    }

    #[test]
    fn construction_reduces() {
        assert_eq!(Fraction::new(6, 4).unwrap(), fraction(3, 2));
        assert_eq!(Fraction::new(0, 7).unwrap(), fraction(0, 1));
        assert_eq!(
            Fraction::new(1, 0).unwrap_err(),
            ClockError::ZeroDenominator
        );
    }

    #[test]
    fn bad_decimals_are_rejected() {
        assert!(matches!(
            Fraction::from_decimal(-1.0),
            Err(ClockError::InvalidDecimal { .. })
        ));
        assert!(matches!(
            Fraction::from_decimal(f64::NAN),
            Err(ClockError::InvalidDecimal { .. })
        ));
        assert!(matches!(
            Fraction::from_decimal(f64::INFINITY),
            Err(ClockError::InvalidDecimal { .. })
        ));
    }

    fn fraction(n: u64, d: u64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }
}
