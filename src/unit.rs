// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::ops::{Div, Mul};

use crate::error::{ArrayError, Result};

const N_BASES: usize = 10;

const BASE_NAMES: [&str; N_BASES] = ["m", "kg", "s", "A", "K", "mol", "cd", "rad", "deg", "counts"];

const M: usize = 0;
const KG: usize = 1;
const S: usize = 2;
const A: usize = 3;
const K: usize = 4;
const MOL: usize = 5;
const CD: usize = 6;
const RAD: usize = 7;
const DEG: usize = 8;
const COUNTS: usize = 9;

/// A physical unit: a product of integer powers of the SI base units plus
/// `rad`, `deg` and `counts`.
///
/// Two special values exist besides proper units:
///
/// - [`Unit::one`] (dimensionless), the multiplicative identity;
/// - [`Unit::none`], meaning "unit not meaningful" (e.g. for strings).
///   `none` is distinct from dimensionless under `==` but also acts as the
///   identity under `*` and `/`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    none: bool,
    powers: [i8; N_BASES],
}

impl Unit {
    const fn base(index: usize) -> Unit {
        let mut powers = [0i8; N_BASES];
        powers[index] = 1;
        Unit { none: false, powers }
    }

    /// The dimensionless unit.
    pub const fn one() -> Unit {
        Unit {
            none: false,
            powers: [0; N_BASES],
        }
    }

    /// Alias for [`Unit::one`].
    pub const fn dimensionless() -> Unit {
        Unit::one()
    }

    /// "Unit not meaningful", used for strings and other non-quantities.
    pub const fn none() -> Unit {
        Unit {
            none: true,
            powers: [0; N_BASES],
        }
    }

    /// Metre.
    pub const fn m() -> Unit {
        Unit::base(M)
    }

    /// Kilogram.
    pub const fn kg() -> Unit {
        Unit::base(KG)
    }

    /// Second.
    pub const fn s() -> Unit {
        Unit::base(S)
    }

    /// Ampere.
    pub const fn ampere() -> Unit {
        Unit::base(A)
    }

    /// Kelvin.
    pub const fn kelvin() -> Unit {
        Unit::base(K)
    }

    /// Mole.
    pub const fn mol() -> Unit {
        Unit::base(MOL)
    }

    /// Candela.
    pub const fn candela() -> Unit {
        Unit::base(CD)
    }

    /// Radian.
    pub const fn rad() -> Unit {
        Unit::base(RAD)
    }

    /// Degree.
    pub const fn deg() -> Unit {
        Unit::base(DEG)
    }

    /// Counts (histogram weights).
    pub const fn counts() -> Unit {
        Unit::base(COUNTS)
    }

    /// Whether this is the `none` unit.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.none
    }

    /// Whether this is the dimensionless unit (`none` is not).
    #[inline]
    pub fn is_one(&self) -> bool {
        !self.none && self.powers == [0; N_BASES]
    }

    /// Whether this unit is exactly `rad`.
    pub fn is_rad(&self) -> bool {
        *self == Unit::rad()
    }

    /// Whether this unit is exactly `deg`.
    pub fn is_deg(&self) -> bool {
        *self == Unit::deg()
    }

    /// Whether this unit is an angle (`rad` or `deg`).
    pub fn is_angle(&self) -> bool {
        self.is_rad() || self.is_deg()
    }

    /// Raise the unit to an integer power.
    ///
    /// Fails with `UnitError` if an exponent leaves the representable
    /// range.
    pub fn powi(&self, n: i32) -> Result<Unit> {
        if self.none {
            return Ok(*self);
        }
        let mut powers = [0i8; N_BASES];
        for (out, &p) in powers.iter_mut().zip(self.powers.iter()) {
            let raised = i64::from(p) * i64::from(n);
            *out = i8::try_from(raised)
                .map_err(|_| ArrayError::unit(format!("exponent overflow in {}^{}", self, n)))?;
        }
        Ok(Unit { none: false, powers })
    }

    /// The square root of the unit.
    ///
    /// Fails with `UnitError` if any exponent is odd.
    pub fn sqrt(&self) -> Result<Unit> {
        if self.none {
            return Ok(*self);
        }
        let mut powers = [0i8; N_BASES];
        for (out, &p) in powers.iter_mut().zip(self.powers.iter()) {
            if p % 2 != 0 {
                return Err(ArrayError::unit(format!("sqrt of {} is not representable", self)));
            }
            *out = p / 2;
        }
        Ok(Unit { none: false, powers })
    }

    /// The reciprocal unit.
    pub fn recip(&self) -> Unit {
        if self.none {
            return *self;
        }
        let mut powers = self.powers;
        for p in powers.iter_mut() {
            *p = -*p;
        }
        Unit { none: false, powers }
    }
}

impl Default for Unit {
    fn default() -> Unit {
        Unit::one()
    }
}

// `none` acts as the identity: it contributes no exponents, and the
// result is `none` only when both operands are.
impl Mul for Unit {
    type Output = Unit;
    fn mul(self, rhs: Unit) -> Unit {
        let mut powers = [0i8; N_BASES];
        for i in 0..N_BASES {
            powers[i] = self.powers[i] + rhs.powers[i];
        }
        Unit {
            none: self.none && rhs.none,
            powers,
        }
    }
}

impl Div for Unit {
    type Output = Unit;
    fn div(self, rhs: Unit) -> Unit {
        self * rhs.recip()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.none {
            return f.write_str("none");
        }
        let mut numer = Vec::new();
        let mut denom = Vec::new();
        for (i, &p) in self.powers.iter().enumerate() {
            if p > 0 {
                numer.push(if p == 1 {
                    BASE_NAMES[i].to_owned()
                } else {
                    format!("{}^{}", BASE_NAMES[i], p)
                });
            } else if p < 0 {
                denom.push(if p == -1 {
                    BASE_NAMES[i].to_owned()
                } else {
                    format!("{}^{}", BASE_NAMES[i], -p)
                });
            }
        }
        if numer.is_empty() && denom.is_empty() {
            return f.write_str("1");
        }
        let numer = if numer.is_empty() {
            "1".to_owned()
        } else {
            numer.join(" ")
        };
        if denom.is_empty() {
            f.write_str(&numer)
        } else if denom.len() == 1 {
            write!(f, "{}/{}", numer, denom[0])
        } else {
            write!(f, "{}/({})", numer, denom.join(" "))
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algebra() {
        assert_eq!(Unit::m() * Unit::m(), Unit::m().powi(2).unwrap());
        assert_eq!(Unit::m() / Unit::s() * Unit::s(), Unit::m());
        assert_eq!(Unit::m().powi(2).unwrap().sqrt().unwrap(), Unit::m());
        assert!(Unit::m().sqrt().is_err());
        assert_eq!(Unit::counts() * Unit::one(), Unit::counts());
    }

    #[test]
    fn none_is_identity_but_not_one() {
        assert_ne!(Unit::none(), Unit::one());
        assert_eq!(Unit::none() * Unit::m(), Unit::m());
        assert_eq!(Unit::m() / Unit::none(), Unit::m());
        assert_eq!(Unit::none() * Unit::none(), Unit::none());
    }

    #[test]
    fn to_string() {
        assert_eq!(Unit::one().to_string(), "1");
        assert_eq!(Unit::none().to_string(), "none");
        assert_eq!((Unit::m() / Unit::s()).to_string(), "m/s");
        assert_eq!(
            (Unit::m() / (Unit::s() * Unit::s())).to_string(),
            "m/s^2"
        );
        assert_eq!((Unit::one() / Unit::s()).to_string(), "1/s");
        assert_eq!(
            (Unit::kg() / (Unit::m() * Unit::s())).to_string(),
            "kg/(m s)"
        );
    }

    #[test]
    fn angles() {
        assert!(Unit::rad().is_angle());
        assert!(Unit::deg().is_angle());
        assert!(!Unit::one().is_angle());
        assert!(!(Unit::rad() * Unit::rad()).is_angle());
    }
}
