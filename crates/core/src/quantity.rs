//! Fixed-point quantity with four decimal places.
//!
//! Stored as an `i64` count of ten-thousandths of a unit, so arithmetic is
//! exact and the canonical 4-decimal string form round-trips without loss.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const SCALE: i64 = 10_000;
const DECIMALS: usize = 4;

/// Exact stock quantity (4 decimal places).
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    /// Quantity from whole units (e.g. `from_units(5)` is `5.0000`).
    pub fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(SCALE))
    }

    /// Quantity from raw ten-thousandths.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl fmt::Display for Quantity {
    /// Canonical fixed 4-decimal rendering, e.g. `12.5` -> `"12.5000"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / SCALE as u64,
            abs % SCALE as u64,
            width = DECIMALS
        )
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid quantity: '{s}'"));

        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac_part.len() > DECIMALS || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let int: i64 = int_part.parse().map_err(|_| invalid())?;
        let frac: i64 = if frac_part.is_empty() {
            0
        } else {
            // Right-pad to four digits: "5" -> 5000 ten-thousandths.
            let padded = format!("{frac_part:0<DECIMALS$}");
            padded.parse().map_err(|_| invalid())?
        };

        let raw = int
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(invalid)?;

        Ok(Quantity(if negative { -raw } else { raw }))
    }
}
