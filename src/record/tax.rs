//! Fixed-point tax rate
//!
//! Tax is held in hundredths of a percent everywhere: parsing, comparison,
//! validation and the on-disk block all use the same `i64` value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CabinetError, Result};

/// Tax rate with two decimal places (`12.50` is stored as `1250`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "TaxRepr", into = "String")]
pub struct Tax(i64);

impl Tax {
    /// Number of stored units per whole percent
    pub const SCALE: i64 = 100;

    pub const ZERO: Tax = Tax(0);

    /// Build from a raw hundredths value
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Build from a whole number of percent
    pub const fn from_whole(percent: i64) -> Self {
        Self(percent * Self::SCALE)
    }

    /// Raw hundredths value
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl FromStr for Tax {
    type Err = CabinetError;

    /// Accepts `12`, `12.5`, `12.50`, `-3.25`; digits past the second
    /// decimal place round half away from zero.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CabinetError::invalid_value("tax", s);
        let text = s.trim();

        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };

        let digits = frac_part.as_bytes();
        let digit = |i: usize| digits.get(i).map(|d| i64::from(d - b'0')).unwrap_or(0);
        let mut fraction = digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            fraction += 1;
        }

        let magnitude = whole
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -magnitude } else { magnitude }))
    }
}

impl fmt::Display for Tax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{}{}.{:02}", sign, abs / scale, abs % scale)
    }
}

/// Rule files may spell tax as a string or as a JSON number
#[derive(Deserialize)]
#[serde(untagged)]
enum TaxRepr {
    Text(String),
    Number(f64),
}

impl TryFrom<TaxRepr> for Tax {
    type Error = CabinetError;

    fn try_from(repr: TaxRepr) -> Result<Self> {
        match repr {
            TaxRepr::Text(s) => s.parse(),
            TaxRepr::Number(n) => format!("{:.3}", n).parse(),
        }
    }
}

impl From<Tax> for String {
    fn from(tax: Tax) -> Self {
        tax.to_string()
    }
}
