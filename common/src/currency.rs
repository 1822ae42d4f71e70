use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// USDC token precision: 1 USDC = 1_000_000 micro-USDC.
pub const MICRO_USDC_PER_USDC: u64 = 1_000_000;

const USDC_DECIMALS: usize = 6;

/// Errors from parsing or constructing an amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must be positive")]
    NotPositive,
    #[error("invalid amount '{0}'")]
    Malformed(String),
    #[error("amount '{0}' has more than 6 decimal places")]
    TooPrecise(String),
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

/// A strictly positive USDC amount. Stored internally in micro-USDC so that
/// decimal input like "4.99" never passes through a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct UsdcAmount(NonZeroU64);

impl UsdcAmount {
    pub fn from_micros(micros: u64) -> Result<Self, AmountError> {
        NonZeroU64::new(micros)
            .map(Self)
            .ok_or(AmountError::NotPositive)
    }

    pub fn from_whole(usdc: u64) -> Result<Self, AmountError> {
        let micros = usdc
            .checked_mul(MICRO_USDC_PER_USDC)
            .ok_or_else(|| AmountError::Overflow(usdc.to_string()))?;
        Self::from_micros(micros)
    }

    pub fn micros(self) -> u64 {
        self.0.get()
    }
}

impl FromStr for UsdcAmount {
    type Err = AmountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.starts_with('-') {
            return Err(AmountError::NotPositive);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Malformed(input.to_string()));
        }
        if frac.len() > USDC_DECIMALS {
            return Err(AmountError::TooPrecise(input.to_string()));
        }

        let overflow = || AmountError::Overflow(input.to_string());
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        // Right-pad the fraction to six digits: "5" -> 500000, "" -> 0.
        let frac: u64 = format!("{:0<width$}", frac, width = USDC_DECIMALS)
            .parse()
            .map_err(|_| AmountError::Malformed(input.to_string()))?;

        let micros = whole
            .checked_mul(MICRO_USDC_PER_USDC)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(overflow)?;
        Self::from_micros(micros)
    }
}

impl TryFrom<u64> for UsdcAmount {
    type Error = AmountError;

    fn try_from(micros: u64) -> Result<Self, Self::Error> {
        Self::from_micros(micros)
    }
}

impl From<UsdcAmount> for u64 {
    fn from(amount: UsdcAmount) -> u64 {
        amount.micros()
    }
}

impl fmt::Display for UsdcAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.micros() / MICRO_USDC_PER_USDC;
        let frac = format!("{:06}", self.micros() % MICRO_USDC_PER_USDC);
        let trimmed = frac.trim_end_matches('0');
        if trimmed.len() <= 2 {
            write!(f, "{whole}.{} USDC", &frac[..2])
        } else {
            write!(f, "{whole}.{trimmed} USDC")
        }
    }
}
