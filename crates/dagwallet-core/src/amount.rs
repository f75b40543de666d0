//! Monetary amounts and coin kinds

use crate::{Error, Result};
use dagwallet_params::{ATOMS_PER_COIN, MAX_ATOMS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Amount in atoms (1e-8 coin)
///
/// Signed so that negative inputs can be represented long enough to be
/// rejected by monetary policy, and so bill variations can be expressed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Largest amount allowed in any output
    pub const MAX: Amount = Amount(MAX_ATOMS);

    /// Create from atoms
    pub const fn from_atoms(atoms: i64) -> Self {
        Self(atoms)
    }

    /// Create from whole coins, failing on overflow
    pub fn from_coins(coins: i64) -> Result<Self> {
        coins
            .checked_mul(ATOMS_PER_COIN)
            .map(Self)
            .ok_or_else(|| Error::AmountExceedsMax(format!("{} coins", coins)))
    }

    /// Value in atoms
    pub const fn atoms(&self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Addition that reports overflow as a monetary error
    pub fn try_add(self, other: Amount) -> Result<Amount> {
        self.checked_add(other)
            .ok_or_else(|| Error::AmountExceedsMax(format!("{} + {}", self, other)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = ATOMS_PER_COIN as u64;
        write!(f, "{}{}.{:08}", sign, abs / per, abs % per)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.fold(0i64, |acc, a| acc.saturating_add(a.0)))
    }
}

/// Coin kind identifier carried by every output
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CoinId(pub u16);

impl CoinId {
    /// Native coin
    pub const MEER: CoinId = CoinId(0);

    /// Raw identifier
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CoinId::MEER => write!(f, "MEER"),
            CoinId(id) => write!(f, "COIN{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_atoms(150_000_000).to_string(), "1.50000000");
        assert_eq!(Amount::from_atoms(-1).to_string(), "-0.00000001");
        assert_eq!(Amount::MAX.to_string(), "21000000.00000000");
    }

    #[test]
    fn test_checked_math() {
        let a = Amount::from_atoms(i64::MAX);
        assert!(a.checked_add(Amount::from_atoms(1)).is_none());
        assert!(a.try_add(Amount::from_atoms(1)).is_err());
        assert_eq!(
            Amount::from_atoms(5).checked_sub(Amount::from_atoms(7)),
            Some(Amount::from_atoms(-2))
        );
    }

    #[test]
    fn test_from_coins() {
        assert_eq!(Amount::from_coins(2).unwrap().atoms(), 200_000_000);
        assert!(Amount::from_coins(i64::MAX).is_err());
    }

    #[test]
    fn test_coin_id_display() {
        assert_eq!(CoinId::MEER.to_string(), "MEER");
        assert_eq!(CoinId(7).to_string(), "COIN7");
    }
}
