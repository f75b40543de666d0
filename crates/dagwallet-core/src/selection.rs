//! Unspent output selection for transaction building
//!
//! Implements the selection strategies: first-fit, smallest-first,
//! largest-first, oldest-first. The fee is re-evaluated as inputs are added
//! because every input grows the transaction.

use crate::hash::HASH160_SIZE;
use crate::transaction::OutPoint;
use crate::{Amount, CoinId, Error, Result};

/// Unspent output available to fund a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectableOutput {
    /// Output being offered
    pub outpoint: OutPoint,
    /// Value in atoms
    pub amount: Amount,
    /// Coin kind
    pub coin_id: CoinId,
    /// Height of the block holding it, -1 if unmined
    pub height: i32,
    /// hash160 the output pays to
    pub address_hash: [u8; HASH160_SIZE],
    /// Locking script
    pub pk_script: Vec<u8>,
}

/// Selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// In the order given
    FirstFit,
    /// Smallest outputs first (consolidates dust-adjacent outputs)
    SmallestFirst,
    /// Largest outputs first (fewest inputs)
    LargestFirst,
    /// Oldest outputs first
    OldestFirst,
}

/// Selection result
#[derive(Debug)]
pub struct SelectionResult {
    /// Selected outputs
    pub inputs: Vec<SelectableOutput>,
    /// Total value of selected outputs
    pub total_value: Amount,
    /// Fee for the selected input count
    pub fee: Amount,
    /// `total_value - target - fee`
    pub change: Amount,
}

/// UTXO selector
#[derive(Debug, Clone, Copy)]
pub struct UtxoSelector {
    strategy: SelectionStrategy,
}

impl UtxoSelector {
    /// Create selector with strategy
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self { strategy }
    }

    /// Select outputs covering `target` plus `fee_for_inputs(n)` for the
    /// number `n` of inputs chosen so far
    pub fn select<F>(
        &self,
        mut available: Vec<SelectableOutput>,
        target: Amount,
        fee_for_inputs: F,
    ) -> Result<SelectionResult>
    where
        F: Fn(usize) -> Amount,
    {
        if target.is_negative() {
            return Err(Error::NegativeAmount(target.to_string()));
        }
        self.sort(&mut available);

        let mut selected = Vec::new();
        let mut total = Amount::ZERO;
        let mut required = target.try_add(fee_for_inputs(0))?;

        for output in available {
            if total >= required {
                break;
            }
            total = total.try_add(output.amount)?;
            selected.push(output);
            required = target.try_add(fee_for_inputs(selected.len()))?;
        }

        if total < required {
            return Err(Error::InsufficientFunds(format!(
                "required {}, have {}",
                required, total
            )));
        }

        let fee = fee_for_inputs(selected.len());
        let change = Amount::from_atoms(total.atoms() - required.atoms());
        tracing::debug!(
            "Selected {} outputs, total={}, fee={}, change={}",
            selected.len(),
            total,
            fee,
            change
        );

        Ok(SelectionResult {
            inputs: selected,
            total_value: total,
            fee,
            change,
        })
    }

    fn sort(&self, outputs: &mut [SelectableOutput]) {
        match self.strategy {
            SelectionStrategy::FirstFit => {}
            SelectionStrategy::SmallestFirst => outputs.sort_by_key(|o| o.amount),
            SelectionStrategy::LargestFirst => outputs.sort_by(|a, b| b.amount.cmp(&a.amount)),
            // unmined outputs go last
            SelectionStrategy::OldestFirst => {
                outputs.sort_by_key(|o| if o.height < 0 { i32::MAX } else { o.height })
            }
        }
    }

    /// Sum of all offered outputs
    pub fn total_available(outputs: &[SelectableOutput]) -> Amount {
        outputs.iter().map(|o| o.amount).sum()
    }
}

impl Default for UtxoSelector {
    fn default() -> Self {
        Self::new(SelectionStrategy::LargestFirst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash256;

    fn output(amount: i64, height: i32, n: u8) -> SelectableOutput {
        SelectableOutput {
            outpoint: OutPoint::new(Hash256([n; 32]), 0),
            amount: Amount::from_atoms(amount),
            coin_id: CoinId::MEER,
            height,
            address_hash: [n; 20],
            pk_script: Vec::new(),
        }
    }

    fn outputs() -> Vec<SelectableOutput> {
        vec![
            output(100_000, 1000, 1),
            output(500_000, 1001, 2),
            output(250_000, 999, 3),
            output(1_000_000, -1, 4),
        ]
    }

    #[test]
    fn test_largest_first() {
        let selector = UtxoSelector::new(SelectionStrategy::LargestFirst);
        let result = selector
            .select(outputs(), Amount::from_atoms(300_000), |_| Amount::from_atoms(10_000))
            .unwrap();
        assert_eq!(result.inputs.len(), 1);
        assert_eq!(result.inputs[0].amount.atoms(), 1_000_000);
        assert_eq!(result.change.atoms(), 690_000);
    }

    #[test]
    fn test_smallest_first() {
        let selector = UtxoSelector::new(SelectionStrategy::SmallestFirst);
        let result = selector
            .select(outputs(), Amount::from_atoms(300_000), |_| Amount::from_atoms(10_000))
            .unwrap();
        assert_eq!(result.inputs.len(), 2);
        assert_eq!(result.total_value.atoms(), 350_000);
        assert_eq!(result.change.atoms(), 40_000);
    }

    #[test]
    fn test_oldest_first_puts_unmined_last() {
        let selector = UtxoSelector::new(SelectionStrategy::OldestFirst);
        let result = selector
            .select(outputs(), Amount::from_atoms(1_800_000), |_| Amount::ZERO)
            .unwrap();
        let heights: Vec<i32> = result.inputs.iter().map(|o| o.height).collect();
        assert_eq!(heights, vec![999, 1000, 1001, -1]);
    }

    #[test]
    fn test_fee_grows_with_inputs() {
        let selector = UtxoSelector::new(SelectionStrategy::FirstFit);
        let available = vec![output(600, 1, 1), output(600, 1, 2), output(600, 1, 3)];
        // one input covers 500 but not 500 + 200
        let result = selector
            .select(available, Amount::from_atoms(500), |n| {
                Amount::from_atoms(100 + 100 * n as i64)
            })
            .unwrap();
        assert_eq!(result.inputs.len(), 2);
        assert_eq!(result.fee.atoms(), 300);
        assert_eq!(result.change.atoms(), 400);
    }

    #[test]
    fn test_insufficient_funds() {
        let selector = UtxoSelector::default();
        let err = selector
            .select(outputs(), Amount::from_atoms(5_000_000), |_| Amount::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));
        assert_eq!(UtxoSelector::total_available(&outputs()).atoms(), 1_850_000);
    }

    #[test]
    fn test_exact_amount() {
        let selector = UtxoSelector::new(SelectionStrategy::FirstFit);
        let result = selector
            .select(vec![output(100_000, 5, 1)], Amount::from_atoms(90_000), |_| {
                Amount::from_atoms(10_000)
            })
            .unwrap();
        assert_eq!(result.change, Amount::ZERO);
    }
}
