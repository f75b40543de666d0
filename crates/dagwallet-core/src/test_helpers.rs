//! Fixtures shared by the test suites of every wallet crate

use crate::block::{Block, BlockMeta};
use crate::hash::Hash256;
use crate::transaction::{OutPoint, Transaction, TxInput, TxOutput};
use crate::Amount;
use crate::address::Address;

/// Mnemonic used by deterministic tests
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Output paying `atoms` to `address`
pub fn pay_to(address: &Address, atoms: i64) -> TxOutput {
    TxOutput::new(Amount::from_atoms(atoms), address.pay_script())
}

/// Transaction funded from a foreign outpoint identified by `nonce`
pub fn funding_tx(nonce: u8, outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction::new();
    tx.timestamp = 1_700_000_000 + i64::from(nonce);
    tx.inputs
        .push(TxInput::new(OutPoint::new(Hash256([nonce; 32]), u32::from(nonce))));
    tx.outputs = outputs;
    tx
}

/// Transaction spending `prev` into `outputs`
pub fn spending_tx(prev: &[OutPoint], outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction::new();
    tx.timestamp = 1_700_100_000 + prev.len() as i64;
    tx.inputs = prev.iter().copied().map(TxInput::new).collect();
    tx.outputs = outputs;
    tx
}

/// Coinbase transaction at `height`
pub fn coinbase_tx(height: i32, outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction::new();
    tx.timestamp = 1_600_000_000 + i64::from(height);
    let mut input = TxInput::new(OutPoint::null());
    input.sig_script = height.to_le_bytes().to_vec();
    tx.inputs.push(input);
    tx.outputs = outputs;
    tx
}

/// Deterministic hash for the block at `height`
pub fn block_hash(height: i32) -> Hash256 {
    Hash256::double_hash(&height.to_le_bytes())
}

/// Block metadata at `height`
pub fn block_meta(height: i32) -> BlockMeta {
    BlockMeta::new(height, block_hash(height), 1_600_000_000 + i64::from(height) * 30)
}

/// Block at `height` holding `transactions`
pub fn block(height: i32, transactions: Vec<Transaction>) -> Block {
    Block::new(block_meta(height), transactions)
}
