//! UTXO transaction model and wire format
//!
//! Wire layout: the *prefix* (version, inputs without signature scripts,
//! outputs, lock time, timestamp) followed by the *witness* (one signature
//! script per input). The transaction hash commits to the prefix only, so
//! signing never changes a transaction's identity.

use crate::codec::{varint_size, Codec, Decoder, Encoder};
use crate::hash::{Hash256, HASH_SIZE};
use crate::{Amount, CoinId, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current transaction version
pub const TX_VERSION: u32 = 1;

/// Sign every input and output
pub const SIGHASH_ALL: u32 = 1;

/// Default input sequence
pub const MAX_SEQUENCE: u32 = u32::MAX;

/// Reference to one output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the funding transaction
    pub hash: Hash256,
    /// Output index within it
    pub index: u32,
}

impl OutPoint {
    /// Create an outpoint
    pub const fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    /// The outpoint coinbase inputs reference
    pub const fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// Whether this is the coinbase marker
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash.is_zero()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Output being spent
    pub previous_output: OutPoint,
    /// Sequence number
    pub sequence: u32,
    /// Unlocking script, empty until signed
    pub sig_script: Vec<u8>,
}

impl TxInput {
    /// Unsigned input spending `previous_output`
    pub fn new(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            sequence: MAX_SEQUENCE,
            sig_script: Vec::new(),
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in atoms
    pub amount: Amount,
    /// Coin kind
    pub coin_id: CoinId,
    /// Locking script
    pub pk_script: Vec<u8>,
}

impl TxOutput {
    /// Output of the native coin
    pub fn new(amount: Amount, pk_script: Vec<u8>) -> Self {
        Self {
            amount,
            coin_id: CoinId::MEER,
            pk_script,
        }
    }

    /// Serialized size of this output
    pub fn serialize_size(&self) -> usize {
        8 + 2 + varint_size(self.pk_script.len() as u64) + self.pk_script.len()
    }
}

/// A transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Format version
    pub version: u32,
    /// Inputs
    pub inputs: Vec<TxInput>,
    /// Outputs
    pub outputs: Vec<TxOutput>,
    /// Lock time
    pub lock_time: u32,
    /// Creation time (unix seconds)
    pub timestamp: i64,
}

const INPUT_PREFIX_SIZE: usize = HASH_SIZE + 4 + 4;
const MIN_OUTPUT_SIZE: usize = 8 + 2 + 1;

impl Transaction {
    /// Empty transaction stamped with the current time
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Whether this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Transaction hash (commits to the prefix only)
    pub fn tx_hash(&self) -> Hash256 {
        let mut enc = Encoder::with_capacity(self.prefix_size());
        self.encode_prefix(&mut enc);
        Hash256::double_hash(&enc.finish())
    }

    /// Full serialized size including signature scripts
    pub fn serialize_size(&self) -> usize {
        self.prefix_size()
            + varint_size(self.inputs.len() as u64)
            + self
                .inputs
                .iter()
                .map(|i| varint_size(i.sig_script.len() as u64) + i.sig_script.len())
                .sum::<usize>()
    }

    fn prefix_size(&self) -> usize {
        4 + varint_size(self.inputs.len() as u64)
            + self.inputs.len() * INPUT_PREFIX_SIZE
            + varint_size(self.outputs.len() as u64)
            + self.outputs.iter().map(TxOutput::serialize_size).sum::<usize>()
            + 4
            + 8
    }

    fn encode_prefix(&self, enc: &mut Encoder) {
        enc.put_u32(self.version);
        enc.put_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            enc.put_fixed(input.previous_output.hash.as_bytes());
            enc.put_u32(input.previous_output.index);
            enc.put_u32(input.sequence);
        }
        enc.put_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            enc.put_i64(output.amount.atoms());
            enc.put_u16(output.coin_id.as_u16());
            enc.put_var_bytes(&output.pk_script);
        }
        enc.put_u32(self.lock_time);
        enc.put_i64(self.timestamp);
    }

    /// Digest signed by input `index` under `SIGHASH_ALL`
    ///
    /// Commits to the whole prefix, the input position and the script of the
    /// output being spent.
    pub fn signature_hash(&self, index: usize, prev_pk_script: &[u8]) -> Result<[u8; HASH_SIZE]> {
        if index >= self.inputs.len() {
            return Err(Error::InvalidArgument(format!(
                "input index {} out of range ({} inputs)",
                index,
                self.inputs.len()
            )));
        }
        let mut enc = Encoder::with_capacity(self.prefix_size() + prev_pk_script.len() + 16);
        self.encode_prefix(&mut enc);
        enc.put_u32(index as u32);
        enc.put_var_bytes(prev_pk_script);
        enc.put_u32(SIGHASH_ALL);
        Ok(Hash256::double_hash(&enc.finish()).0)
    }

    /// Sum of output amounts of one coin kind
    pub fn output_total(&self, coin_id: CoinId) -> Result<Amount> {
        self.outputs
            .iter()
            .filter(|o| o.coin_id == coin_id)
            .try_fold(Amount::ZERO, |acc, o| acc.try_add(o.amount))
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Transaction {
    fn encode(&self, enc: &mut Encoder) {
        self.encode_prefix(enc);
        enc.put_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            enc.put_var_bytes(&input.sig_script);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let version = dec.u32()?;
        let input_count = dec.count(INPUT_PREFIX_SIZE)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let hash = Hash256(dec.fixed()?);
            let index = dec.u32()?;
            let sequence = dec.u32()?;
            inputs.push(TxInput {
                previous_output: OutPoint::new(hash, index),
                sequence,
                sig_script: Vec::new(),
            });
        }
        let output_count = dec.count(MIN_OUTPUT_SIZE)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let amount = Amount::from_atoms(dec.i64()?);
            let coin_id = CoinId(dec.u16()?);
            let pk_script = dec.var_bytes()?;
            outputs.push(TxOutput {
                amount,
                coin_id,
                pk_script,
            });
        }
        let lock_time = dec.u32()?;
        let timestamp = dec.i64()?;

        let witness_count = dec.varint()?;
        if witness_count != inputs.len() as u64 {
            return Err(Error::Codec(format!(
                "witness count {} does not match {} inputs",
                witness_count,
                inputs.len()
            )));
        }
        for input in inputs.iter_mut() {
            input.sig_script = dec.var_bytes()?;
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        let mut tx = Transaction::new();
        tx.timestamp = 1_700_000_000;
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([7u8; 32]), 3)));
        tx.outputs.push(TxOutput::new(Amount::from_atoms(5_000), vec![0x51; 25]));
        tx.outputs.push(TxOutput {
            amount: Amount::from_atoms(42),
            coin_id: CoinId(2),
            pk_script: vec![0x6a],
        });
        tx
    }

    #[test]
    fn test_decode_matches_encode() {
        let mut tx = sample_tx();
        tx.inputs[0].sig_script = vec![1, 2, 3];
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), tx.serialize_size());
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn test_hash_ignores_signatures() {
        let unsigned = sample_tx();
        let mut signed = unsigned.clone();
        signed.inputs[0].sig_script = vec![9; 70];
        assert_eq!(unsigned.tx_hash(), signed.tx_hash());
        assert_ne!(unsigned.serialize_size(), signed.serialize_size());
    }

    #[test]
    fn test_hash_commits_to_outputs() {
        let a = sample_tx();
        let mut b = a.clone();
        b.outputs[0].amount = Amount::from_atoms(5_001);
        assert_ne!(a.tx_hash(), b.tx_hash());
    }

    #[test]
    fn test_signature_hash_per_input() {
        let mut tx = sample_tx();
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([8u8; 32]), 0)));
        let h0 = tx.signature_hash(0, &[0x51]).unwrap();
        let h1 = tx.signature_hash(1, &[0x51]).unwrap();
        assert_ne!(h0, h1);
        assert!(tx.signature_hash(2, &[]).is_err());
    }

    #[test]
    fn test_coinbase_detection() {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(OutPoint::null()));
        assert!(tx.is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn test_output_total_by_coin() {
        let tx = sample_tx();
        assert_eq!(tx.output_total(CoinId::MEER).unwrap().atoms(), 5_000);
        assert_eq!(tx.output_total(CoinId(2)).unwrap().atoms(), 42);
    }

    #[test]
    fn test_witness_count_mismatch_rejected() {
        let mut bytes = sample_tx().to_bytes();
        let last = bytes.len() - 2;
        bytes[last] = 2;
        assert!(Transaction::from_bytes(&bytes).is_err());
    }
}
