//! Monetary policy: dust, relay fees and size estimates
//!
//! Every amount here is in atoms. Fee rates are atoms per 1000 bytes.

use crate::codec::varint_size;
use crate::script::{self, ScriptClass};
use crate::transaction::TxOutput;
use crate::{Amount, Error, Result};

/// Relay fee rate used when the caller does not supply one
pub const DEFAULT_RELAY_FEE_PER_KB: i64 = 1_000;

/// Unlocking script for a pay-to-pubkey-hash input, worst case
///
/// `<push 73: DER sig (max 72) + hash type> <push 33: compressed pubkey>`
pub const REDEEM_P2PKH_SIG_SCRIPT_SIZE: usize = 1 + 73 + 1 + 33;

/// Input prefix bytes plus the witness for a pay-to-pubkey-hash redeem
pub const REDEEM_P2PKH_INPUT_SIZE: usize = 32 + 4 + 4 + 1 + REDEEM_P2PKH_SIG_SCRIPT_SIZE;

/// Serialized size of a pay-to-pubkey-hash output
pub const P2PKH_OUTPUT_SIZE: usize = 8 + 2 + 1 + script::P2PKH_PK_SCRIPT_SIZE;

/// Cost of redeeming an output, used by the dust rule
const DUST_REDEEM_COST: i64 = 148;

/// Smallest output value worth creating for a locking script of `script_size` bytes
///
/// An output is dust when spending it would cost more than a third of its
/// value at the given relay fee rate.
pub fn dust_threshold(script_size: usize, fee_per_kb: i64) -> Amount {
    let total_size =
        8 + varint_size(script_size as u64) as i64 + script_size as i64 + DUST_REDEEM_COST;
    let per_byte = fee_per_kb / 1000;
    Amount::from_atoms(per_byte.saturating_mul(total_size).saturating_mul(3))
}

/// Whether `amount` paid to `pk_script` is dust
pub fn is_dust_amount(amount: Amount, pk_script: &[u8], fee_per_kb: i64) -> bool {
    amount < dust_threshold(pk_script.len(), fee_per_kb)
}

/// Whether an output is dust; null-data outputs never are
pub fn is_dust_output(output: &TxOutput, fee_per_kb: i64) -> bool {
    if script::classify(&output.pk_script) == ScriptClass::NullData {
        return false;
    }
    if script::is_unspendable(&output.pk_script) {
        return true;
    }
    is_dust_amount(output.amount, &output.pk_script, fee_per_kb)
}

/// Reject outputs the wallet must never create
pub fn check_output(output: &TxOutput, fee_per_kb: i64) -> Result<()> {
    if output.amount.is_negative() {
        return Err(Error::NegativeAmount(output.amount.to_string()));
    }
    if output.amount > Amount::MAX {
        return Err(Error::AmountExceedsMax(output.amount.to_string()));
    }
    if is_dust_output(output, fee_per_kb) {
        return Err(Error::OutputIsDust(format!(
            "{} below threshold {}",
            output.amount,
            dust_threshold(output.pk_script.len(), fee_per_kb)
        )));
    }
    Ok(())
}

/// Fee for a transaction of `size` bytes
///
/// Rounds up, never returns zero for a positive rate, and saturates at the
/// largest valid amount.
pub fn fee_for_serialize_size(fee_per_kb: i64, size: usize) -> Amount {
    let size = match i64::try_from(size) {
        Ok(size) => size,
        Err(_) => return Amount::MAX,
    };
    let fee = match fee_per_kb.checked_mul(size) {
        Some(product) if product >= 0 => product / 1000 + i64::from(product % 1000 != 0),
        _ => return Amount::MAX,
    };
    let fee = if fee == 0 && fee_per_kb > 0 {
        fee_per_kb
    } else {
        fee
    };
    if fee > Amount::MAX.atoms() {
        return Amount::MAX;
    }
    Amount::from_atoms(fee)
}

/// Worst-case serialized size of a transaction spending `input_count`
/// pay-to-pubkey-hash outputs into `outputs`, plus an optional change output
pub fn estimate_serialize_size(input_count: usize, outputs: &[TxOutput], add_change: bool) -> usize {
    let output_count = outputs.len() + usize::from(add_change);
    let change_size = if add_change { P2PKH_OUTPUT_SIZE } else { 0 };
    4 + varint_size(input_count as u64)
        + input_count * REDEEM_P2PKH_INPUT_SIZE
        + varint_size(output_count as u64)
        + outputs.iter().map(TxOutput::serialize_size).sum::<usize>()
        + change_size
        + 4
        + 8
        + varint_size(input_count as u64)
}
