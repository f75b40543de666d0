//! Standard script templates
//!
//! Only what the wallet needs: build pay-to-address scripts, recognise
//! which hash160 an output pays, and assemble / split signature scripts.

use crate::hash::HASH160_SIZE;
use crate::{Error, Result};

/// Opcodes used by the standard templates
pub mod opcodes {
    /// Push the next 20 bytes
    pub const OP_DATA_20: u8 = 0x14;
    /// Push with a one-byte length
    pub const OP_PUSHDATA1: u8 = 0x4c;
    /// Push with a two-byte length
    pub const OP_PUSHDATA2: u8 = 0x4d;
    /// Mark output unspendable, data carrier
    pub const OP_RETURN: u8 = 0x6a;
    /// Duplicate top stack item
    pub const OP_DUP: u8 = 0x76;
    /// Equality check
    pub const OP_EQUAL: u8 = 0x87;
    /// Equality check then verify
    pub const OP_EQUALVERIFY: u8 = 0x88;
    /// hash160 of top stack item
    pub const OP_HASH160: u8 = 0xa9;
    /// Signature check
    pub const OP_CHECKSIG: u8 = 0xac;
}

use opcodes::*;

/// Largest payload a null-data output may carry
pub const MAX_NULL_DATA_SIZE: usize = 80;

/// Size of a pay-to-pubkey-hash locking script
pub const P2PKH_PK_SCRIPT_SIZE: usize = 25;

/// Size of a pay-to-script-hash locking script
pub const P2SH_PK_SCRIPT_SIZE: usize = 23;

/// Recognised script templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptClass {
    /// `DUP HASH160 <20> EQUALVERIFY CHECKSIG`
    PubKeyHash([u8; HASH160_SIZE]),
    /// `HASH160 <20> EQUAL`
    ScriptHash([u8; HASH160_SIZE]),
    /// `RETURN <data>`
    NullData,
    /// Anything else
    NonStandard,
}

impl ScriptClass {
    /// hash160 paid by this script, if any
    pub fn payee_hash(&self) -> Option<[u8; HASH160_SIZE]> {
        match self {
            ScriptClass::PubKeyHash(h) | ScriptClass::ScriptHash(h) => Some(*h),
            ScriptClass::NullData | ScriptClass::NonStandard => None,
        }
    }
}

/// Classify a locking script
pub fn classify(script: &[u8]) -> ScriptClass {
    match script {
        [OP_DUP, OP_HASH160, OP_DATA_20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
            if hash.len() == HASH160_SIZE =>
        {
            let mut h = [0u8; HASH160_SIZE];
            h.copy_from_slice(hash);
            ScriptClass::PubKeyHash(h)
        }
        [OP_HASH160, OP_DATA_20, hash @ .., OP_EQUAL] if hash.len() == HASH160_SIZE => {
            let mut h = [0u8; HASH160_SIZE];
            h.copy_from_slice(hash);
            ScriptClass::ScriptHash(h)
        }
        [OP_RETURN, rest @ ..] if is_push_only(rest) => ScriptClass::NullData,
        _ => ScriptClass::NonStandard,
    }
}

/// Whether a script can never be spent
pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

/// Pay-to-pubkey-hash locking script
pub fn pay_to_pubkey_hash(hash: &[u8; HASH160_SIZE]) -> Vec<u8> {
    let mut s = Vec::with_capacity(P2PKH_PK_SCRIPT_SIZE);
    s.extend_from_slice(&[OP_DUP, OP_HASH160, OP_DATA_20]);
    s.extend_from_slice(hash);
    s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    s
}

/// Pay-to-script-hash locking script
pub fn pay_to_script_hash(hash: &[u8; HASH160_SIZE]) -> Vec<u8> {
    let mut s = Vec::with_capacity(P2SH_PK_SCRIPT_SIZE);
    s.extend_from_slice(&[OP_HASH160, OP_DATA_20]);
    s.extend_from_slice(hash);
    s.push(OP_EQUAL);
    s
}

/// Data-carrier output script
pub fn null_data(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_NULL_DATA_SIZE {
        return Err(Error::InvalidArgument(format!(
            "null data of {} bytes exceeds {}",
            data.len(),
            MAX_NULL_DATA_SIZE
        )));
    }
    let mut s = vec![OP_RETURN];
    push_data(&mut s, data);
    Ok(s)
}

/// Append a canonical data push
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Split a push-only script into its pushes
pub fn parse_pushes(script: &[u8]) -> Option<Vec<&[u8]>> {
    let mut pushes = Vec::new();
    let mut pos = 0usize;
    while pos < script.len() {
        let op = script[pos];
        pos += 1;
        let len = match op {
            0..=0x4b => op as usize,
            OP_PUSHDATA1 => {
                let l = *script.get(pos)? as usize;
                pos += 1;
                l
            }
            OP_PUSHDATA2 => {
                let b = script.get(pos..pos + 2)?;
                pos += 2;
                u16::from_le_bytes([b[0], b[1]]) as usize
            }
            _ => return None,
        };
        pushes.push(script.get(pos..pos + len)?);
        pos += len;
    }
    Some(pushes)
}

fn is_push_only(script: &[u8]) -> bool {
    parse_pushes(script).is_some()
}

/// `<signature||hashtype> <pubkey>` unlocking script
pub fn signature_script(signature: &[u8], hash_type: u8, pubkey: &[u8]) -> Vec<u8> {
    let mut sig = Vec::with_capacity(signature.len() + 1);
    sig.extend_from_slice(signature);
    sig.push(hash_type);
    let mut s = Vec::with_capacity(sig.len() + pubkey.len() + 2);
    push_data(&mut s, &sig);
    push_data(&mut s, pubkey);
    s
}

/// Split a pay-to-pubkey-hash unlocking script into (signature, hash type, pubkey)
pub fn parse_signature_script(script: &[u8]) -> Option<(&[u8], u8, &[u8])> {
    match parse_pushes(script)?.as_slice() {
        [sig, pubkey] if !sig.is_empty() => {
            let (hash_type, der) = sig.split_last()?;
            Some((der, *hash_type, pubkey))
        }
        _ => None,
    }
}
