//! Transaction input signing

use crate::keys::{verify_signature, PrivateKey};
use crate::script::{self, ScriptClass};
use crate::transaction::{Transaction, SIGHASH_ALL};
use crate::{Error, Result};

/// Supplies private keys for the outputs a transaction spends
pub trait SecretsSource {
    /// Private key whose public key hashes to `pubkey_hash`
    fn private_key(&self, pubkey_hash: &[u8; 20]) -> Result<PrivateKey>;
}

/// Sign every input of `tx`
///
/// `prev_scripts[i]` is the locking script of the output spent by input `i`.
/// Only pay-to-pubkey-hash outputs can be signed.
pub fn sign_transaction(
    tx: &mut Transaction,
    prev_scripts: &[Vec<u8>],
    secrets: &dyn SecretsSource,
) -> Result<()> {
    if prev_scripts.len() != tx.inputs.len() {
        return Err(Error::InvalidArgument(format!(
            "{} previous scripts for {} inputs",
            prev_scripts.len(),
            tx.inputs.len()
        )));
    }

    let mut sig_scripts = Vec::with_capacity(tx.inputs.len());
    for (index, prev_script) in prev_scripts.iter().enumerate() {
        let ScriptClass::PubKeyHash(pubkey_hash) = script::classify(prev_script) else {
            return Err(Error::InvalidArgument(format!(
                "input {} spends a non pay-to-pubkey-hash output",
                index
            )));
        };
        let key = secrets.private_key(&pubkey_hash)?;
        let digest = tx.signature_hash(index, prev_script)?;
        let der = key.sign(&digest)?;
        sig_scripts.push(script::signature_script(
            &der,
            SIGHASH_ALL as u8,
            &key.public_key_bytes(),
        ));
    }

    for (input, sig_script) in tx.inputs.iter_mut().zip(sig_scripts) {
        input.sig_script = sig_script;
    }
    Ok(())
}

/// Check the signature script of input `index` against the spent output
pub fn verify_input(tx: &Transaction, index: usize, prev_script: &[u8]) -> bool {
    let Some(input) = tx.inputs.get(index) else {
        return false;
    };
    let ScriptClass::PubKeyHash(expected) = script::classify(prev_script) else {
        return false;
    };
    let Some((der, hash_type, pubkey)) = script::parse_signature_script(&input.sig_script) else {
        return false;
    };
    if hash_type != SIGHASH_ALL as u8 || crate::hash::hash160(pubkey) != expected {
        return false;
    }
    match tx.signature_hash(index, prev_script) {
        Ok(digest) => verify_signature(pubkey, &digest, der),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash160, Hash256};
    use crate::transaction::{OutPoint, TxInput, TxOutput};
    use crate::Amount;
    use std::collections::HashMap;

    struct Keys(HashMap<[u8; 20], PrivateKey>);

    impl SecretsSource for Keys {
        fn private_key(&self, pubkey_hash: &[u8; 20]) -> Result<PrivateKey> {
            self.0
                .get(pubkey_hash)
                .cloned()
                .ok_or_else(|| Error::AddressNotFound(hex::encode(pubkey_hash)))
        }
    }

    #[test]
    fn test_sign_and_verify_inputs() {
        let key = PrivateKey::generate();
        let pkh = hash160(&key.public_key_bytes());
        let prev = script::pay_to_pubkey_hash(&pkh);

        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([1u8; 32]), 0)));
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([2u8; 32]), 1)));
        tx.outputs.push(TxOutput::new(Amount::from_atoms(10), prev.clone()));

        let secrets = Keys(HashMap::from([(pkh, key)]));
        let before = tx.tx_hash();
        sign_transaction(&mut tx, &[prev.clone(), prev.clone()], &secrets).unwrap();

        assert_eq!(tx.tx_hash(), before);
        assert!(verify_input(&tx, 0, &prev));
        assert!(verify_input(&tx, 1, &prev));

        tx.outputs[0].amount = Amount::from_atoms(11);
        assert!(!verify_input(&tx, 0, &prev));
    }

    #[test]
    fn test_missing_key() {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([1u8; 32]), 0)));
        let prev = script::pay_to_pubkey_hash(&[9u8; 20]);
        let err = sign_transaction(&mut tx, &[prev], &Keys(HashMap::new())).unwrap_err();
        assert!(matches!(err, Error::AddressNotFound(_)));
        assert!(tx.inputs[0].sig_script.is_empty());
    }

    #[test]
    fn test_non_standard_prev_script() {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(OutPoint::new(Hash256([1u8; 32]), 0)));
        let err = sign_transaction(&mut tx, &[vec![0x51]], &Keys(HashMap::new())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
