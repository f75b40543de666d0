//! Fuzz test for the transaction wire codec

#![no_main]

use dagwallet_core::{Codec, Transaction};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(tx) = Transaction::from_bytes(data) {
        let again = Transaction::from_bytes(&tx.to_bytes()).expect("re-encoded tx decodes");
        assert_eq!(again, tx);
    }
});
