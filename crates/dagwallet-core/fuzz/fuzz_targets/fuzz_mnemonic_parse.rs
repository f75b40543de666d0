//! Fuzz test for mnemonic parsing
//!
//! Ensures mnemonic parser handles arbitrary input gracefully

#![no_main]

use dagwallet_core::keys::seed_from_mnemonic;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = seed_from_mnemonic(s, "");

        if data.len() > 10 {
            if let Ok(pass) = std::str::from_utf8(&data[..10]) {
                let _ = seed_from_mnemonic(s, pass);
            }
        }
    }
});
