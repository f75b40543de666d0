//! Fuzz test for address decoding
//!
//! Any string must decode or fail cleanly, and a decoded address must
//! re-encode to the same string.

#![no_main]

use dagwallet_core::Address;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(address) = s.parse::<Address>() {
            assert_eq!(address.encode(), s);
        }
    }
});
