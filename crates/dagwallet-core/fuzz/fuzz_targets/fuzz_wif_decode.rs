//! Fuzz test for WIF private key decoding

#![no_main]

use dagwallet_core::PrivateKey;
use dagwallet_params::ChainParams;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = PrivateKey::decode_wif(s, &ChainParams::mainnet());
        let _ = PrivateKey::decode_wif(s, &ChainParams::testnet());
    }
});
