//! DAG wallet core
//!
//! Chain-agnostic building blocks of the wallet engine: the error taxonomy,
//! amounts, hashing, the versioned record codec, the transaction model,
//! standard scripts and addresses, HD keys and signing, monetary policy and
//! UTXO selection. Nothing here touches storage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod amount;
pub mod block;
pub mod codec;
pub mod error;
pub mod hash;
pub mod keys;
pub mod script;
pub mod selection;
pub mod signer;
pub mod transaction;
pub mod txrules;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use address::Address;
pub use amount::{Amount, CoinId};
pub use block::{Block, BlockMeta, BlockStamp, UNMINED_HEIGHT};
pub use codec::{Codec, Decoder, Encoder};
pub use error::{Error, ErrorCategory, Result};
pub use hash::{hash160, Hash256, HASH160_SIZE, HASH_SIZE};
pub use keys::{ExtendedPrivateKey, ExtendedPublicKey, PrivateKey};
pub use selection::{SelectableOutput, SelectionResult, SelectionStrategy, UtxoSelector};
pub use signer::SecretsSource;
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use txrules::DEFAULT_RELAY_FEE_PER_KB;
