//! Core ledger primitives for sealchain.
//!
//! This crate provides the integrity machinery the rest of the workspace builds on:
//! - Cryptographic primitives (hashing, signing, addresses)
//! - Hash trees with inclusion proofs
//! - Transactions
//! - Blocks and proof-of-work sealing
//! - The canonical wire codec

pub mod block;
pub mod codec;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockHeader};
pub use codec::{decode, encode, CodecError};
pub use crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, leading_zero_digits, meets_difficulty, Hash, H256};
pub use merkle::{leaf_hash, verify_proof, HashTree};
pub use transaction::{Transaction, TransactionError};
