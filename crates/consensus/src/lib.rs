//! Proof-of-work consensus rules for sealchain.
//!
//! This crate provides:
//! - A cancellable proof-of-work miner
//! - Seal checks against a difficulty target
//! - Transaction batch, block link and whole-chain validation
//!
//! # Example
//!
//! ```rust
//! use sealchain_consensus::{CancelToken, ChainValidator, Miner, PowConfig};
//! use sealchain_core::Block;
//!
//! let miner = Miner::new(PowConfig::with_difficulty(1));
//! let mut genesis = Block::genesis(0);
//! miner.mine(&mut genesis, &CancelToken::new()).unwrap();
//!
//! assert!(miner.verify_seal(&genesis).is_ok());
//! assert!(ChainValidator::is_valid(&[genesis]));
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{CancelToken, Miner, MiningStats, PowConfig, PowError};
pub use validator::{
    BlockValidator, ChainIntegrityViolation, ChainValidator, TransactionValidator,
    ValidationError,
};
