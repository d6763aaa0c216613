//! Chain orchestration for sealchain.
//!
//! This crate ties the lower layers into a working ledger:
//! - **Blockchain**: append-only, proof-of-work sealed block list
//! - **Mempool**: pool of signed transactions waiting to be mined
//! - **Logging**: `tracing` subscriber setup for binaries embedding the chain
//!
//! # Example
//!
//! ```rust
//! use sealchain_chain::{Blockchain, BlockchainConfig, Mempool};
//! use sealchain_core::{Address, Keypair, Transaction};
//!
//! let chain = Blockchain::with_config(BlockchainConfig::with_difficulty(1));
//! let alice = Keypair::generate();
//!
//! let mut pool = Mempool::new();
//! let tx = Transaction::new(alice.address(), Address::from_bytes([7u8; 32]), 10)
//!     .signed(&alice)
//!     .unwrap();
//! pool.add(tx).unwrap();
//!
//! chain.mine_pending(&mut pool, alice.address()).unwrap();
//! assert_eq!(chain.len(), 2);
//! assert!(chain.is_valid_chain());
//! ```

pub mod blockchain;
pub mod logging;
pub mod mempool;

// Re-export commonly used types
pub use blockchain::{Blockchain, BlockchainConfig, BlockchainError, BlockchainStats};
pub use logging::{init_logging, try_init_logging, LogFormat};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats, SharedMempool};
