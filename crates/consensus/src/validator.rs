//! Transaction, block and chain validation rules.
//!
//! Each check has a `Result` form carrying the reason and, where callers
//! only need a yes/no answer, a boolean form built on top of it.

use sealchain_core::{Block, Hash, Transaction, TransactionError};
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction {position} ({hash}) is invalid: {source}")]
    InvalidTransaction {
        position: usize,
        hash: Hash,
        #[source]
        source: TransactionError,
    },

    #[error("block height mismatch (expected {expected}, got {got})")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("block prev_hash mismatch")]
    InvalidPrevHash,

    #[error("block {index} hash does not match its contents")]
    TamperedBlock { index: u64 },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// A broken invariant found while scanning a whole chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainIntegrityViolation {
    #[error("chain has no blocks")]
    Empty,

    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: usize },

    #[error("block {index} hash does not match its contents")]
    BadSeal { index: usize },
}

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Validate a single transaction at `position` within its batch.
    pub fn validate_transaction(tx: &Transaction, position: usize) -> Result<()> {
        tx.verify()
            .map_err(|source| ValidationError::InvalidTransaction {
                position,
                hash: tx.hash,
                source,
            })
    }

    /// Validate every transaction of a batch, stopping at the first failure.
    pub fn validate_batch(transactions: &[Transaction]) -> Result<()> {
        for (position, tx) in transactions.iter().enumerate() {
            Self::validate_transaction(tx, position)?;
        }
        Ok(())
    }
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Validate all transactions committed by the block.
    pub fn validate_transactions(block: &Block) -> Result<()> {
        TransactionValidator::validate_batch(block.transactions())
    }

    /// Validate block extends the parent correctly.
    pub fn validate_link(block: &Block, parent: &Block) -> Result<()> {
        let expected = parent.index() + 1;
        if block.index() != expected {
            return Err(ValidationError::InvalidHeight {
                expected,
                got: block.index(),
            });
        }

        if block.header.prev_hash != parent.hash {
            return Err(ValidationError::InvalidPrevHash);
        }

        Ok(())
    }

    /// Validate the stored hash matches the block contents.
    pub fn validate_seal(block: &Block) -> Result<()> {
        if !block.is_valid() {
            return Err(ValidationError::TamperedBlock {
                index: block.index(),
            });
        }
        Ok(())
    }

    /// Full block validation (transactions + parent link + seal).
    pub fn validate_full(block: &Block, parent: &Block) -> Result<()> {
        Self::validate_transactions(block)?;
        Self::validate_link(block, parent)?;
        Self::validate_seal(block)?;
        Ok(())
    }
}

/// Whole-chain validator.
pub struct ChainValidator;

impl ChainValidator {
    /// Scan blocks `1..` for link continuity and seal correctness.
    ///
    /// Genesis is trusted as-is. Reports the first violation found.
    pub fn verify(blocks: &[Block]) -> std::result::Result<(), ChainIntegrityViolation> {
        if blocks.is_empty() {
            return Err(ChainIntegrityViolation::Empty);
        }

        for (index, pair) in blocks.windows(2).enumerate() {
            let (prev, block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if block.header.prev_hash != prev.hash {
                return Err(ChainIntegrityViolation::BrokenLink { index });
            }
            if !block.is_valid() {
                return Err(ChainIntegrityViolation::BadSeal { index });
            }
        }

        Ok(())
    }

    /// Whether every block links to and seals over its predecessor.
    pub fn is_valid(blocks: &[Block]) -> bool {
        Self::verify(blocks).is_ok()
    }
}
