//! Main blockchain orchestration.
//!
//! Ties mining, validation and the mempool together around an append-only
//! list of blocks. Readers take a shared lock; mining runs with no lock held
//! and the finished block is pushed in one write-locked step.

use crate::mempool::{Mempool, MempoolError, SharedMempool};
use parking_lot::RwLock;
use sealchain_consensus::{
    BlockValidator, CancelToken, ChainIntegrityViolation, ChainValidator, Miner, PowConfig,
    PowError, TransactionValidator, ValidationError,
};
use sealchain_core::{Address, Block, BlockHeader, Hash, Transaction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("proof-of-work error: {0}")]
    Pow(#[from] PowError),

    #[error("chain integrity violation: {0}")]
    Integrity(#[from] ChainIntegrityViolation),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("mining cancelled")]
    Cancelled,

    #[error("chain has no blocks")]
    EmptyChain,

    #[error("genesis block must have index 0, a zero prev_hash and no transactions")]
    InvalidGenesis,
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Blockchain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// Proof-of-work parameters.
    pub pow: PowConfig,
    /// Amount minted to the miner of each block built by [`Blockchain::mine_pending`].
    pub block_reward: u64,
    /// Fixed genesis timestamp; the current time when `None`.
    pub genesis_timestamp: Option<u64>,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            pow: PowConfig::default(),
            block_reward: 50,
            genesis_timestamp: None,
        }
    }
}

impl BlockchainConfig {
    /// Default configuration at the given difficulty.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            pow: PowConfig::with_difficulty(difficulty),
            ..Self::default()
        }
    }
}

/// State guarded by the chain lock.
#[derive(Debug)]
struct ChainState {
    /// Never empty.
    blocks: Vec<Block>,
    /// Fired and replaced whenever the head moves.
    head_changed: CancelToken,
}

impl ChainState {
    fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            head_changed: CancelToken::new(),
        }
    }

    fn head(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    fn push(&mut self, block: Block) {
        self.blocks.push(block);
        let previous = std::mem::take(&mut self.head_changed);
        previous.cancel();
    }
}

/// An append-only chain of proof-of-work sealed blocks.
///
/// All methods take `&self`; share it across threads behind an `Arc`.
#[derive(Debug)]
pub struct Blockchain {
    state: RwLock<ChainState>,
    miner: Miner,
    config: BlockchainConfig,
}

impl Blockchain {
    /// Create a chain with a mined genesis block at the default difficulty.
    pub fn new() -> Self {
        Self::with_config(BlockchainConfig::default())
    }

    /// Create a chain with a mined genesis block.
    pub fn with_config(config: BlockchainConfig) -> Self {
        let timestamp = config
            .genesis_timestamp
            .unwrap_or_else(BlockHeader::current_timestamp);
        let mut genesis = Block::genesis(timestamp);
        genesis.mine(config.pow.difficulty);
        info!(
            hash = %genesis.hash,
            difficulty = config.pow.difficulty,
            "genesis block created"
        );

        Self {
            state: RwLock::new(ChainState::new(vec![genesis])),
            miner: Miner::new(config.pow.clone()),
            config,
        }
    }

    /// Adopt a full chain received from elsewhere.
    ///
    /// Every block after genesis is held to the same rules as
    /// [`Blockchain::import_block`]: valid transactions, consecutive index,
    /// link to its predecessor and a seal meeting the configured difficulty.
    /// Genesis must sit at index 0 on [`Hash::ZERO`] with no transactions.
    pub fn from_blocks(blocks: Vec<Block>, config: BlockchainConfig) -> Result<Self> {
        let genesis = blocks.first().ok_or(BlockchainError::EmptyChain)?;
        if genesis.index() != 0 || genesis.header.prev_hash != Hash::ZERO || genesis.tx_count() != 0
        {
            warn!(hash = %genesis.hash, "rejected chain with malformed genesis");
            return Err(BlockchainError::InvalidGenesis);
        }
        if let Err(violation) = ChainValidator::verify(&blocks) {
            warn!(%violation, "rejected chain snapshot");
            return Err(violation.into());
        }

        let miner = Miner::new(config.pow.clone());
        for pair in blocks.windows(2) {
            let (parent, block) = (&pair[0], &pair[1]);
            let admitted = BlockValidator::validate_transactions(block)
                .map_err(BlockchainError::from)
                .and_then(|_| Self::check_sealed(&miner, block, parent));
            if let Err(err) = admitted {
                warn!(index = block.index(), %err, "rejected chain snapshot");
                return Err(err);
            }
        }

        info!(len = blocks.len(), "chain adopted from snapshot");
        Ok(Self {
            state: RwLock::new(ChainState::new(blocks)),
            miner,
            config,
        })
    }

    /// Link and proof-of-work rules for an already sealed block following `parent`.
    fn check_sealed(miner: &Miner, block: &Block, parent: &Block) -> Result<()> {
        BlockValidator::validate_link(block, parent)?;
        miner.verify_seal(block)?;
        Ok(())
    }

    /// Get the configuration.
    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Required leading zero hex digits for new blocks.
    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty()
    }

    /// The last block.
    pub fn head(&self) -> Block {
        self.state.read().head().clone()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Always `false`: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    /// Get a block by index.
    pub fn block(&self, index: usize) -> Option<Block> {
        self.state.read().blocks.get(index).cloned()
    }

    /// Snapshot of every block.
    pub fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    /// Token fired the next time the head moves.
    pub fn head_signal(&self) -> CancelToken {
        self.state.read().head_changed.clone()
    }

    /// Link `block` to the head, mine it and append it.
    ///
    /// Every transaction must be valid; otherwise the chain is unchanged.
    /// The caller's `index` and `prev_hash` are overwritten. Returns the
    /// new head hash.
    pub fn append(&self, block: Block) -> Result<Hash> {
        self.append_with_cancel(block, &CancelToken::new())
    }

    /// [`Blockchain::append`] that gives up with [`BlockchainError::Cancelled`]
    /// once `cancel` fires.
    ///
    /// If another block lands while this one is being mined, the candidate
    /// is re-linked to the new head and mined again.
    pub fn append_with_cancel(&self, block: Block, cancel: &CancelToken) -> Result<Hash> {
        if let Err(err) = TransactionValidator::validate_batch(block.transactions()) {
            warn!(%err, "rejected candidate block");
            return Err(err.into());
        }

        let mut candidate = block;
        loop {
            let (parent_hash, parent_index, head_changed) = {
                let state = self.state.read();
                let head = state.head();
                (head.hash, head.index(), state.head_changed.clone())
            };
            candidate.header.prev_hash = parent_hash;
            candidate.header.index = parent_index + 1;

            let mined = self.miner.mine_with(&mut candidate, || {
                cancel.is_cancelled() || head_changed.is_cancelled()
            });
            match mined {
                Ok(_) => {}
                Err(PowError::Cancelled { .. }) if cancel.is_cancelled() => {
                    debug!(index = candidate.index(), "append cancelled by caller");
                    return Err(BlockchainError::Cancelled);
                }
                Err(PowError::Cancelled { .. }) => {
                    debug!(index = candidate.index(), "head moved while mining, relinking");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let mut state = self.state.write();
            if state.head().hash != parent_hash {
                debug!(index = candidate.index(), "head moved before push, relinking");
                continue;
            }

            let hash = candidate.hash;
            info!(
                index = candidate.index(),
                hash = %hash,
                txs = candidate.tx_count(),
                nonce = candidate.header.nonce,
                "block appended"
            );
            state.push(candidate);
            return Ok(hash);
        }
    }

    /// Boolean form of [`Blockchain::append`].
    pub fn try_append(&self, block: Block) -> bool {
        self.append(block).is_ok()
    }

    /// Accept an already sealed block, e.g. one mined by a peer.
    ///
    /// The block must carry valid transactions, extend the current head and
    /// hold a seal that meets the chain difficulty. Any local mining on the
    /// old head is pre-empted.
    pub fn import_block(&self, block: Block) -> Result<Hash> {
        if let Err(err) = BlockValidator::validate_transactions(&block) {
            warn!(index = block.index(), %err, "rejected imported block");
            return Err(err.into());
        }

        let mut state = self.state.write();
        if let Err(err) = Self::check_sealed(&self.miner, &block, state.head()) {
            warn!(index = block.index(), %err, "rejected imported block");
            return Err(err);
        }

        let hash = block.hash;
        info!(index = block.index(), hash = %hash, "block imported");
        state.push(block);
        Ok(hash)
    }

    /// Check every link and seal.
    pub fn verify(&self) -> std::result::Result<(), ChainIntegrityViolation> {
        let state = self.state.read();
        let result = ChainValidator::verify(&state.blocks);
        if let Err(violation) = &result {
            warn!(%violation, "chain integrity violation");
        }
        result
    }

    /// Whether every link and seal holds.
    pub fn is_valid_chain(&self) -> bool {
        self.verify().is_ok()
    }

    /// Mine everything pending in `pool` into a new block.
    ///
    /// A reward to `miner` goes first. Transactions that no longer validate
    /// are dropped rather than failing the block.
    pub fn mine_pending(&self, pool: &mut Mempool, miner: Address) -> Result<Hash> {
        self.mine_transactions(pool.drain(), miner)
    }

    /// [`Blockchain::mine_pending`] for a pool shared with submitters.
    ///
    /// The pool lock is held only while draining, not while mining.
    pub fn mine_shared(&self, pool: &SharedMempool, miner: Address) -> Result<Hash> {
        let pending = pool.lock().drain();
        self.mine_transactions(pending, miner)
    }

    /// Mine `pending` behind a fresh reward to `miner`.
    ///
    /// Invalid transactions and any reward transactions among `pending` are
    /// dropped.
    pub fn mine_transactions(&self, pending: Vec<Transaction>, miner: Address) -> Result<Hash> {
        let pending_count = pending.len();

        let mut transactions = Vec::with_capacity(pending_count + 1);
        transactions.push(Transaction::reward(miner, self.config.block_reward));
        transactions.extend(
            pending
                .into_iter()
                .filter(|tx| !tx.is_reward() && tx.is_valid()),
        );

        let dropped = pending_count + 1 - transactions.len();
        if dropped > 0 {
            warn!(dropped, "dropped invalid pending transactions");
        }
        debug!(txs = transactions.len(), "assembling block from mempool");

        self.append(Block::candidate(transactions, miner))
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        let state = self.state.read();
        let head = state.head();
        BlockchainStats {
            height: head.index(),
            head_hash: head.hash,
            head_timestamp: head.header.timestamp,
            difficulty: self.difficulty(),
            total_transactions: state.blocks.iter().map(Block::tx_count).sum(),
        }
    }

    /// Overwrite a stored block in place.
    #[cfg(test)]
    pub(crate) fn tamper_with<F: FnOnce(&mut Block)>(&self, index: usize, f: F) {
        let mut state = self.state.write();
        f(&mut state.blocks[index]);
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Blockchain statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainStats {
    /// Index of the head block.
    pub height: u64,
    /// Hash of the head block.
    pub head_hash: Hash,
    /// Timestamp of the head block.
    pub head_timestamp: u64,
    /// Current difficulty.
    pub difficulty: u32,
    /// Transactions across all blocks.
    pub total_transactions: usize,
}
