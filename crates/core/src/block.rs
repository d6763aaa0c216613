//! Block and block header structures.

use crate::codec::canonical_bytes;
use crate::crypto::Address;
use crate::hash::{hash, meets_difficulty, Hash};
use crate::merkle::HashTree;
use crate::transaction::{current_timestamp_millis, Transaction};
use serde::{Deserialize, Serialize};

/// The header of a block containing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height (0 for genesis).
    pub index: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Hash of the previous block.
    pub prev_hash: Hash,
    /// Proof-of-work counter.
    pub nonce: u64,
    /// Address credited with mining this block.
    pub miner: Address,
}

impl BlockHeader {
    /// Get the current Unix timestamp in milliseconds.
    pub fn current_timestamp() -> u64 {
        current_timestamp_millis()
    }
}

/// The fields covered by the block hash, in canonical order.
#[derive(Serialize)]
struct SealPayload<'a> {
    index: u64,
    timestamp: u64,
    merkle_root: Hash,
    miner: &'a Address,
    prev_hash: &'a Hash,
    nonce: u64,
}

/// A block: header, the hash tree over its transactions, and its seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Stored seal. Valid while it equals [`Block::calculate_hash`].
    pub hash: Hash,
    /// Hash tree over the committed transactions.
    transactions: HashTree<Transaction>,
}

impl Block {
    /// Create a new block. The hash is computed immediately, so a fresh block
    /// is self-consistent but not yet mined.
    pub fn new(
        index: u64,
        timestamp: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        nonce: u64,
        miner: Address,
    ) -> Self {
        let mut block = Self {
            header: BlockHeader {
                index,
                timestamp,
                prev_hash,
                nonce,
                miner,
            },
            hash: Hash::ZERO,
            transactions: HashTree::build(transactions),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create a candidate block on top of nothing yet, stamped with the
    /// current time. The chain fixes `index` and `prev_hash` when it appends.
    pub fn candidate(transactions: Vec<Transaction>, miner: Address) -> Self {
        Self::new(
            0,
            BlockHeader::current_timestamp(),
            Hash::ZERO,
            transactions,
            0,
            miner,
        )
    }

    /// Create the (unmined) genesis block.
    pub fn genesis(timestamp: u64) -> Self {
        Self::new(0, timestamp, Hash::ZERO, Vec::new(), 0, Address::REWARD)
    }

    /// Recompute the seal from the current header and transaction root.
    pub fn calculate_hash(&self) -> Hash {
        let payload = SealPayload {
            index: self.header.index,
            timestamp: self.header.timestamp,
            merkle_root: self.transactions.root_hash(),
            miner: &self.header.miner,
            prev_hash: &self.header.prev_hash,
            nonce: self.header.nonce,
        };
        hash(&canonical_bytes(&payload))
    }

    /// Search nonces until the hash has `difficulty` leading zero hex digits.
    ///
    /// Blocks until done. Use [`Block::mine_until`] where the work may need
    /// to be abandoned.
    pub fn mine(&mut self, difficulty: u32) {
        self.mine_until(difficulty, u64::MAX, || false);
    }

    /// Cancellable form of [`Block::mine`].
    ///
    /// `should_stop` is polled before the first attempt and then every
    /// `check_interval` nonces. Returns `true` once sealed, `false` if
    /// stopped first; either way `hash` matches the current nonce.
    pub fn mine_until<F>(&mut self, difficulty: u32, check_interval: u64, mut should_stop: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let check_interval = check_interval.max(1);
        self.hash = self.calculate_hash();

        let mut attempts: u64 = 0;
        while !meets_difficulty(&self.hash, difficulty) {
            if attempts % check_interval == 0 && should_stop() {
                return false;
            }
            self.header.nonce = self.header.nonce.wrapping_add(1);
            self.hash = self.calculate_hash();
            attempts += 1;
        }
        true
    }

    /// Whether the stored hash matches a fresh recomputation.
    pub fn is_valid(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Whether the stored hash satisfies `difficulty`.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Get the block height.
    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.prev_hash == Hash::ZERO
    }

    /// The committed transactions in order.
    pub fn transactions(&self) -> &[Transaction] {
        self.transactions.items()
    }

    /// The hash tree over the committed transactions.
    pub fn tree(&self) -> &HashTree<Transaction> {
        &self.transactions
    }

    /// Root of the transaction tree.
    pub fn merkle_root(&self) -> Hash {
        self.transactions.root_hash()
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Inclusion proof for the transaction at `position`.
    pub fn inclusion_proof(&self, position: usize) -> Vec<Hash> {
        self.transactions.proof(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::hash::leading_zero_digits;

    fn miner() -> Address {
        Address::from_bytes([9u8; 32])
    }

    fn signed_transfer(keypair: &Keypair, amount: u64) -> Transaction {
        Transaction::new(keypair.address(), Address::from_bytes([2u8; 32]), amount)
            .signed(keypair)
            .unwrap()
    }

    fn sample_block() -> Block {
        let keypair = Keypair::generate();
        let txs = vec![signed_transfer(&keypair, 10), signed_transfer(&keypair, 20)];
        Block::new(1, 1_700_000_000_000, Hash::from_bytes([0xAA; 32]), txs, 0, miner())
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(1_000);

        assert!(genesis.is_genesis());
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.header.prev_hash, Hash::ZERO);
        assert_eq!(genesis.header.miner, Address::REWARD);
        assert_eq!(genesis.tx_count(), 0);
        assert_eq!(genesis.merkle_root(), Hash::ZERO);
    }

    #[test]
    fn test_new_block_is_self_consistent() {
        let block = sample_block();
        assert_eq!(block.hash, block.calculate_hash());
        assert!(block.is_valid());
        assert_eq!(block.tx_count(), 2);
    }

    #[test]
    fn test_block_hash_deterministic() {
        let a = Block::genesis(1_000);
        let b = Block::genesis(1_000);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.calculate_hash(), a.calculate_hash());
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let mut block = sample_block();
        let old = block.hash;
        block.header.nonce += 1;
        assert_ne!(block.calculate_hash(), old);
    }

    #[test]
    fn test_hash_encoding_is_pinned() {
        let block = Block::new(3, 7, Hash::from_bytes([5u8; 32]), vec![], 11, miner());

        let mut expected = Vec::new();
        expected.extend_from_slice(&3u64.to_le_bytes());
        expected.extend_from_slice(&7u64.to_le_bytes());
        expected.extend_from_slice(&[0u8; 32]); // empty tree root
        expected.extend_from_slice(&[9u8; 32]);
        expected.extend_from_slice(&[5u8; 32]);
        expected.extend_from_slice(&11u64.to_le_bytes());
        assert_eq!(block.hash, hash(&expected));
    }

    #[test]
    fn test_mine_meets_difficulty() {
        for difficulty in 0..=3 {
            let mut block = sample_block();
            block.mine(difficulty);
            assert!(block.meets_difficulty(difficulty));
            assert!(block.hash.to_hex().starts_with(&"0".repeat(difficulty as usize)));
            assert!(leading_zero_digits(&block.hash) >= difficulty);
            assert!(block.is_valid());
        }
    }

    #[test]
    fn test_mine_refreshes_stale_hash() {
        let mut block = sample_block();
        block.header.prev_hash = Hash::from_bytes([0xBB; 32]);
        assert!(!block.is_valid());

        block.mine(1);
        assert!(block.is_valid());
        assert!(block.meets_difficulty(1));
    }

    #[test]
    fn test_tampering_after_mining_is_detected() {
        let mut mined = sample_block();
        mined.mine(2);
        assert!(mined.is_valid());

        let mut b = mined.clone();
        b.header.index += 1;
        assert!(!b.is_valid());

        let mut b = mined.clone();
        b.header.timestamp += 1;
        assert!(!b.is_valid());

        let mut b = mined.clone();
        b.header.prev_hash = Hash::ZERO;
        assert!(!b.is_valid());

        let mut b = mined.clone();
        b.header.nonce += 1;
        assert!(!b.is_valid());

        let mut b = mined.clone();
        b.header.miner = Address::REWARD;
        assert!(!b.is_valid());

        let mut b = mined;
        b.hash = Hash::from_bytes([0xCC; 32]);
        assert!(!b.is_valid());
    }

    #[test]
    fn test_transactions_change_hash() {
        let keypair = Keypair::generate();
        let tx1 = signed_transfer(&keypair, 1);
        let tx2 = signed_transfer(&keypair, 2);

        let a = Block::new(1, 5, Hash::ZERO, vec![tx1.clone(), tx2.clone()], 0, miner());
        let b = Block::new(1, 5, Hash::ZERO, vec![tx2, tx1], 0, miner());
        assert_ne!(a.merkle_root(), b.merkle_root());
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_mine_until_stops() {
        let mut block = sample_block();
        // 64 leading zero digits is unreachable
        let sealed = block.mine_until(64, 16, || true);
        assert!(!sealed);
        assert!(block.is_valid());
    }

    #[test]
    fn test_mine_until_polls_at_interval() {
        let mut block = sample_block();
        let mut polls = 0u32;
        let sealed = block.mine_until(64, 100, || {
            polls += 1;
            polls == 3
        });
        assert!(!sealed);
        assert_eq!(polls, 3);
        // stopped on the third poll, after 200 attempts
        assert_eq!(block.header.nonce, 200);
    }

    #[test]
    fn test_inclusion_proof_verifies() {
        let block = sample_block();
        for (i, tx) in block.transactions().iter().enumerate() {
            let proof = block.inclusion_proof(i);
            assert!(block.tree().verify(tx, &proof, i));
        }
    }

    #[test]
    fn test_candidate_block() {
        let block = Block::candidate(vec![], miner());
        assert_eq!(block.header.miner, miner());
        assert!(block.header.timestamp > 0);
        assert!(block.is_valid());
    }
}
