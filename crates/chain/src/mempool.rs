//! Transaction mempool for pending transactions.
//!
//! The mempool holds signed transactions waiting to be mined. It is an owned
//! value handed to whoever assembles blocks; wrap it in [`SharedMempool`]
//! when submission and assembly run on different threads.

use parking_lot::Mutex;
use sealchain_core::{Address, Hash, Transaction, TransactionError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[source] TransactionError),

    #[error("reward transactions are minted by block assembly only")]
    RewardTransaction,

    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("transaction not found in mempool")]
    TransactionNotFound,
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// A mempool shared between threads.
pub type SharedMempool = Arc<Mutex<Mempool>>;

/// Configuration for the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool.
#[derive(Debug)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Transactions indexed by hash.
    transactions: HashMap<Hash, Transaction>,
    /// Hashes in submission order.
    order: VecDeque<Hash>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Wrap this mempool for use across threads.
    pub fn into_shared(self) -> SharedMempool {
        Arc::new(Mutex::new(self))
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.transactions.contains_key(tx_hash)
    }

    /// Get a transaction from the mempool.
    pub fn get(&self, tx_hash: &Hash) -> Option<&Transaction> {
        self.transactions.get(tx_hash)
    }

    /// Add a transaction to the mempool.
    ///
    /// Reward transactions are refused: only block assembly mints value.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        if tx.is_reward() {
            return Err(MempoolError::RewardTransaction);
        }
        tx.verify().map_err(MempoolError::InvalidTransaction)?;

        let tx_hash = tx.hash;
        if self.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTransaction);
        }

        if self.transactions.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        self.order.push_back(tx_hash);
        self.transactions.insert(tx_hash, tx);
        debug!(hash = %tx_hash, pending = self.len(), "transaction added to mempool");

        Ok(())
    }

    /// Remove a transaction from the mempool.
    pub fn remove(&mut self, tx_hash: &Hash) -> Result<Transaction> {
        let tx = self
            .transactions
            .remove(tx_hash)
            .ok_or(MempoolError::TransactionNotFound)?;
        self.order.retain(|h| h != tx_hash);
        Ok(tx)
    }

    /// Take every pending transaction in submission order, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        let drained: Vec<Transaction> = self
            .order
            .drain(..)
            .filter_map(|h| self.transactions.remove(&h))
            .collect();
        debug!(count = drained.len(), "mempool drained");
        drained
    }

    /// Clear all transactions from the mempool.
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.order.clear();
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        let senders: HashSet<&Address> = self.transactions.values().map(|tx| &tx.sender).collect();
        MempoolStats {
            total_transactions: self.len(),
            unique_senders: senders.len(),
            capacity: self.config.max_transactions,
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolStats {
    /// Total number of transactions.
    pub total_transactions: usize,
    /// Number of unique senders.
    pub unique_senders: usize,
    /// Mempool capacity.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_core::Keypair;
    use std::thread;

    fn receiver() -> Address {
        Address::from_bytes([2u8; 32])
    }

    fn transfer(keypair: &Keypair, amount: u64, timestamp: u64) -> Transaction {
        Transaction::with_timestamp(keypair.address(), receiver(), amount, timestamp)
            .signed(keypair)
            .unwrap()
    }

    #[test]
    fn test_mempool_add_and_get() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();

        let tx = transfer(&keypair, 1000, 1);
        let tx_hash = tx.hash;

        assert!(mempool.add(tx.clone()).is_ok());
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&tx_hash));
        assert_eq!(mempool.get(&tx_hash).unwrap(), &tx);
    }

    #[test]
    fn test_mempool_rejects_unsigned() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();
        let tx = Transaction::new(keypair.address(), receiver(), 5);

        assert_eq!(
            mempool.add(tx),
            Err(MempoolError::InvalidTransaction(
                TransactionError::MissingSignature
            ))
        );
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_mempool_rejects_altered_amount() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();
        let mut tx = transfer(&keypair, 10, 1);
        tx.amount = 10_000;

        assert!(matches!(
            mempool.add(tx),
            Err(MempoolError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_mempool_rejects_reward() {
        let mut mempool = Mempool::new();
        let tx = Transaction::reward(receiver(), 1_000_000);
        assert!(tx.is_valid());

        assert_eq!(mempool.add(tx), Err(MempoolError::RewardTransaction));
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_mempool_duplicate_rejected() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();
        let tx = transfer(&keypair, 1000, 1);

        assert!(mempool.add(tx.clone()).is_ok());
        assert_eq!(mempool.add(tx), Err(MempoolError::DuplicateTransaction));
    }

    #[test]
    fn test_mempool_remove() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();
        let tx = transfer(&keypair, 1000, 1);
        let tx_hash = tx.hash;

        mempool.add(tx.clone()).unwrap();
        let removed = mempool.remove(&tx_hash).unwrap();
        assert_eq!(removed, tx);
        assert!(mempool.is_empty());
        assert!(!mempool.contains(&tx_hash));
        assert_eq!(
            mempool.remove(&tx_hash),
            Err(MempoolError::TransactionNotFound)
        );
    }

    #[test]
    fn test_mempool_drain_keeps_submission_order() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();

        // timestamps deliberately out of order
        let txs = vec![
            transfer(&keypair, 1, 30),
            transfer(&keypair, 2, 10),
            transfer(&keypair, 3, 20),
        ];
        for tx in &txs {
            mempool.add(tx.clone()).unwrap();
        }
        mempool.remove(&txs[1].hash).unwrap();

        let drained = mempool.drain();
        assert_eq!(drained, vec![txs[0].clone(), txs[2].clone()]);
        assert!(mempool.is_empty());
        assert!(mempool.drain().is_empty());
    }

    #[test]
    fn test_mempool_capacity_limit() {
        let mut mempool = Mempool::with_config(MempoolConfig {
            max_transactions: 2,
        });
        let keypair = Keypair::generate();

        assert!(mempool.add(transfer(&keypair, 1, 1)).is_ok());
        assert!(mempool.add(transfer(&keypair, 2, 2)).is_ok());
        assert_eq!(
            mempool.add(transfer(&keypair, 3, 3)),
            Err(MempoolError::MempoolFull(2))
        );
    }

    #[test]
    fn test_mempool_clear() {
        let mut mempool = Mempool::new();
        let keypair = Keypair::generate();

        mempool.add(transfer(&keypair, 1000, 1)).unwrap();
        mempool.clear();
        assert!(mempool.is_empty());
        assert!(mempool.drain().is_empty());
    }

    #[test]
    fn test_mempool_stats() {
        let mut mempool = Mempool::new();
        let keypair1 = Keypair::generate();
        let keypair2 = Keypair::generate();

        mempool.add(transfer(&keypair1, 1, 1)).unwrap();
        mempool.add(transfer(&keypair1, 2, 2)).unwrap();
        mempool.add(transfer(&keypair2, 3, 1)).unwrap();

        let stats = mempool.stats();
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.unique_senders, 2);
        assert_eq!(stats.capacity, 10_000);
    }

    #[test]
    fn test_config_from_json() {
        let config: MempoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MempoolConfig::default());
    }

    #[test]
    fn test_shared_mempool_concurrent_submission() {
        let pool = Mempool::new().into_shared();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let keypair = Keypair::generate();
                    for i in 0..5 {
                        pool.lock().add(transfer(&keypair, i, i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.lock().len(), 20);
        assert_eq!(pool.lock().drain().len(), 20);
    }
}
