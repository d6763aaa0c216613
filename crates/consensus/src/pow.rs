//! Proof-of-work sealing.
//!
//! A block is sealed when its hash, written as hex, starts with `difficulty`
//! zero digits. Expected work grows as 16^difficulty, so the search runs in
//! slices of `check_interval` nonces and consults a [`CancelToken`] between
//! slices. That lets a block accepted from elsewhere stop local work that it
//! has made pointless.

use sealchain_core::{leading_zero_digits, Block};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur during proof-of-work operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowError {
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("block {index} hash does not match its contents")]
    TamperedHash { index: u64 },

    #[error("insufficient work (required {required} leading zeros, found {found})")]
    InsufficientWork { required: u32, found: u32 },
}

pub type Result<T> = std::result::Result<T, PowError>;

/// Proof-of-work configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowConfig {
    /// Required number of leading zero hex digits in a block hash.
    pub difficulty: u32,
    /// Nonce attempts between cancellation checks.
    pub check_interval: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            check_interval: 4096,
        }
    }
}

impl PowConfig {
    /// Default configuration at the given difficulty.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }
}

/// Shared flag used to abandon in-flight mining.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every holder of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a successful mining run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningStats {
    /// Nonces tried after the starting one.
    pub attempts: u64,
    /// Wall time spent searching.
    pub elapsed: Duration,
}

/// Proof-of-work engine.
#[derive(Debug, Clone, Default)]
pub struct Miner {
    config: PowConfig,
}

impl Miner {
    /// Create a miner with the given configuration.
    pub fn new(config: PowConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PowConfig {
        &self.config
    }

    /// Required leading zero digits.
    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    /// Seal `block` in place, stopping early if `cancel` fires.
    ///
    /// The hash is refreshed before the search starts, so header edits made
    /// by the caller are picked up. On cancellation the block is left
    /// self-consistent at whatever nonce it reached.
    pub fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<MiningStats> {
        self.mine_with(block, || cancel.is_cancelled())
    }

    /// Like [`Miner::mine`], but stops when `should_stop` returns `true`.
    ///
    /// Lets callers watch more than one cancellation source.
    pub fn mine_with<F>(&self, block: &mut Block, mut should_stop: F) -> Result<MiningStats>
    where
        F: FnMut() -> bool,
    {
        let difficulty = self.config.difficulty;
        let start_nonce = block.header.nonce;
        let started = Instant::now();
        debug!(index = block.index(), difficulty, "mining started");

        let mut checks: u64 = 0;
        let sealed = block.mine_until(difficulty, self.config.check_interval, || {
            checks += 1;
            trace!(checks, "mining progress");
            should_stop()
        });

        let attempts = block.header.nonce.wrapping_sub(start_nonce);
        if !sealed {
            debug!(index = block.index(), attempts, "mining cancelled");
            return Err(PowError::Cancelled { attempts });
        }

        let elapsed = started.elapsed();
        debug!(
            index = block.index(),
            nonce = block.header.nonce,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            hash = %block.hash,
            "block sealed"
        );
        Ok(MiningStats { attempts, elapsed })
    }

    /// Check that `block` carries a valid seal at this miner's difficulty.
    pub fn verify_seal(&self, block: &Block) -> Result<()> {
        if !block.is_valid() {
            return Err(PowError::TamperedHash {
                index: block.index(),
            });
        }
        let found = leading_zero_digits(&block.hash);
        if found < self.config.difficulty {
            return Err(PowError::InsufficientWork {
                required: self.config.difficulty,
                found,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_core::{Address, Hash};
    use std::thread;

    fn candidate() -> Block {
        Block::new(1, 1_000, Hash::from_bytes([1u8; 32]), vec![], 0, Address::REWARD)
    }

    #[test]
    fn test_default_config() {
        let config = PowConfig::default();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.check_interval, 4096);
        assert_eq!(PowConfig::with_difficulty(5).difficulty, 5);
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config: PowConfig = serde_json::from_str(r#"{"difficulty": 3}"#).unwrap();
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.check_interval, 4096);
    }

    #[test]
    fn test_mine_seals_block() {
        let miner = Miner::new(PowConfig::with_difficulty(2));
        let mut block = candidate();

        let stats = miner.mine(&mut block, &CancelToken::new()).unwrap();
        assert_eq!(stats.attempts, block.header.nonce);
        assert!(block.meets_difficulty(2));
        assert!(miner.verify_seal(&block).is_ok());
    }

    #[test]
    fn test_cancelled_token_stops_mining() {
        let miner = Miner::new(PowConfig {
            difficulty: 64,
            check_interval: 8,
        });
        let token = CancelToken::new();
        token.cancel();

        let mut block = candidate();
        let result = miner.mine(&mut block, &token);
        assert_eq!(result, Err(PowError::Cancelled { attempts: 0 }));
        assert!(block.is_valid());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let miner = Miner::new(PowConfig {
            difficulty: 64,
            check_interval: 64,
        });
        let token = CancelToken::new();
        let remote = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let mut block = candidate();
        let result = miner.mine(&mut block, &token);
        handle.join().unwrap();

        assert!(matches!(result, Err(PowError::Cancelled { .. })));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_mine_with_any_source() {
        let miner = Miner::new(PowConfig {
            difficulty: 64,
            check_interval: 16,
        });
        let first = CancelToken::new();
        let second = CancelToken::new();
        second.cancel();

        let mut block = candidate();
        let result = miner.mine_with(&mut block, || first.is_cancelled() || second.is_cancelled());
        assert!(matches!(result, Err(PowError::Cancelled { .. })));
        assert!(!first.is_cancelled());
    }

    #[test]
    fn test_verify_seal_detects_tampering() {
        let miner = Miner::new(PowConfig::with_difficulty(1));
        let mut block = candidate();
        miner.mine(&mut block, &CancelToken::new()).unwrap();

        block.header.timestamp += 1;
        assert_eq!(
            miner.verify_seal(&block),
            Err(PowError::TamperedHash { index: 1 })
        );
    }

    #[test]
    fn test_verify_seal_detects_insufficient_work() {
        let easy = Miner::new(PowConfig::with_difficulty(0));
        let hard = Miner::new(PowConfig::with_difficulty(64));
        let block = candidate();

        assert!(easy.verify_seal(&block).is_ok());
        assert!(matches!(
            hard.verify_seal(&block),
            Err(PowError::InsufficientWork { required: 64, .. })
        ));
    }
}
