//! Transaction types and signing.

use crate::codec::canonical_bytes;
use crate::crypto::{Address, Keypair, PublicKey, Signature};
use crate::hash::{hash, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("signing key {signer} does not match sender {sender}")]
    SigningKeyMismatch { sender: Address, signer: Address },

    #[error("transaction is already signed")]
    AlreadySigned,

    #[error("missing signature")]
    MissingSignature,

    #[error("stored hash does not match transaction contents")]
    HashMismatch,

    #[error("sender is not a valid public key")]
    InvalidSender,

    #[error("signature verification failed")]
    VerificationFailed,
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// A value transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's public key, or [`Address::REWARD`] for minted value.
    pub sender: Address,
    /// Recipient's public key.
    pub receiver: Address,
    /// Value to transfer.
    pub amount: u64,
    /// Creation time, Unix milliseconds.
    pub timestamp: u64,
    /// Digest of sender, receiver, amount and timestamp.
    pub hash: Hash,
    /// Sender's signature over `hash`.
    pub signature: Option<Signature>,
}

/// The fields covered by the transaction hash, in canonical order.
#[derive(Serialize)]
struct SigningPayload<'a> {
    sender: &'a Address,
    receiver: &'a Address,
    amount: u64,
    timestamp: u64,
}

impl Transaction {
    /// Create a new unsigned transaction stamped with the current time.
    pub fn new(sender: Address, receiver: Address, amount: u64) -> Self {
        Self::with_timestamp(sender, receiver, amount, current_timestamp_millis())
    }

    /// Create a new unsigned transaction with an explicit timestamp.
    pub fn with_timestamp(sender: Address, receiver: Address, amount: u64, timestamp: u64) -> Self {
        let mut tx = Self {
            sender,
            receiver,
            amount,
            timestamp,
            hash: Hash::ZERO,
            signature: None,
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Create a reward transaction minting `amount` to `receiver`.
    pub fn reward(receiver: Address, amount: u64) -> Self {
        Self::new(Address::REWARD, receiver, amount)
    }

    /// Recompute the hash from the current field values.
    pub fn calculate_hash(&self) -> Hash {
        let payload = SigningPayload {
            sender: &self.sender,
            receiver: &self.receiver,
            amount: self.amount,
            timestamp: self.timestamp,
        };
        hash(&canonical_bytes(&payload))
    }

    /// Whether this transaction mints value from the reward sentinel.
    pub fn is_reward(&self) -> bool {
        self.sender.is_reward()
    }

    /// Whether a signature has been attached.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Sign the transaction with the sender's keypair.
    ///
    /// Fails if the keypair does not belong to `sender` or if the transaction
    /// already carries a signature.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<()> {
        let signer = keypair.address();
        if signer != self.sender {
            return Err(TransactionError::SigningKeyMismatch {
                sender: self.sender,
                signer,
            });
        }
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }
        self.signature = Some(keypair.sign_hash(&self.hash));
        Ok(())
    }

    /// Create a signed transaction.
    pub fn signed(mut self, keypair: &Keypair) -> Result<Self> {
        self.sign(keypair)?;
        Ok(self)
    }

    /// Check the transaction, reporting why it is invalid.
    ///
    /// Reward transactions always pass. Everything else needs a stored hash
    /// matching the fields and a signature over it by the sender.
    pub fn verify(&self) -> Result<()> {
        if self.is_reward() {
            return Ok(());
        }
        let signature = self
            .signature
            .as_ref()
            .ok_or(TransactionError::MissingSignature)?;
        if self.hash != self.calculate_hash() {
            return Err(TransactionError::HashMismatch);
        }
        let public_key =
            PublicKey::from_address(&self.sender).map_err(|_| TransactionError::InvalidSender)?;
        public_key
            .verify(self.hash.as_bytes(), signature)
            .map_err(|_| TransactionError::VerificationFailed)
    }

    /// Whether the transaction is authentic.
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp_millis() -> u64 {
    // Clamped: a clock before 1970 reads as the epoch.
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
