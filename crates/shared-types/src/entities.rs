//! # Core Domain Entities
//!
//! Chain-level entities exchanged between the transaction pool and its
//! collaborators (chain client, block builder, object store).
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `Address`, `PublicKey`, `Signature`
//! - **Chain**: `Transaction`, `Block`
//! - **Accounts**: `Account` (keepers + threshold)

use crate::errors::CodecError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// Content address of an arbitrary byte string.
pub fn content_hash(raw: &[u8]) -> Hash {
    Sha256::digest(raw).into()
}

/// Canonical string form of an address (`0x` + lowercase hex).
pub fn address_to_string(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Short printable form of a hash for log fields.
pub fn short_hash(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// A signed transaction as submitted to the pool.
///
/// The pool only relies on the content address, the encoded length, the
/// `batched` flag and the priority ordering. Everything else is validated by
/// the chain collaborator.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address.
    pub from: Address,
    /// Recipient address (optional for contract creation).
    pub to: Option<Address>,
    /// Sender's nonce.
    pub nonce: u64,
    /// Tip paid to the builder per unit of gas.
    pub gas_tip: u64,
    /// Maximum fee per unit of gas.
    pub gas_fee_cap: u64,
    /// Transferred amount in base units.
    pub amount: u128,
    /// Call data.
    pub data: Vec<u8>,
    /// Set when the transaction is only valid as part of a batch.
    pub batched: bool,
    /// Sender's signature over the other fields.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl Transaction {
    /// Canonical encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decodes a transaction and rejects non-canonical encodings.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CodecError> {
        let tx: Self =
            bincode::deserialize(raw).map_err(|e| CodecError::Decode(e.to_string()))?;
        if tx.to_bytes()? != raw {
            return Err(CodecError::NonCanonical);
        }
        Ok(tx)
    }

    /// Content address of the canonical encoding.
    pub fn id(&self) -> Result<Hash, CodecError> {
        Ok(content_hash(&self.to_bytes()?))
    }

    /// Returns true if this transaction must travel inside a batch.
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Total order used to prioritize leasing.
    ///
    /// `Ordering::Less` means `self` is leased first: higher tip, then higher
    /// fee cap, then lower nonce. Callers break remaining ties by ID.
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .gas_tip
            .cmp(&self.gas_tip)
            .then_with(|| other.gas_fee_cap.cmp(&self.gas_fee_cap))
            .then_with(|| self.nonce.cmp(&other.nonce))
    }
}

/// A block as reported by the builder once it has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height (genesis is 0).
    pub height: u64,
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Address of the builder that assembled the block.
    pub builder: Address,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    /// IDs of the transactions included in the block.
    pub txs: Vec<Hash>,
}

// =============================================================================
// CLUSTER C: ACCOUNTS
// =============================================================================

/// Account state as exposed by the chain collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account address.
    pub address: Address,
    /// Number of transactions sent.
    pub nonce: u64,
    /// Balance in base units.
    pub balance: u128,
    /// Minimum number of keeper keys required to act for the account.
    pub threshold: u16,
    /// Keys allowed to act for the account.
    pub keepers: Vec<PublicKey>,
}
