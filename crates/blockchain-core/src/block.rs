use crate::error::MineError;
use crate::mine::{hash_with_nonce, Miner};
use crate::pow::HashValidator;
use crate::{Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One committed transaction together with its position, the hash of the
/// block before it, and the nonce that makes its own hash acceptable.
///
/// `hash` is cached at construction. Blocks that arrive from elsewhere (e.g.
/// deserialized) may carry a hash that no longer matches their contents;
/// [`Block::is_consistent`] is how the chain notices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    num: u32,
    transaction: Transaction,
    prev_hash: Hash,
    nonce: i64,
    hash: Hash,
}

impl Block {
    /// Search for the first nonce that makes the block's hash acceptable to
    /// `validator`.
    pub fn mine(
        num: u32,
        transaction: Transaction,
        prev_hash: Hash,
        validator: &dyn HashValidator,
        miner: &Miner,
    ) -> Result<Self, MineError> {
        let prefix = hash_prefix(num, &transaction, &prev_hash);
        let (nonce, hash) = miner.search(&prefix, validator)?;
        Ok(Self {
            num,
            transaction,
            prev_hash,
            nonce,
            hash,
        })
    }

    /// Rebuild a block whose nonce is already known. No search happens; the
    /// hash is computed once from the given fields.
    pub fn reconstruct(num: u32, transaction: Transaction, prev_hash: Hash, nonce: i64) -> Self {
        let hash = block_hash(num, &transaction, &prev_hash, nonce);
        Self {
            num,
            transaction,
            prev_hash,
            nonce,
            hash,
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn nonce(&self) -> i64 {
        self.nonce
    }

    pub fn prev_hash(&self) -> &Hash {
        &self.prev_hash
    }

    /// The stored hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Hash of the block's current fields with its stored nonce.
    pub fn compute_hash(&self) -> Hash {
        block_hash(self.num, &self.transaction, &self.prev_hash, self.nonce)
    }

    pub fn is_consistent(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Overwrite the stored hash with [`Block::compute_hash`]. Never searches.
    pub fn recompute_hash(&mut self) -> &Hash {
        self.hash = self.compute_hash();
        &self.hash
    }

    pub(crate) fn set_prev_hash(&mut self, prev_hash: Hash) {
        self.prev_hash = prev_hash;
    }

    #[cfg(test)]
    pub(crate) fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {} (Transaction: {}, nonce: {}, prevHash: {}, hash: {})",
            self.num, self.transaction, self.nonce, self.prev_hash, self.hash
        )
    }
}

/// The block hash: SHA-256 over, in order, `num` (4 bytes, big-endian), the
/// UTF-8 source, the UTF-8 target, `amount` (4 bytes, big-endian), the
/// previous hash's bytes unless `num == 0`, and `nonce` (8 bytes,
/// big-endian). Strings are not length-prefixed.
pub fn block_hash(num: u32, transaction: &Transaction, prev_hash: &Hash, nonce: i64) -> Hash {
    hash_with_nonce(&hash_prefix(num, transaction, prev_hash), nonce)
}

/// Every hashed segment that precedes the nonce.
fn hash_prefix(num: u32, transaction: &Transaction, prev_hash: &Hash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        4 + transaction.source.len() + transaction.target.len() + 4 + prev_hash.len(),
    );
    bytes.extend_from_slice(&num.to_be_bytes());
    bytes.extend_from_slice(transaction.source.as_bytes());
    bytes.extend_from_slice(transaction.target.as_bytes());
    bytes.extend_from_slice(&transaction.amount.to_be_bytes());
    // genesis has nothing to link to
    if num != 0 {
        bytes.extend_from_slice(prev_hash.as_bytes());
    }
    bytes
}
