use crate::Hash;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("byte index {index} out of range for hash of length {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Why a nonce search stopped without finding an acceptable hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("no acceptable nonce within {attempts} attempts")]
    Exhausted { attempts: u64 },
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

/// Admission failures raised by `BlockChain::append`. The chain is left
/// untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("block {num} does not belong at position {expected}")]
    WrongIndex { num: u32, expected: u32 },
    #[error("block {num} claims hash {claimed} but its contents hash to {actual}")]
    HashMismatch { num: u32, claimed: Hash, actual: Hash },
    #[error("block {num} has hash {hash} which the validator rejects")]
    InvalidHash { num: u32, hash: Hash },
    #[error("block {num} links to {found} but the chain ends at {expected}")]
    BrokenLink { num: u32, expected: Hash, found: Hash },
}

/// First structural problem found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: u32 },
    #[error("block {index}: negative amount {amount}")]
    NegativeAmount { index: u32, amount: i32 },
    #[error("block {index}: {user} spends {amount} with a balance of {balance}")]
    Overdraft {
        index: u32,
        user: String,
        balance: i64,
        amount: i32,
    },
    #[error("block {index}: next block does not link to this block's hash")]
    BrokenLink { index: u32 },
    #[error("block {index}: hash rejected by the validator")]
    InvalidHash { index: u32 },
}

impl Violation {
    /// Index of the block the violation was found at.
    pub fn index(&self) -> u32 {
        match self {
            Violation::HashMismatch { index }
            | Violation::NegativeAmount { index, .. }
            | Violation::Overdraft { index, .. }
            | Violation::BrokenLink { index }
            | Violation::InvalidHash { index } => *index,
        }
    }
}
