//! An append-only, single-process ledger of value transfers.
//!
//! Each [`Block`] commits one [`Transaction`], the hash of the block before
//! it, and a nonce chosen so that its own hash satisfies the chain's
//! [`HashValidator`]. [`BlockChain`] admits blocks, walks the chain to check
//! it, and derives balances.

pub mod block;
pub mod chain;
pub mod constants;
pub mod error;
pub mod hash;
pub mod mine;
pub mod pow;

pub use block::{block_hash, Block};
pub use chain::BlockChain;
pub use error::{AppendError, HashError, MineError, Violation};
pub use hash::Hash;
pub use mine::Miner;
pub use pow::{HashValidator, LeadingZeroBits, LeadingZeroBytes};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A transfer of `amount` from `source` to `target`. An empty `source` is a
/// deposit: value enters the ledger without being debited from anyone.
///
/// Negative amounts are representable; a chain holding one fails
/// [`BlockChain::check`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub source: String,
    pub target: String,
    pub amount: i32,
}

impl Transaction {
    pub fn new(source: impl Into<String>, target: impl Into<String>, amount: i32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            amount,
        }
    }

    pub fn deposit(target: impl Into<String>, amount: i32) -> Self {
        Self::new(String::new(), target, amount)
    }

    /// The empty transaction carried by every genesis block.
    pub fn genesis() -> Self {
        Self::new(String::new(), String::new(), 0)
    }

    pub fn is_deposit(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deposit() {
            write!(f, "[Deposit, Target: {}, Amount: {}]", self.target, self.amount)
        } else {
            write!(
                f,
                "[Source: {}, Target: {}, Amount: {}]",
                self.source, self.target, self.amount
            )
        }
    }
}
