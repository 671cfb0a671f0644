use crate::error::{AppendError, MineError, Violation};
use crate::pow::HashValidator;
use crate::{Block, Hash, Miner, Transaction};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::slice;
use tracing::{info, warn};

/// A validated sequence of blocks starting at a mined genesis block.
///
/// Only [`BlockChain::append`] and [`BlockChain::remove_last`] change the
/// sequence; the genesis block is never removed, so the chain is never empty.
pub struct BlockChain {
    blocks: Vec<Block>,
    validator: Box<dyn HashValidator>,
    miner: Miner,
}

impl BlockChain {
    /// Mine a genesis block against `validator` with an unbounded miner.
    pub fn new(validator: impl HashValidator + 'static) -> Result<Self, MineError> {
        Self::with_miner(validator, Miner::default())
    }

    /// Like [`BlockChain::new`], but every nonce search (genesis included)
    /// runs under `miner`'s limits.
    pub fn with_miner(
        validator: impl HashValidator + 'static,
        miner: Miner,
    ) -> Result<Self, MineError> {
        let genesis = Block::mine(0, Transaction::genesis(), Hash::empty(), &validator, &miner)?;
        info!(hash = %genesis.hash(), nonce = genesis.nonce(), "genesis mined");
        Ok(Self {
            blocks: vec![genesis],
            validator: Box::new(validator),
            miner,
        })
    }

    /// Number of blocks, genesis included.
    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn validator(&self) -> &dyn HashValidator {
        self.validator.as_ref()
    }

    fn tail(&self) -> &Block {
        // never empty: genesis cannot be removed
        &self.blocks[self.blocks.len() - 1]
    }

    fn next_num(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Hash of the newest block.
    pub fn hash(&self) -> &Hash {
        self.tail().hash()
    }

    /// Mine a block for `transaction` that would extend the chain as it is
    /// now. The chain itself is not touched, and balances are not consulted.
    pub fn mine(&self, transaction: Transaction) -> Result<Block, MineError> {
        Block::mine(
            self.next_num(),
            transaction,
            self.hash().clone(),
            self.validator(),
            &self.miner,
        )
    }

    /// Add `block` to the end of the chain.
    ///
    /// The block is refused, and the chain left exactly as it was, when its
    /// stored hash is not the hash of its contents, when the validator rejects
    /// that hash, when it does not link to the current tail, or when it was
    /// built for a different position.
    pub fn append(&mut self, mut block: Block) -> Result<(), AppendError> {
        if let Err(err) = self.admit(&block) {
            warn!(num = block.num(), %err, "block rejected");
            return Err(err);
        }
        block.set_prev_hash(self.hash().clone());
        info!(num = block.num(), hash = %block.hash(), "block appended");
        self.blocks.push(block);
        Ok(())
    }

    fn admit(&self, block: &Block) -> Result<(), AppendError> {
        let num = block.num();
        let actual = block.compute_hash();
        if &actual != block.hash() {
            return Err(AppendError::HashMismatch {
                num,
                claimed: block.hash().clone(),
                actual,
            });
        }
        if !self.validator.is_valid(&actual) {
            return Err(AppendError::InvalidHash { num, hash: actual });
        }
        if block.prev_hash() != self.hash() {
            return Err(AppendError::BrokenLink {
                num,
                expected: self.hash().clone(),
                found: block.prev_hash().clone(),
            });
        }
        if num != self.next_num() {
            return Err(AppendError::WrongIndex {
                num,
                expected: self.next_num(),
            });
        }
        Ok(())
    }

    /// Drop the newest block. Returns `false`, changing nothing, when only
    /// the genesis block is left.
    pub fn remove_last(&mut self) -> bool {
        if self.blocks.len() <= 1 {
            return false;
        }
        if let Some(block) = self.blocks.pop() {
            info!(num = block.num(), "block removed");
        }
        true
    }

    /// Walk the whole chain once and report the first problem found.
    ///
    /// For each block, in order: its stored hash matches its contents, its
    /// amount is not negative, a non-deposit source can cover the amount
    /// from what it held before this block, the next block links to it, and
    /// the validator accepts its hash.
    pub fn check(&self) -> Result<(), Violation> {
        let result = self.walk();
        if let Err(violation) = &result {
            warn!(index = violation.index(), %violation, "chain check failed");
        }
        result
    }

    fn walk(&self) -> Result<(), Violation> {
        let mut balances: HashMap<&str, i64> = HashMap::new();
        for (i, block) in self.blocks.iter().enumerate() {
            let index = i as u32;
            if !block.is_consistent() {
                return Err(Violation::HashMismatch { index });
            }

            let tx = block.transaction();
            if tx.amount < 0 {
                return Err(Violation::NegativeAmount {
                    index,
                    amount: tx.amount,
                });
            }
            if !tx.is_deposit() {
                let balance = balances.entry(tx.source.as_str()).or_insert(0);
                if *balance < i64::from(tx.amount) {
                    return Err(Violation::Overdraft {
                        index,
                        user: tx.source.clone(),
                        balance: *balance,
                        amount: tx.amount,
                    });
                }
                *balance -= i64::from(tx.amount);
            }
            *balances.entry(tx.target.as_str()).or_insert(0) += i64::from(tx.amount);

            if let Some(next) = self.blocks.get(i + 1) {
                if next.prev_hash() != block.hash() {
                    return Err(Violation::BrokenLink { index });
                }
            }
            if !self.validator.is_valid(block.hash()) {
                return Err(Violation::InvalidHash { index });
            }
        }
        Ok(())
    }

    pub fn is_correct(&self) -> bool {
        self.walk().is_ok()
    }

    /// Credits to `user` minus debits from `user` over every block. Users
    /// that never appear have a balance of zero. A deposit's empty source is
    /// debited like any other, so `balance("")` is minus everything deposited.
    pub fn balance(&self, user: &str) -> i64 {
        let mut balance = 0i64;
        for tx in self.transactions() {
            if tx.source == user {
                balance -= i64::from(tx.amount);
            }
            if tx.target == user {
                balance += i64::from(tx.amount);
            }
        }
        balance
    }

    /// Each distinct target of a non-genesis block, in first-seen order.
    pub fn users(&self) -> Users<'_> {
        Users {
            blocks: self.blocks[1..].iter(),
            seen: HashSet::new(),
        }
    }

    /// Every block from genesis through the tail.
    pub fn blocks(&self) -> slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// The transaction of every block from genesis through the tail, in the
    /// same order as [`BlockChain::blocks`].
    pub fn transactions(&self) -> Transactions<'_> {
        Transactions {
            blocks: self.blocks.iter(),
        }
    }
}

impl fmt::Debug for BlockChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockChain")
            .field("blocks", &self.blocks)
            .field("miner", &self.miner)
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a BlockChain {
    type Item = &'a Transaction;
    type IntoIter = Transactions<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.transactions()
    }
}

/// Iterator returned by [`BlockChain::transactions`].
#[derive(Debug, Clone)]
pub struct Transactions<'a> {
    blocks: slice::Iter<'a, Block>,
}

impl<'a> Iterator for Transactions<'a> {
    type Item = &'a Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        self.blocks.next().map(Block::transaction)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.blocks.size_hint()
    }
}

impl ExactSizeIterator for Transactions<'_> {}

/// Iterator returned by [`BlockChain::users`].
#[derive(Debug)]
pub struct Users<'a> {
    blocks: slice::Iter<'a, Block>,
    seen: HashSet<&'a str>,
}

impl<'a> Iterator for Users<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        for block in self.blocks.by_ref() {
            let target = block.transaction().target.as_str();
            if self.seen.insert(target) {
                return Some(target);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::LeadingZeroBytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn chain() -> BlockChain {
        BlockChain::new(LeadingZeroBytes(1)).unwrap()
    }

    fn push(chain: &mut BlockChain, tx: Transaction) {
        let block = chain.mine(tx).unwrap();
        chain.append(block).unwrap();
    }

    /// A chain whose validator can be tightened after blocks are in.
    fn switchable() -> (BlockChain, Arc<AtomicBool>) {
        let strict = Arc::new(AtomicBool::new(false));
        let flag = strict.clone();
        let validator =
            move |h: &Hash| !flag.load(Ordering::Relaxed) || h.byte_at(0) == Ok(0);
        (BlockChain::new(validator).unwrap(), strict)
    }

    #[test]
    fn genesis_only() {
        let chain = chain();
        assert_eq!(chain.size(), 1);
        let genesis = chain.blocks().next().unwrap();
        assert_eq!(genesis.num(), 0);
        assert_eq!(genesis.transaction(), &Transaction::genesis());
        assert!(genesis.prev_hash().is_empty());
        assert_eq!(chain.hash(), genesis.hash());
        assert!(chain.is_correct());
        assert_eq!(chain.users().count(), 0);
    }

    #[test]
    fn deposit_then_transfer() {
        let mut chain = chain();
        let block = chain.mine(Transaction::deposit("alice", 50)).unwrap();
        assert_eq!(block.num(), 1);
        assert_eq!(block.hash().byte_at(0), Ok(0));
        chain.append(block).unwrap();
        assert_eq!(chain.size(), 2);
        assert_eq!(chain.balance("alice"), 50);

        push(&mut chain, Transaction::new("alice", "bob", 30));
        assert_eq!(chain.balance("alice"), 20);
        assert_eq!(chain.balance("bob"), 30);
        assert_eq!(chain.balance("carol"), 0);
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn mining_does_not_touch_the_chain() {
        let chain = chain();
        let before = chain.hash().clone();
        let a = chain.mine(Transaction::deposit("alice", 5)).unwrap();
        let b = chain.mine(Transaction::deposit("alice", 5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(chain.size(), 1);
        assert_eq!(chain.hash(), &before);
    }

    #[test]
    fn tampered_block_is_refused() {
        let mut chain = chain();
        let mut block = chain.mine(Transaction::deposit("alice", 50)).unwrap();
        block.transaction_mut().amount = 5000;
        let before = chain.hash().clone();

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, AppendError::HashMismatch { num: 1, .. }));
        assert_eq!(chain.size(), 1);
        assert_eq!(chain.hash(), &before);
    }

    #[test]
    fn unworked_block_is_refused() {
        let mut chain = chain();
        let tx = Transaction::deposit("alice", 50);
        let good = chain.mine(tx.clone()).unwrap().nonce();
        // the miner takes the first acceptable nonce, so every earlier one fails
        if good > 0 {
            let block = Block::reconstruct(1, tx, chain.hash().clone(), good - 1);
            let err = chain.append(block).unwrap_err();
            assert!(matches!(err, AppendError::InvalidHash { num: 1, .. }));
        }
        assert_eq!(chain.size(), 1);
    }

    #[test]
    fn only_the_block_on_the_current_tail_is_accepted() {
        let mut chain = chain();
        let first = chain.mine(Transaction::deposit("alice", 50)).unwrap();
        let rival = chain.mine(Transaction::deposit("bob", 10)).unwrap();
        chain.append(first).unwrap();

        let tail = chain.hash().clone();
        let err = chain.append(rival).unwrap_err();
        assert!(matches!(err, AppendError::BrokenLink { num: 1, .. }));
        assert_eq!(chain.size(), 2);
        assert_eq!(chain.hash(), &tail);

        // right position, wrong predecessor
        let forked = Block::mine(
            2,
            Transaction::deposit("bob", 10),
            Hash::from_bytes(vec![1; 32]),
            chain.validator(),
            chain.miner(),
        )
        .unwrap();
        let err = chain.append(forked).unwrap_err();
        assert!(matches!(err, AppendError::BrokenLink { num: 2, .. }));
    }

    #[test]
    fn block_for_another_position_is_refused() {
        let mut chain = chain();
        let block = Block::mine(
            7,
            Transaction::deposit("alice", 1),
            chain.hash().clone(),
            chain.validator(),
            chain.miner(),
        )
        .unwrap();
        assert_eq!(
            chain.append(block),
            Err(AppendError::WrongIndex {
                num: 7,
                expected: 1
            })
        );
    }

    #[test]
    fn reconstructed_block_appends() {
        let mut chain = chain();
        let tx = Transaction::deposit("alice", 50);
        let nonce = chain.mine(tx.clone()).unwrap().nonce();
        let block = Block::reconstruct(1, tx, chain.hash().clone(), nonce);
        chain.append(block).unwrap();
        assert_eq!(chain.size(), 2);
    }

    #[test]
    fn remove_last_keeps_genesis() {
        let mut chain = chain();
        assert!(!chain.remove_last());
        assert_eq!(chain.size(), 1);

        let genesis = chain.hash().clone();
        push(&mut chain, Transaction::deposit("alice", 5));
        push(&mut chain, Transaction::deposit("bob", 5));
        assert_eq!(chain.size(), 3);
        assert!(chain.remove_last());
        assert_eq!(chain.size(), 2);
        assert_eq!(chain.balance("bob"), 0);
        assert!(chain.remove_last());
        assert_eq!(chain.hash(), &genesis);
        assert!(!chain.remove_last());
        assert_eq!(chain.size(), 1);

        // the tail is usable again
        push(&mut chain, Transaction::deposit("carol", 1));
        assert!(chain.is_correct());
    }

    #[test]
    fn check_finds_tampered_amount() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 50));
        push(&mut chain, Transaction::new("alice", "bob", 30));
        chain.blocks[2].transaction_mut().amount = 10;

        assert_eq!(chain.check(), Err(Violation::HashMismatch { index: 2 }));
        assert!(!chain.is_correct());
    }

    #[test]
    fn check_finds_overdraft() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 50));
        // append admits it: balances are only checked by the walk
        push(&mut chain, Transaction::new("alice", "bob", 1000));
        assert_eq!(
            chain.check(),
            Err(Violation::Overdraft {
                index: 2,
                user: "alice".into(),
                balance: 50,
                amount: 1000,
            })
        );
    }

    #[test]
    fn spending_the_exact_balance_is_allowed() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 50));
        push(&mut chain, Transaction::new("alice", "bob", 50));
        assert!(chain.is_correct());
        assert_eq!(chain.balance("alice"), 0);

        push(&mut chain, Transaction::new("alice", "bob", 1));
        assert!(matches!(
            chain.check(),
            Err(Violation::Overdraft { index: 3, balance: 0, amount: 1, .. })
        ));
    }

    #[test]
    fn self_transfer_needs_funds_first() {
        let mut chain = chain();
        push(&mut chain, Transaction::new("alice", "alice", 5));
        assert!(matches!(
            chain.check(),
            Err(Violation::Overdraft { index: 1, balance: 0, .. })
        ));
        chain.remove_last();

        push(&mut chain, Transaction::deposit("alice", 5));
        push(&mut chain, Transaction::new("alice", "alice", 5));
        assert!(chain.is_correct());
        assert_eq!(chain.balance("alice"), 5);
    }

    #[test]
    fn check_finds_negative_amount() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", -3));
        assert_eq!(
            chain.check(),
            Err(Violation::NegativeAmount {
                index: 1,
                amount: -3
            })
        );
    }

    #[test]
    fn check_finds_broken_link() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 1));
        push(&mut chain, Transaction::deposit("bob", 1));
        chain.blocks[2].set_prev_hash(Hash::from_bytes(vec![0; 32]));
        assert_eq!(chain.check(), Err(Violation::BrokenLink { index: 1 }));
    }

    #[test]
    fn check_rechecks_the_validator() {
        let (mut chain, strict) = switchable();
        let tx = Transaction::deposit("alice", 1);
        let block = chain.mine(tx).unwrap();
        assert_eq!(block.nonce(), 0);
        chain.append(block).unwrap();
        assert!(chain.is_correct());

        strict.store(true, Ordering::Relaxed);
        // SHA-256 of the zero-nonce genesis input starts with 0x37
        assert_eq!(chain.check(), Err(Violation::InvalidHash { index: 0 }));
    }

    #[test]
    fn hopeless_validator_fails_to_build() {
        let miner = Miner::new().with_max_attempts(100);
        let err = BlockChain::with_miner(|_: &Hash| false, miner).unwrap_err();
        assert_eq!(err, MineError::Exhausted { attempts: 100 });
    }

    #[test]
    fn deposits_are_debited_from_the_empty_source() {
        let mut chain = chain();
        assert_eq!(chain.balance(""), 0);
        push(&mut chain, Transaction::deposit("alice", 50));
        assert_eq!(chain.balance(""), -50);
        push(&mut chain, Transaction::new("alice", "bob", 20));
        push(&mut chain, Transaction::deposit("bob", 7));
        assert_eq!(chain.balance(""), -57);
        assert_eq!(chain.balance("alice"), 30);
        assert_eq!(chain.balance("bob"), 27);
        // the walk never treats the empty source as overdrawn
        assert!(chain.is_correct());
    }

    #[test]
    fn users_in_first_seen_order() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 10));
        push(&mut chain, Transaction::new("alice", "bob", 3));
        push(&mut chain, Transaction::deposit("alice", 10));
        push(&mut chain, Transaction::new("bob", "carol", 1));
        let users: Vec<&str> = chain.users().collect();
        assert_eq!(users, ["alice", "bob", "carol"]);
    }

    #[test]
    fn transactions_cover_every_block() {
        let mut chain = chain();
        push(&mut chain, Transaction::deposit("alice", 10));
        push(&mut chain, Transaction::new("alice", "bob", 3));

        let txs: Vec<&Transaction> = (&chain).into_iter().collect();
        assert_eq!(txs.len(), chain.size());
        assert_eq!(chain.transactions().len(), 3);
        assert_eq!(txs[0], &Transaction::genesis());
        assert_eq!(txs[2], &Transaction::new("alice", "bob", 3));
        for (tx, block) in chain.transactions().zip(chain.blocks()) {
            assert_eq!(tx, block.transaction());
        }

        chain.remove_last();
        assert_eq!(chain.transactions().count(), 2);
    }

    #[test]
    fn blocks_are_linked() {
        let mut chain = chain();
        for i in 0..4 {
            push(&mut chain, Transaction::deposit("alice", i));
        }
        let blocks: Vec<&Block> = chain.blocks().collect();
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].prev_hash(), pair[0].hash());
            assert_eq!(pair[1].num(), pair[0].num() + 1);
        }
        assert_eq!(chain.hash(), blocks[4].hash());
    }
}
