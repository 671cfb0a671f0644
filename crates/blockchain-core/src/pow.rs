//! Proof-of-work admission policies.

use crate::Hash;

/// Decides which hashes a chain admits. Consulted for every nonce tried while
/// mining and for every block on each validation pass, so it must be pure.
pub trait HashValidator: Send + Sync {
    fn is_valid(&self, hash: &Hash) -> bool;
}

impl<F> HashValidator for F
where
    F: Fn(&Hash) -> bool + Send + Sync,
{
    fn is_valid(&self, hash: &Hash) -> bool {
        self(hash)
    }
}

/// Accepts a hash whose first `n` bytes are all zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingZeroBytes(pub usize);

impl HashValidator for LeadingZeroBytes {
    fn is_valid(&self, hash: &Hash) -> bool {
        hash.len() >= self.0 && hash.as_bytes()[..self.0].iter().all(|b| *b == 0)
    }
}

/// Accepts a hash with at least `n` leading zero bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingZeroBits(pub u32);

impl HashValidator for LeadingZeroBits {
    fn is_valid(&self, hash: &Hash) -> bool {
        count_leading_zero_bits(hash) >= self.0
    }
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash.as_bytes() {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}
