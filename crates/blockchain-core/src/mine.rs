use crate::constants::{DEFAULT_MAX_ATTEMPTS, PROGRESS_INTERVAL};
use crate::error::MineError;
use crate::pow::HashValidator;
use crate::Hash;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Nonce search settings.
///
/// Nonces are tried in increasing order starting at zero, so a search over
/// the same input with the same validator always settles on the same nonce,
/// sequential or parallel.
#[derive(Debug, Clone)]
pub struct Miner {
    max_attempts: u64,
    parallel: bool,
    stop: Option<Arc<AtomicBool>>,
}

impl Default for Miner {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            parallel: false,
            stop: None,
        }
    }
}

enum Outcome {
    Found(i64, Hash),
    Cancelled(i64),
}

impl Miner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after trying `max_attempts` nonces (at most `i64::MAX`).
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts.min(DEFAULT_MAX_ATTEMPTS);
        self
    }

    /// Spread the search over the rayon pool. The smallest acceptable nonce
    /// still wins.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Abort the search once `stop` is raised.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    fn cancelled(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }

    /// Find the first nonce whose hash over `prefix ++ nonce` satisfies
    /// `validator`. `prefix` is every hashed segment that precedes the nonce.
    pub fn search(
        &self,
        prefix: &[u8],
        validator: &dyn HashValidator,
    ) -> Result<(i64, Hash), MineError> {
        // Bounded by DEFAULT_MAX_ATTEMPTS, which is i64::MAX.
        let limit = self.max_attempts as i64;
        let outcome = if self.parallel {
            self.search_parallel(prefix, validator, limit)
        } else {
            self.search_sequential(prefix, validator, limit)
        };

        match outcome {
            Some(Outcome::Found(nonce, hash)) => {
                debug!(nonce, hash = %hash, "found nonce");
                Ok((nonce, hash))
            }
            Some(Outcome::Cancelled(at)) => {
                debug!(attempts = at, "mining cancelled");
                Err(MineError::Cancelled { attempts: at as u64 })
            }
            None => Err(MineError::Exhausted {
                attempts: self.max_attempts,
            }),
        }
    }

    fn search_sequential(
        &self,
        prefix: &[u8],
        validator: &dyn HashValidator,
        limit: i64,
    ) -> Option<Outcome> {
        for nonce in 0..limit {
            if self.cancelled() {
                return Some(Outcome::Cancelled(nonce));
            }
            report_progress(nonce);
            let hash = hash_with_nonce(prefix, nonce);
            if validator.is_valid(&hash) {
                return Some(Outcome::Found(nonce, hash));
            }
        }
        None
    }

    fn search_parallel(
        &self,
        prefix: &[u8],
        validator: &dyn HashValidator,
        limit: i64,
    ) -> Option<Outcome> {
        (0..limit).into_par_iter().find_map_first(|nonce| {
            if self.cancelled() {
                return Some(Outcome::Cancelled(nonce));
            }
            // workers reach these nonces out of order
            report_progress(nonce);
            let hash = hash_with_nonce(prefix, nonce);
            validator
                .is_valid(&hash)
                .then(|| Outcome::Found(nonce, hash))
        })
    }
}

fn is_progress_point(nonce: i64) -> bool {
    nonce > 0 && nonce as u64 % PROGRESS_INTERVAL == 0
}

fn report_progress(nonce: i64) {
    if is_progress_point(nonce) {
        debug!(tried = nonce, "still mining");
    }
}

pub(crate) fn hash_with_nonce(prefix: &[u8], nonce: i64) -> Hash {
    Hash::digest([prefix, nonce.to_be_bytes().as_slice()])
}
