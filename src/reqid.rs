use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Correlation id source shared by the connections it is injected into
///
/// Ids increase monotonically, wrap at `u64::MAX`, and never yield 0.
#[derive(Debug)]
pub struct ReqIdGenerator {
    next: AtomicU64,
}

impl Default for ReqIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Next candidate id, skipping 0
    pub fn next_candidate(&self) -> u64 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Next id for which `in_use` is false
    ///
    /// Gives up with `RequestIdsExhausted` after `max_attempts` candidates.
    pub fn allocate(&self, max_attempts: usize, in_use: impl Fn(u64) -> bool) -> Result<u64> {
        for _ in 0..max_attempts {
            let id = self.next_candidate();
            if !in_use(id) {
                return Ok(id);
            }
        }
        Err(Error::RequestIdsExhausted)
    }
}
