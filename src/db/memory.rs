use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{AllocationStore, RawPool};
use crate::errors::Result;

/// Pools kept in memory for the lifetime of the value
#[derive(Debug, Default)]
pub struct MemoryStore {
    pools: RefCell<BTreeMap<String, RawPool>>,
    writes: RefCell<BTreeMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a pool has been saved
    pub fn writes(&self, pool: &str) -> usize {
        self.writes.borrow().get(pool).copied().unwrap_or(0)
    }
}

impl AllocationStore for MemoryStore {
    fn load(&self, pool: &str) -> Result<RawPool> {
        Ok(self.pools.borrow().get(pool).cloned().unwrap_or_default())
    }

    fn save(&self, pool: &str, entries: &RawPool) -> Result<()> {
        self.pools.borrow_mut().insert(pool.to_string(), entries.clone());
        *self.writes.borrow_mut().entry(pool.to_string()).or_default() += 1;
        Ok(())
    }
}
