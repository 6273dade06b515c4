mod file_store;
mod memory;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{FabricError, Result};

pub use file_store::FileStore;
pub use memory::MemoryStore;

/// Names of the persisted allocation pools
pub mod pool_name {
    pub const L3VNI: &str = "l3vni";
    pub const CLAG_INTERFACES: &str = "clag_interfaces";
    pub const VLANS_NETWORK: &str = "vlans_network";
    pub const IP_NETWORK_LINKS: &str = "ip_network_links";
    pub const NAT_RULES: &str = "nat_rules";

    pub const ALL: &[&str] = &[L3VNI, CLAG_INTERFACES, VLANS_NETWORK, IP_NETWORK_LINKS, NAT_RULES];
}

/// Raw assignment map of one pool
pub type RawPool = BTreeMap<String, Value>;

/// Persistence backend of the allocation pools.
///
/// `load` of a pool that was never saved returns an empty map.
pub trait AllocationStore {
    fn load(&self, pool: &str) -> Result<RawPool>;
    fn save(&self, pool: &str, entries: &RawPool) -> Result<()>;
}

/// Typed access to a pool on top of any [`AllocationStore`]
pub struct PoolRepo;

impl PoolRepo {
    pub fn load<T: DeserializeOwned>(store: &dyn AllocationStore, pool: &str) -> Result<BTreeMap<String, T>> {
        store
            .load(pool)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_value(value)
                    .map(|v| (key, v))
                    .map_err(|source| FabricError::StoreFormat { pool: pool.to_string(), source })
            })
            .collect()
    }

    /// Write `after` back unless it equals `before`. Returns whether a write happened.
    pub fn save_if_changed<T: Serialize + PartialEq>(
        store: &dyn AllocationStore,
        pool: &str,
        before: &BTreeMap<String, T>,
        after: &BTreeMap<String, T>,
    ) -> Result<bool> {
        if before == after {
            tracing::debug!("Pool {} unchanged ({} entries)", pool, after.len());
            return Ok(false);
        }

        let raw = after
            .iter()
            .map(|(key, value)| {
                serde_json::to_value(value)
                    .map(|v| (key.clone(), v))
                    .map_err(|source| FabricError::StoreFormat { pool: pool.to_string(), source })
            })
            .collect::<Result<RawPool>>()?;

        store.save(pool, &raw)?;
        tracing::info!("Saved pool {} ({} entries)", pool, after.len());
        Ok(true)
    }
}
