//! Stable assignment of scarce values (ids, rule numbers, subnets).
//!
//! Every function here is pure: it takes the persisted map and the set of
//! keys that are still referenced and returns the reconciled map. Keys that
//! are no longer referenced are dropped, surviving keys keep their value and
//! new keys get the lowest free value.

use std::collections::{BTreeMap, BTreeSet};

use ipnet::Ipv4Net;

use crate::errors::{FabricError, Result};
use crate::utils::net::{bounds, next_available_prefix};

/// Inclusive numeric range, optionally stepped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPool {
    pub name: &'static str,
    pub first: u32,
    pub last: u32,
    pub step: u32,
}

/// L3-VNI VLAN ids, one per tenant
pub const L3VNI_POOL: IdPool = IdPool::new("l3vni", 4000, 4090, 1);
/// CLAG ids, independent per rack
pub const CLAG_POOL: IdPool = IdPool::new("clag_interfaces", 1, 199, 1);
/// NAT rule ladder for NAT-enabled VLANs
pub const NAT_RULE_POOL: IdPool = IdPool::new("nat_rules", 500, 590, 10);
/// Rule number held by the OOB management network
pub const OOB_NAT_RULE: u32 = 1;

impl IdPool {
    pub const fn new(name: &'static str, first: u32, last: u32, step: u32) -> Self {
        Self { name, first, last, step }
    }

    pub fn values(&self) -> impl Iterator<Item = u32> {
        (self.first..=self.last).step_by(self.step.max(1) as usize)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.values().any(|v| v == value)
    }

    /// Lowest value of the pool not in `used`
    pub fn next_free(&self, used: &BTreeSet<u32>) -> Result<u32> {
        self.values().find(|v| !used.contains(v)).ok_or_else(|| {
            FabricError::pool_exhausted(
                self.name,
                format!("all values {}-{} are in use", self.first, self.last),
            )
        })
    }
}

/// Reconcile an id map against the live keys.
///
/// `excluded` holds values that belong to something else and must never be
/// handed out (e.g. L2 VLAN ids when assigning L3-VNI ids). New keys are
/// assigned in the order of `live`.
pub fn reconcile_ids<K: AsRef<str>>(
    pool: &IdPool,
    live: &[K],
    current: &BTreeMap<String, u32>,
    excluded: &BTreeSet<u32>,
) -> Result<BTreeMap<String, u32>> {
    let live_set: BTreeSet<&str> = live.iter().map(|k| k.as_ref()).collect();

    let mut out: BTreeMap<String, u32> = current
        .iter()
        .filter(|(k, _)| live_set.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    let mut used: BTreeSet<u32> = out.values().copied().collect();
    used.extend(excluded.iter().copied());

    for key in live {
        let key = key.as_ref();
        if out.contains_key(key) {
            continue;
        }
        let value = pool.next_free(&used)?;
        used.insert(value);
        out.insert(key.to_string(), value);
        tracing::debug!("Assigned {} {} -> {}", pool.name, key, value);
    }

    Ok(out)
}

/// Lowest aligned `/prefix_len` inside `base` that overlaps none of `used`
pub fn next_free_subnet(pool: &str, base: &Ipv4Net, prefix_len: u8, used: &[Ipv4Net]) -> Result<Ipv4Net> {
    if prefix_len < base.prefix_len() || prefix_len > 32 {
        return Err(FabricError::pool_exhausted(
            pool,
            format!("a /{} does not fit in {}", prefix_len, base),
        ));
    }

    let (net, bcast) = bounds(base);
    let allocated: Vec<(u32, u32)> = used.iter().map(bounds).collect();

    let (start, _) = next_available_prefix(net, bcast, prefix_len, &allocated).ok_or_else(|| {
        FabricError::pool_exhausted(pool, format!("no free /{} left in {}", prefix_len, base))
    })?;

    Ipv4Net::new(start.into(), prefix_len)
        .map_err(|e| FabricError::pool_exhausted(pool, e.to_string()))
}

/// Reconcile a subnet map. Each request is `(key, base block)`; a kept
/// entry is reassigned when it no longer sits inside its requested block.
pub fn reconcile_subnets(
    pool: &str,
    requests: &[(String, Ipv4Net)],
    prefix_len: u8,
    current: &BTreeMap<String, Ipv4Net>,
) -> Result<BTreeMap<String, Ipv4Net>> {
    let wanted: BTreeMap<&str, &Ipv4Net> = requests.iter().map(|(k, b)| (k.as_str(), b)).collect();

    let mut out: BTreeMap<String, Ipv4Net> = current
        .iter()
        .filter(|(k, v)| {
            wanted
                .get(k.as_str())
                .is_some_and(|base| base.contains(*v) && v.prefix_len() == prefix_len)
        })
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    for (key, base) in requests {
        if out.contains_key(key) {
            continue;
        }
        let used: Vec<Ipv4Net> = out.values().copied().collect();
        let subnet = next_free_subnet(pool, base, prefix_len, &used)?;
        tracing::debug!("Assigned {} {} -> {}", pool, key, subnet);
        out.insert(key.clone(), subnet);
    }

    Ok(out)
}
